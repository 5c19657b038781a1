//! CLI `build` command: build memory from every concept's conversation history.

use anyhow::Result;

use tame::assistant::{Assistant, ConceptOutcome};

pub fn build(assistant: &Assistant, jobs: usize) -> Result<()> {
    let config = assistant.config();
    let data_root = config.resolved_data_root();
    let concept_count = tame::dataset::concept_ids(&data_root)?.len();

    println!(
        "Building memory for {concept_count} concepts with {} ({}), {jobs} worker(s)...",
        config.model_id(),
        config.model_short_name()
    );

    let pb = super::item_progress(concept_count);
    let summary = assistant.read_history_all(&data_root, jobs, |concept_id, outcome| {
        let label = match outcome {
            ConceptOutcome::Built { .. } => "built",
            ConceptOutcome::Skipped => "skipped",
            ConceptOutcome::Failed => "failed",
        };
        pb.set_message(format!("{concept_id} {label}"));
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    println!("Memory build complete");
    println!("{}", "=".repeat(40));
    println!("  Processed:  {}", summary.processed);
    println!("  Skipped:    {}", summary.skipped);
    println!("  Failed:     {}", summary.failed);
    println!("  Memory at:  {}", assistant.memory_root().display());
    Ok(())
}
