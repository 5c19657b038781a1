//! CLI `qa` command: answer every dataset question, resuming from earlier runs.

use anyhow::Result;
use tracing::{info, warn};

use tame::assistant::{expected_choice, Assistant};
use tame::dataset;
use tame::results::{QaRecord, ResultsLog};

pub fn qa(assistant: &Assistant) -> Result<()> {
    let config = assistant.config();
    let questions = dataset::load_all_questions(&config.resolved_data_root())?;
    let log = ResultsLog::open(&config.resolved_results_dir(), &config.model_short_name())?;
    let existing = log.existing_keys()?;

    println!(
        "Answering {} questions with {}...",
        questions.len(),
        config.model_id()
    );

    let pb = super::item_progress(questions.len());
    let (mut processed, mut skipped, mut identified, mut correct) = (0, 0, 0, 0);

    for q in &questions {
        pb.inc(1);
        let key = (
            q.concept_id.clone(),
            q.id.clone(),
            q.difficulty.to_string(),
        );
        if existing.contains(&key) {
            skipped += 1;
            info!(question_id = %q.id, concept_id = %q.concept_id, difficulty = %q.difficulty, "skipping, already processed");
            continue;
        }
        processed += 1;
        pb.set_message(format!("{}/{}", q.concept_id, q.id));

        let options = (q.options.len() == 4).then_some(q.options.as_slice());
        let outcome = assistant.complete_qa_workflow(&q.image_path, &q.question, options);

        if outcome.concept_id.as_deref() == Some(q.concept_id.as_str()) {
            identified += 1;
        } else {
            warn!(
                expected = %q.concept_id,
                identified = ?outcome.concept_id,
                "concept mismatch"
            );
        }
        if let Some(ref choice) = outcome.choice {
            if *choice == expected_choice(&q.answer, &q.options) {
                correct += 1;
            }
        }

        log.append(&QaRecord {
            concept_id: q.concept_id.clone(),
            question_id: q.id.clone(),
            difficulty: q.difficulty.to_string(),
            question: q.question.clone(),
            answer: outcome.answer,
            choice: outcome.choice,
        })?;
    }
    pb.finish_and_clear();

    println!("Processing Summary");
    println!("{}", "=".repeat(40));
    println!("  Questions processed:  {processed}");
    println!("  Questions skipped:    {skipped}");
    println!("  Concepts identified:  {identified}/{processed}");
    println!("  Choices correct:      {correct}/{processed}");
    println!("Results saved to {}", log.path().display());
    Ok(())
}
