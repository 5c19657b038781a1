use anyhow::Result;

use tame::config::TameConfig;
use tame::memory::concepts::ConceptDirectory;

/// Display memory statistics in the terminal.
pub fn stats(config: &TameConfig) -> Result<()> {
    let mut directory = ConceptDirectory::new(config.resolved_memory_root())?;
    directory.refresh();

    let response = tame::memory::stats::memory_stats(&directory);

    println!("Memory Statistics ({})", config.model_short_name());
    println!("{}", "=".repeat(40));
    println!("  Concepts:            {}", response.total_concepts);
    println!("  Static memories:     {}", response.static_memories);
    println!("  Dynamic memories:    {}", response.dynamic_memories);
    println!("  With portrait:       {}", response.with_portrait);
    println!();

    if !response.concepts.is_empty() {
        println!("By Concept:");
        println!("  {:<20} {:>7} {:>8} {:>7} {:>9}", "concept", "static", "dynamic", "visual", "portrait");
        for c in &response.concepts {
            println!(
                "  {:<20} {:>7} {:>8} {:>7} {:>9}",
                c.concept_id,
                c.static_count,
                c.dynamic_count,
                c.visual_facts,
                if c.has_portrait { "yes" } else { "no" }
            );
        }
    }

    Ok(())
}
