//! CLI commands that act on a single turn, context or image.

use anyhow::{bail, Result};
use std::path::Path;

use tame::assistant::Assistant;
use tame::dataset::load_image;
use tame::memory::types::MemoryKind;

/// Record one conversation turn and print what changed.
pub fn turn(
    assistant: &Assistant,
    concept_id: &str,
    question: &str,
    answer: &str,
    image: Option<&Path>,
) -> Result<()> {
    let image = image.map(load_image).transpose()?;
    let report = assistant.record_turn(concept_id, image.as_ref(), question, answer);
    if report.aborted {
        bail!("turn was not recorded for concept {concept_id:?}");
    }

    let store = assistant.open_store(concept_id)?;
    println!("Turn recorded for {concept_id}");
    println!(
        "  Dynamic update:   {} applied, {} rejected",
        report.dynamic_update.applied, report.dynamic_update.rejected
    );
    println!(
        "  Promotion:        {} removed from dynamic, {} applied to static",
        report.promoted_removals.applied, report.promoted_additions.applied
    );
    if report.portrait_saved {
        println!("  Portrait saved");
    }
    println!(
        "  Now:              {} static, {} dynamic",
        store.read(MemoryKind::Static).len(),
        store.read(MemoryKind::Dynamic).len()
    );
    Ok(())
}

/// Print the context for a concept, aligned to `question` when given.
pub fn context(
    assistant: &Assistant,
    concept_id: &str,
    question: Option<&str>,
    image: Option<&Path>,
) -> Result<()> {
    let image = image.map(load_image).transpose()?;
    println!("{}", assistant.get_context(concept_id, question, image.as_ref()));
    Ok(())
}

/// Print the concept identified in an image.
pub fn identify(assistant: &Assistant, image: &Path) -> Result<()> {
    let image = load_image(image)?;
    match assistant.identify(&image) {
        Some(concept_id) => println!("{concept_id}"),
        None => println!("No concept identified."),
    }
    Ok(())
}
