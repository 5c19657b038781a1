//! CLI `inspect` and `clean-dynamic` commands: view or reset a single concept's memory.

use anyhow::{bail, Result};

use tame::config::TameConfig;
use tame::memory::store::MemoryStore;
use tame::memory::types::MemoryKind;

fn existing_store(config: &TameConfig, concept_id: &str) -> Result<MemoryStore> {
    let root = config.resolved_memory_root();
    if !root.join(concept_id).is_dir() {
        bail!("no memory for concept {concept_id:?} under {}", root.display());
    }
    MemoryStore::open(&root, concept_id)
}

/// Display both memory tiers of a concept, numbered as the model sees them.
pub fn inspect(config: &TameConfig, concept_id: &str) -> Result<()> {
    let store = existing_store(config, concept_id)?;

    println!("Concept: {concept_id}");
    println!("{}", "=".repeat(50));
    println!("  Directory:  {}", store.dir().display());
    println!(
        "  Portrait:   {}",
        if store.portrait_path().exists() { "yes" } else { "no" }
    );

    for kind in [MemoryKind::Static, MemoryKind::Dynamic] {
        let items = store.read(kind);
        println!();
        println!("{} memory ({}):", kind.as_str().to_uppercase(), items.len());
        if items.is_empty() {
            println!("  (empty)");
        }
        for (i, item) in items.iter().enumerate() {
            println!("  {:>2}. {item}", i + 1);
        }
    }
    Ok(())
}

/// Delete a concept's dynamic memory file.
pub fn clean_dynamic(config: &TameConfig, concept_id: &str) -> Result<()> {
    let mut store = existing_store(config, concept_id)?;
    let count = store.read(MemoryKind::Dynamic).len();
    store.clean_dynamic();
    println!("Removed {count} dynamic memories for {concept_id}");
    Ok(())
}
