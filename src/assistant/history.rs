//! Building memory from recorded conversation history.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use tracing::{error, info, warn};

use super::Assistant;
use crate::dataset;

/// What happened to one concept during a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConceptOutcome {
    Built { turns: usize },
    /// Memory already existed.
    Skipped,
    Failed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Assistant {
    /// Feed every turn of `concept_id`'s history through [`Assistant::record_turn`].
    /// Returns the number of turns recorded.
    pub fn read_history(&self, data_root: &Path, concept_id: &str) -> Result<usize> {
        info!(concept_id, "reading history");
        let turns = dataset::load_history(data_root, concept_id)?;

        for turn in &turns {
            let image = turn.image_id.as_deref().and_then(|image_id| {
                let path = dataset::image_path(data_root, concept_id, image_id);
                dataset::load_image(&path)
                    .map_err(|e| warn!(error = %format!("{e:#}"), "image unavailable, recording turn as text-only"))
                    .ok()
            });
            self.record_turn(
                concept_id,
                image.as_ref(),
                &turn.user_input,
                &turn.assistant_response,
            );
        }
        Ok(turns.len())
    }

    /// Build memory for every concept under `data_root` that has none yet.
    ///
    /// Up to `jobs` workers run at once; each concept is handled start to finish by exactly
    /// one worker, so no concept is ever updated concurrently. `on_done` is called once per
    /// concept as it finishes.
    pub fn read_history_all(
        &self,
        data_root: &Path,
        jobs: usize,
        on_done: impl Fn(&str, ConceptOutcome) + Sync,
    ) -> Result<BuildSummary> {
        let concept_ids = dataset::concept_ids(data_root)?;
        let workers = jobs.clamp(1, concept_ids.len().max(1));
        let next = &AtomicUsize::new(0);
        let concept_ids = &concept_ids;
        let on_done = &on_done;

        let outcomes: Vec<ConceptOutcome> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(move |_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        while let Some(concept_id) =
                            concept_ids.get(next.fetch_add(1, Ordering::SeqCst))
                        {
                            let outcome = self.build_concept(data_root, concept_id);
                            on_done(concept_id, outcome);
                            done.push(outcome);
                        }
                        done
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        error!("build worker panicked");
                        vec![ConceptOutcome::Failed]
                    })
                })
                .collect()
        });

        let mut summary = BuildSummary::default();
        for outcome in outcomes {
            match outcome {
                ConceptOutcome::Built { .. } => summary.processed += 1,
                ConceptOutcome::Skipped => summary.skipped += 1,
                ConceptOutcome::Failed => summary.failed += 1,
            }
        }
        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            "memory building completed"
        );

        self.refresh_concepts();
        Ok(summary)
    }

    fn build_concept(&self, data_root: &Path, concept_id: &str) -> ConceptOutcome {
        if self.memory_exists(concept_id) {
            info!(concept_id, "skipping, memory already exists");
            return ConceptOutcome::Skipped;
        }
        match self.read_history(data_root, concept_id) {
            Ok(turns) => ConceptOutcome::Built { turns },
            Err(e) => {
                error!(concept_id, error = %format!("{e:#}"), "failed to build memory");
                ConceptOutcome::Failed
            }
        }
    }
}
