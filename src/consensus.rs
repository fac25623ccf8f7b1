//! Consensus aggregation over repeated randomized selections.
//!
//! A single FPS or K-Means run is sensitive to its seed. The aggregator runs
//! the selector across independent seeded iterations (seed = iteration
//! number), excluding locked items every time, and folds the per-iteration
//! outputs into a per-item selection count. The final ranked subset is the
//! "exactly the top N" of those counts, which is distinct from any single
//! iteration's raw output: it surfaces items that are robustly
//! representative across many randomized views of the embedding space, and
//! flags low-frequency items as likely noise or near-duplicates.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};

use crate::models::{CurationOutcome, FrequencyRecord, SelectionMethod};
use crate::progress::CurationReporter;
use crate::selector;
use crate::store::{EmbeddingStore, MemoryStore};

/// Hard cap on consensus iterations, enforced regardless of caller input.
pub const MAX_ITERATIONS: u32 = 30;

/// Parameters for one consensus run, already validated and clamped.
#[derive(Debug, Clone)]
pub struct CurationPlan {
    pub target_count: usize,
    pub iterations: u32,
    pub method: SelectionMethod,
    pub kmeans_max_iter: u32,
}

impl CurationPlan {
    pub fn new(target_count: usize, iterations: u32, method: SelectionMethod) -> Self {
        Self {
            target_count,
            iterations: iterations.clamp(1, MAX_ITERATIONS),
            method,
            kmeans_max_iter: selector::DEFAULT_KMEANS_MAX_ITER,
        }
    }
}

/// Run the full consensus curation.
///
/// `excluded` is the caller's lock set; it is consumed, never mutated. The
/// reporter fires after every iteration, and `cancel` is checked at each
/// iteration boundary; a raised flag aborts with a `"cancelled"` error.
///
/// # Errors
///
/// Fails on a zero `target_count` or zero `iterations` (the request layer
/// rejects those synchronously; this is the engine-side contract), on a
/// store that cannot serve a selected index, or on cancellation.
pub fn curate(
    store: &MemoryStore,
    excluded: &HashSet<usize>,
    plan: &CurationPlan,
    reporter: &dyn CurationReporter,
    cancel: Option<&AtomicBool>,
) -> Result<CurationOutcome> {
    if plan.target_count == 0 {
        bail!("target_count must be > 0");
    }
    if plan.iterations == 0 || plan.iterations > MAX_ITERATIONS {
        bail!("iterations must be in [1, {}]", MAX_ITERATIONS);
    }

    let candidates: Vec<usize> = (0..store.len()).filter(|i| !excluded.contains(i)).collect();

    let mut counts: HashMap<usize, u32> = HashMap::new();

    for i in 1..=plan.iterations {
        if let Some(flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                bail!("cancelled");
            }
        }

        let picked = selector::select(
            plan.method,
            store.vectors(),
            &candidates,
            plan.target_count,
            u64::from(i),
            plan.kmeans_max_iter,
        );
        if picked.is_empty() {
            eprintln!(
                "Warning: iteration {} had no candidates to select from",
                i
            );
        }
        for idx in picked {
            *counts.entry(idx).or_insert(0) += 1;
        }

        reporter.iteration(i, plan.iterations, plan.method);
    }

    // Rank every touched item: descending count, then ascending index.
    let mut ranked: Vec<(usize, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let achieved = plan.target_count.min(candidates.len());
    let selected_indices: Vec<usize> = ranked.iter().take(achieved).map(|&(idx, _)| idx).collect();

    let mut selected_files = Vec::with_capacity(selected_indices.len());
    for &idx in &selected_indices {
        selected_files.push(store.metadata(idx)?.filepath.clone());
    }

    let mut analysis_results = Vec::with_capacity(ranked.len());
    for (idx, count) in ranked {
        let meta = store.metadata(idx)?;
        analysis_results.push(FrequencyRecord {
            index: idx,
            filename: meta.filename.clone(),
            subfolder: meta.subfolder.clone(),
            filepath: meta.filepath.clone(),
            count,
            frequency: 100.0 * f64::from(count) / f64::from(plan.iterations),
        });
    }

    Ok(CurationOutcome {
        count: selected_indices.len(),
        selected_indices,
        selected_files,
        analysis_results,
        target_count: plan.target_count,
        iterations: plan.iterations,
    })
}
