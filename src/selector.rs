//! Seeded subset selection over embedding vectors.
//!
//! Both strategies are pure functions of the vector matrix, the candidate
//! pool, the target count, and the seed. No hidden state, so independent
//! iterations can run with different seeds and stay individually
//! reproducible.
//!
//! - [`select_fps`]: Farthest-Point Sampling, greedy spatial coverage.
//! - [`select_kmeans`]: K-Means medoids, one real item per cluster.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::SelectionMethod;

/// Lloyd iteration cap used when the caller does not supply one.
pub const DEFAULT_KMEANS_MAX_ITER: u32 = 50;

/// Run one selection iteration with the given strategy.
///
/// Returns up to `target` distinct indices drawn from `candidates`. An empty
/// candidate pool yields an empty selection (the consensus layer treats that
/// iteration as contributing nothing).
pub fn select(
    method: SelectionMethod,
    vectors: &[Vec<f32>],
    candidates: &[usize],
    target: usize,
    seed: u64,
    kmeans_max_iter: u32,
) -> Vec<usize> {
    match method {
        SelectionMethod::Fps => select_fps(vectors, candidates, target, seed),
        SelectionMethod::Kmeans => {
            select_kmeans(vectors, candidates, target, seed, kmeans_max_iter)
        }
    }
}

/// Squared Euclidean distance. Squaring preserves every argmin/argmax the
/// selectors compute, so the root is never taken.
fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

// ============ Farthest-Point Sampling ============

/// Farthest-Point Sampling.
///
/// Starts from one seeded pseudo-random candidate, then repeatedly adds the
/// candidate whose minimum distance to the already-selected set is maximal.
/// Ties break toward the lowest item index so a fixed seed gives identical
/// output on every invocation.
pub fn select_fps(
    vectors: &[Vec<f32>],
    candidates: &[usize],
    target: usize,
    seed: u64,
) -> Vec<usize> {
    if candidates.is_empty() || target == 0 {
        return Vec::new();
    }
    let n = target.min(candidates.len());

    let mut rng = StdRng::seed_from_u64(seed);
    let first = candidates[rng.gen_range(0..candidates.len())];

    let mut selected = Vec::with_capacity(n);
    selected.push(first);

    // min_dist[i] = distance from candidates[i] to its nearest selected point
    let mut min_dist: Vec<f32> = candidates
        .iter()
        .map(|&c| squared_distance(&vectors[c], &vectors[first]))
        .collect();

    while selected.len() < n {
        let mut best: Option<(usize, f32)> = None;
        for (i, &c) in candidates.iter().enumerate() {
            if selected.contains(&c) {
                continue;
            }
            let d = min_dist[i];
            match best {
                None => best = Some((c, d)),
                Some((bc, bd)) => {
                    if d > bd || (d == bd && c < bc) {
                        best = Some((c, d));
                    }
                }
            }
        }
        let (next, _) = match best {
            Some(b) => b,
            None => break,
        };
        selected.push(next);
        for (i, &c) in candidates.iter().enumerate() {
            let d = squared_distance(&vectors[c], &vectors[next]);
            if d < min_dist[i] {
                min_dist[i] = d;
            }
        }
    }

    selected
}

// ============ K-Means medoid selection ============

/// K-Means medoid selection.
///
/// Partitions the candidates into `target` clusters (seeded random distinct
/// initial centroids, Lloyd iterations until assignments stabilize or
/// `max_iter` is hit), then returns the real item closest to each cluster
/// centroid. Medoids of disjoint clusters are distinct; if empty clusters
/// leave the result short, the gap is filled farthest-point style so the
/// selection always names exactly `min(target, pool)` real items.
pub fn select_kmeans(
    vectors: &[Vec<f32>],
    candidates: &[usize],
    target: usize,
    seed: u64,
    max_iter: u32,
) -> Vec<usize> {
    if candidates.is_empty() || target == 0 {
        return Vec::new();
    }
    let k = target.min(candidates.len());
    if k == candidates.len() {
        let mut all = candidates.to_vec();
        all.sort_unstable();
        return all;
    }

    let dims = vectors[candidates[0]].len();
    let mut rng = StdRng::seed_from_u64(seed);

    // Distinct seeded initial centroids drawn from the candidate pool.
    let mut picks: Vec<usize> = Vec::with_capacity(k);
    while picks.len() < k {
        let p = rng.gen_range(0..candidates.len());
        if !picks.contains(&p) {
            picks.push(p);
        }
    }
    let mut centroids: Vec<Vec<f32>> = picks
        .iter()
        .map(|&p| vectors[candidates[p]].clone())
        .collect();

    let mut assignment: Vec<usize> = vec![0; candidates.len()];
    for _ in 0..max_iter {
        // Assign each candidate to its nearest centroid (ties toward the
        // lower cluster id, for determinism).
        let mut changed = false;
        for (i, &c) in candidates.iter().enumerate() {
            let mut best_cluster = 0;
            let mut best_dist = f32::INFINITY;
            for (j, centroid) in centroids.iter().enumerate() {
                let d = squared_distance(&vectors[c], centroid);
                if d < best_dist {
                    best_dist = d;
                    best_cluster = j;
                }
            }
            if assignment[i] != best_cluster {
                assignment[i] = best_cluster;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        // Recompute centroids as the mean of their members. Empty clusters
        // keep their previous centroid.
        let mut sums: Vec<Vec<f32>> = vec![vec![0.0; dims]; k];
        let mut counts: Vec<usize> = vec![0; k];
        for (i, &c) in candidates.iter().enumerate() {
            let cluster = assignment[i];
            counts[cluster] += 1;
            for (s, v) in sums[cluster].iter_mut().zip(vectors[c].iter()) {
                *s += v;
            }
        }
        for j in 0..k {
            if counts[j] > 0 {
                for s in sums[j].iter_mut() {
                    *s /= counts[j] as f32;
                }
                centroids[j] = std::mem::take(&mut sums[j]);
            }
        }
    }

    // Medoid per non-empty cluster: the member closest to the centroid,
    // ties toward the lowest index.
    let mut medoids: Vec<usize> = Vec::with_capacity(k);
    for (j, centroid) in centroids.iter().enumerate() {
        let mut best: Option<(usize, f32)> = None;
        for (i, &c) in candidates.iter().enumerate() {
            if assignment[i] != j {
                continue;
            }
            let d = squared_distance(&vectors[c], centroid);
            match best {
                None => best = Some((c, d)),
                Some((bc, bd)) => {
                    if d < bd || (d == bd && c < bc) {
                        best = Some((c, d));
                    }
                }
            }
        }
        if let Some((c, _)) = best {
            medoids.push(c);
        }
    }

    // Empty clusters can leave the result short; top up greedily by
    // farthest-point so the size contract holds for both methods.
    while medoids.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for &c in candidates {
            if medoids.contains(&c) {
                continue;
            }
            let d = medoids
                .iter()
                .map(|&m| squared_distance(&vectors[c], &vectors[m]))
                .fold(f32::INFINITY, f32::min);
            match best {
                None => best = Some((c, d)),
                Some((bc, bd)) => {
                    if d > bd || (d == bd && c < bc) {
                        best = Some((c, d));
                    }
                }
            }
        }
        match best {
            Some((c, _)) => medoids.push(c),
            None => break,
        }
    }

    medoids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SelectionMethod;

    /// Ten 2-D points: two tight groups far apart plus a lone outlier.
    fn test_vectors() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![0.1, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 10.0],
            vec![10.0, 10.1],
            vec![10.1, 10.1],
            vec![-50.0, 40.0],
            vec![-50.1, 40.1],
        ]
    }

    fn all_candidates(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn fps_returns_exactly_target_distinct_indices() {
        let vectors = test_vectors();
        let candidates = all_candidates(vectors.len());
        let selected = select_fps(&vectors, &candidates, 4, 7);
        assert_eq!(selected.len(), 4);
        let mut unique = selected.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 4);
        for idx in &selected {
            assert!(candidates.contains(idx));
        }
    }

    #[test]
    fn fps_is_deterministic_for_a_fixed_seed() {
        let vectors = test_vectors();
        let candidates = all_candidates(vectors.len());
        let a = select_fps(&vectors, &candidates, 5, 42);
        let b = select_fps(&vectors, &candidates, 5, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn fps_covers_separated_groups() {
        // With 3 picks over 3 well-separated groups, FPS must touch each group.
        let vectors = test_vectors();
        let candidates = all_candidates(vectors.len());
        let selected = select_fps(&vectors, &candidates, 3, 1);
        let groups: Vec<usize> = selected
            .iter()
            .map(|&i| match i {
                0..=3 => 0,
                4..=7 => 1,
                _ => 2,
            })
            .collect();
        let mut unique = groups.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 3, "selection {:?} missed a group", selected);
    }

    #[test]
    fn fps_empty_candidates_yield_empty_selection() {
        let vectors = test_vectors();
        assert!(select_fps(&vectors, &[], 3, 9).is_empty());
    }

    #[test]
    fn fps_clips_to_pool_size() {
        let vectors = test_vectors();
        let candidates = vec![2, 5, 8];
        let selected = select_fps(&vectors, &candidates, 10, 3);
        let mut sorted = selected.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, candidates);
    }

    #[test]
    fn fps_never_selects_outside_pool() {
        let vectors = test_vectors();
        let candidates = vec![0, 1, 4, 5, 8];
        for seed in 0..10 {
            let selected = select_fps(&vectors, &candidates, 3, seed);
            for idx in selected {
                assert!(candidates.contains(&idx));
            }
        }
    }

    #[test]
    fn kmeans_returns_real_candidates_only() {
        let vectors = test_vectors();
        let candidates = all_candidates(vectors.len());
        let selected = select_kmeans(&vectors, &candidates, 3, 11, DEFAULT_KMEANS_MAX_ITER);
        assert_eq!(selected.len(), 3);
        for idx in &selected {
            assert!(candidates.contains(idx), "synthetic index {}", idx);
        }
        let mut unique = selected.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn kmeans_is_deterministic_for_a_fixed_seed() {
        let vectors = test_vectors();
        let candidates = all_candidates(vectors.len());
        let a = select_kmeans(&vectors, &candidates, 4, 99, DEFAULT_KMEANS_MAX_ITER);
        let b = select_kmeans(&vectors, &candidates, 4, 99, DEFAULT_KMEANS_MAX_ITER);
        assert_eq!(a, b);
    }

    #[test]
    fn kmeans_pool_equal_to_target_returns_whole_pool() {
        let vectors = test_vectors();
        let candidates = vec![1, 4, 9];
        let selected = select_kmeans(&vectors, &candidates, 3, 5, DEFAULT_KMEANS_MAX_ITER);
        assert_eq!(selected, vec![1, 4, 9]);
    }

    #[test]
    fn kmeans_empty_candidates_yield_empty_selection() {
        let vectors = test_vectors();
        assert!(select_kmeans(&vectors, &[], 2, 5, DEFAULT_KMEANS_MAX_ITER).is_empty());
    }

    #[test]
    fn kmeans_one_medoid_per_separated_group() {
        let vectors = test_vectors();
        let candidates = all_candidates(vectors.len());
        let selected = select_kmeans(&vectors, &candidates, 3, 3, DEFAULT_KMEANS_MAX_ITER);
        let groups: Vec<usize> = selected
            .iter()
            .map(|&i| match i {
                0..=3 => 0,
                4..=7 => 1,
                _ => 2,
            })
            .collect();
        let mut unique = groups.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 3, "selection {:?} missed a group", selected);
    }

    #[test]
    fn dispatch_matches_direct_calls() {
        let vectors = test_vectors();
        let candidates = all_candidates(vectors.len());
        assert_eq!(
            select(SelectionMethod::Fps, &vectors, &candidates, 3, 8, 50),
            select_fps(&vectors, &candidates, 3, 8)
        );
        assert_eq!(
            select(SelectionMethod::Kmeans, &vectors, &candidates, 3, 8, 50),
            select_kmeans(&vectors, &candidates, 3, 8, 50)
        );
    }
}
