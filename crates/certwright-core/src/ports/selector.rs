//! PruneSelector port - ランダム間引きの対象選択
//!
//! 乱数源を注入することで、削除サイクルをテストで再現可能にします。

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Mutex;

use crate::domain::Artifact;

/// Number of artifacts the pruning pass removes: `min(n, ⌈fraction × n⌉)`.
///
/// `fraction` is clamped to `[0, 1]`, so the result never exceeds `n`.
pub fn prune_count(candidates: usize, fraction: f64) -> usize {
    if candidates == 0 || fraction.is_nan() || fraction <= 0.0 {
        return 0;
    }
    let fraction = fraction.min(1.0);
    let count = (candidates as f64 * fraction).ceil() as usize;
    count.min(candidates)
}

pub trait PruneSelector: Send + Sync {
    /// Pick `count` artifacts out of `candidates`.
    fn select(&self, candidates: Vec<Artifact>, count: usize) -> Vec<Artifact>;
}

/// Shuffle-and-take over a seedable RNG.
pub struct RandomSelector {
    rng: Mutex<StdRng>,
}

impl RandomSelector {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl PruneSelector for RandomSelector {
    fn select(&self, mut candidates: Vec<Artifact>, count: usize) -> Vec<Artifact> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        candidates.shuffle(&mut *rng);
        candidates.truncate(count);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Identifier;
    use chrono::Utc;
    use rstest::rstest;
    use std::path::PathBuf;

    fn artifacts(n: usize) -> Vec<Artifact> {
        (0..n)
            .map(|i| {
                let id = Identifier::parse(format!("ST{i:03}")).unwrap();
                Artifact {
                    path: PathBuf::from(Artifact::file_name(&id)),
                    id,
                    size_bytes: 10,
                    created_at: Utc::now(),
                }
            })
            .collect()
    }

    #[rstest]
    #[case(0, 0.2, 0)]
    #[case(1, 0.2, 1)]
    #[case(4, 0.2, 1)]
    #[case(5, 0.2, 1)]
    #[case(6, 0.2, 2)]
    #[case(10, 0.2, 2)]
    #[case(11, 0.2, 3)]
    #[case(3, 0.0, 0)]
    #[case(3, -1.0, 0)]
    #[case(3, 5.0, 3)]
    #[case(3, f64::NAN, 0)]
    fn prune_count_is_bounded(
        #[case] candidates: usize,
        #[case] fraction: f64,
        #[case] expected: usize,
    ) {
        let count = prune_count(candidates, fraction);
        assert_eq!(count, expected);
        assert!(count <= candidates);
    }

    #[test]
    fn same_seed_selects_same_artifacts() {
        let a = RandomSelector::seeded(42).select(artifacts(20), 4);
        let b = RandomSelector::seeded(42).select(artifacts(20), 4);
        let ids_a: Vec<_> = a.iter().map(|x| x.id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|x| x.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(ids_a.len(), 4);
    }

    #[test]
    fn selection_never_exceeds_candidates() {
        let picked = RandomSelector::seeded(7).select(artifacts(2), 5);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn selection_has_no_duplicates() {
        let picked = RandomSelector::from_entropy().select(artifacts(10), 10);
        let mut ids: Vec<_> = picked.into_iter().map(|a| a.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }
}
