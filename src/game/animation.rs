//! Shrink-and-vanish removal animation

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Discrete steps from full size to gone
pub const ANIMATION_STEPS: u32 = 10;
/// Time between steps
pub const ANIMATION_TICK: Duration = Duration::from_millis(30);

/// A removal whose animation has reached its terminal step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedRemoval {
    pub indices: Vec<usize>,
}

#[derive(Debug, Clone)]
struct Batch {
    indices: Vec<usize>,
    step: u32,
}

impl Batch {
    fn scale(&self) -> f32 {
        1.0 - self.step as f32 / ANIMATION_STEPS as f32
    }
}

/// Tracks in-flight removals. Each accepted match is one batch whose cells
/// share a scale factor that falls linearly from 1 to 0.
#[derive(Debug, Default)]
pub struct RemovalAnimator {
    batches: Vec<Batch>,
    scales: BTreeMap<usize, f32>,
}

impl RemovalAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if any of `indices` is mid-removal
    pub fn overlaps(&self, indices: &BTreeSet<usize>) -> bool {
        indices.iter().any(|i| self.scales.contains_key(i))
    }

    pub fn is_animating(&self, index: usize) -> bool {
        self.scales.contains_key(&index)
    }

    /// Start a batch. Returns false without changing anything if the batch is
    /// empty or any index is already animating.
    pub fn start(&mut self, indices: &BTreeSet<usize>) -> bool {
        if indices.is_empty() || self.overlaps(indices) {
            return false;
        }
        for &index in indices {
            self.scales.insert(index, 1.0);
        }
        self.batches.push(Batch {
            indices: indices.iter().copied().collect(),
            step: 0,
        });
        true
    }

    /// Advance every batch by one step. Batches reaching the terminal step
    /// have their entries cleared and are returned for commit.
    pub fn tick(&mut self) -> Vec<CompletedRemoval> {
        let mut completed = Vec::new();
        let mut running = Vec::with_capacity(self.batches.len());

        for mut batch in self.batches.drain(..) {
            batch.step += 1;
            if batch.step >= ANIMATION_STEPS {
                for index in &batch.indices {
                    self.scales.remove(index);
                }
                completed.push(CompletedRemoval {
                    indices: batch.indices,
                });
            } else {
                let scale = batch.scale();
                for &index in &batch.indices {
                    self.scales.insert(index, scale);
                }
                running.push(batch);
            }
        }

        self.batches = running;
        completed
    }

    /// Current scale for a cell; 1.0 when it is not animating
    pub fn scale(&self, index: usize) -> f32 {
        self.scales.get(&index).copied().unwrap_or(1.0)
    }

    pub fn scales(&self) -> &BTreeMap<usize, f32> {
        &self.scales
    }

    pub fn is_idle(&self) -> bool {
        self.batches.is_empty()
    }

    /// Drop, without completing, every batch whose cells match `cancel`.
    /// Returns how many batches were dropped.
    pub fn cancel_where<F>(&mut self, mut cancel: F) -> usize
    where
        F: FnMut(&[usize]) -> bool,
    {
        let before = self.batches.len();
        let scales = &mut self.scales;
        self.batches.retain(|batch| {
            let drop_it = cancel(&batch.indices);
            if drop_it {
                for index in &batch.indices {
                    scales.remove(index);
                }
            }
            !drop_it
        });
        before - self.batches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(indices: &[usize]) -> BTreeSet<usize> {
        indices.iter().copied().collect()
    }

    #[test]
    fn scale_falls_linearly_then_completes() {
        let mut animator = RemovalAnimator::new();
        assert!(animator.start(&set(&[4, 5])));
        assert_eq!(animator.scale(4), 1.0);

        for step in 1..ANIMATION_STEPS {
            assert!(animator.tick().is_empty());
            let expected = 1.0 - step as f32 / 10.0;
            assert!((animator.scale(5) - expected).abs() < 1e-6);
        }

        let done = animator.tick();
        assert_eq!(done, vec![CompletedRemoval { indices: vec![4, 5] }]);
        assert!(animator.scales().is_empty());
        assert!(animator.is_idle());
    }

    #[test]
    fn overlapping_batch_is_refused() {
        let mut animator = RemovalAnimator::new();
        assert!(animator.start(&set(&[1, 2])));
        assert!(!animator.start(&set(&[2, 3])));
        assert!(!animator.is_animating(3));
        assert!(animator.start(&set(&[3, 4])));
    }

    #[test]
    fn batches_finish_independently() {
        let mut animator = RemovalAnimator::new();
        animator.start(&set(&[0]));
        for _ in 0..3 {
            animator.tick();
        }
        animator.start(&set(&[9]));

        let mut finished = Vec::new();
        for _ in 0..ANIMATION_STEPS {
            finished.extend(animator.tick());
        }
        assert_eq!(finished.len(), 2);
        assert_eq!(finished[0].indices, vec![0]);
        assert!(!animator.is_animating(9));
    }

    #[test]
    fn cancel_drops_only_matching_batches() {
        let mut animator = RemovalAnimator::new();
        animator.start(&set(&[1, 2]));
        animator.start(&set(&[3]));
        animator.tick();

        assert_eq!(animator.cancel_where(|cells| cells.contains(&2)), 1);
        assert_eq!(animator.scale(1), 1.0);
        assert!(animator.is_animating(3));

        let mut finished = Vec::new();
        for _ in 1..ANIMATION_STEPS {
            finished.extend(animator.tick());
        }
        assert_eq!(finished, vec![CompletedRemoval { indices: vec![3] }]);
    }
}
