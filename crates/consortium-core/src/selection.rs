//! Strategies for choosing which member acts next
//!
//! Multi-member flows need "some active member". The strategy makes that
//! choice explicit and, when seeded, reproducible.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// How to order or pick among candidates
#[derive(Debug, Clone, Default)]
pub enum SelectionStrategy {
    /// Always in the given order
    #[default]
    First,
    /// Rotate the starting point on every call
    RoundRobin {
        /// Offset for the next call
        next: usize,
    },
    /// Shuffle with a seeded generator
    Seeded(ChaCha8Rng),
}

impl SelectionStrategy {
    /// Seeded strategy if `seed` is set, otherwise `First`
    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::Seeded(ChaCha8Rng::seed_from_u64(seed)),
            None => Self::First,
        }
    }

    /// Round-robin starting at the first candidate
    pub fn round_robin() -> Self {
        Self::RoundRobin { next: 0 }
    }

    /// Order in which to try `candidates`
    pub fn order<T>(&mut self, mut candidates: Vec<T>) -> Vec<T> {
        match self {
            Self::First => {}
            Self::RoundRobin { next } => {
                if !candidates.is_empty() {
                    let start = *next % candidates.len();
                    candidates.rotate_left(start);
                    *next = next.wrapping_add(1);
                }
            }
            Self::Seeded(rng) => candidates.shuffle(rng),
        }
        candidates
    }

    /// Pick a single candidate
    pub fn pick<'a, T>(&mut self, candidates: &'a [T]) -> Option<&'a T> {
        let indices: Vec<usize> = (0..candidates.len()).collect();
        self.order(indices)
            .first()
            .and_then(|&index| candidates.get(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_preserves_order() {
        let mut strategy = SelectionStrategy::First;
        assert_eq!(strategy.order(vec![1, 2, 3]), vec![1, 2, 3]);
        assert_eq!(strategy.pick(&[4, 5]), Some(&4));
    }

    #[test]
    fn test_round_robin_rotates() {
        let mut strategy = SelectionStrategy::round_robin();
        assert_eq!(strategy.pick(&['a', 'b', 'c']), Some(&'a'));
        assert_eq!(strategy.pick(&['a', 'b', 'c']), Some(&'b'));
        assert_eq!(strategy.pick(&['a', 'b', 'c']), Some(&'c'));
        assert_eq!(strategy.pick(&['a', 'b', 'c']), Some(&'a'));
    }

    #[test]
    fn test_seeded_is_reproducible_permutation() {
        let mut a = SelectionStrategy::from_seed(Some(7));
        let mut b = SelectionStrategy::from_seed(Some(7));
        let order_a = a.order((0..10).collect::<Vec<_>>());
        let order_b = b.order((0..10).collect::<Vec<_>>());
        assert_eq!(order_a, order_b);

        let mut sorted = order_a;
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_candidates() {
        let mut strategy = SelectionStrategy::round_robin();
        assert_eq!(strategy.pick::<u8>(&[]), None);
    }
}
