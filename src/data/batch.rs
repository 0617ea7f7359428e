use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of the training and validation partitions
#[derive(Debug, Clone)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
}

/// Splits `n_rows` rows into train/validation partitions. The shuffle is
/// seeded, so the same seed always yields the same partition.
pub fn train_val_split(n_rows: usize, val_split: f32, seed: u64) -> SplitIndices {
    let mut order: Vec<usize> = (0..n_rows).collect();
    let mut rng = SmallRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let val_len = ((n_rows as f32) * val_split).round() as usize;
    let val_len = val_len.min(n_rows);
    let train_len = n_rows - val_len;

    let val = order.split_off(train_len);
    SplitIndices { train: order, val }
}

/// Iterator over shuffled mini-batches of row indices
pub struct BatchIterator {
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl BatchIterator {
    /// Reshuffles `indices` with the supplied RNG and chunks them. The last
    /// batch may be short.
    pub fn new(indices: &[usize], batch_size: usize, rng: &mut SmallRng) -> Self {
        let mut order = indices.to_vec();
        order.shuffle(rng);
        Self {
            order,
            batch_size,
            cursor: 0,
        }
    }
}

impl Iterator for BatchIterator {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_split_sizes() {
        let split = train_val_split(10, 0.2, 42);
        assert_eq!(split.train.len(), 8);
        assert_eq!(split.val.len(), 2);
    }

    #[test]
    fn test_split_is_deterministic_for_a_seed() {
        let a = train_val_split(100, 0.3, 7);
        let b = train_val_split(100, 0.3, 7);
        assert_eq!(a.train, b.train);
        assert_eq!(a.val, b.val);

        let c = train_val_split(100, 0.3, 8);
        assert_ne!(a.train, c.train);
    }

    #[test]
    fn test_split_partitions_are_disjoint_and_complete() {
        let split = train_val_split(50, 0.25, 3);
        let mut seen: HashSet<usize> = split.train.iter().copied().collect();
        for idx in &split.val {
            assert!(seen.insert(*idx), "index {} in both partitions", idx);
        }
        assert_eq!(seen.len(), 50);
    }

    #[test]
    fn test_batch_iterator_covers_every_index_once() {
        let indices: Vec<usize> = (0..23).collect();
        let mut rng = SmallRng::seed_from_u64(1);
        let batches: Vec<Vec<usize>> = BatchIterator::new(&indices, 5, &mut rng).collect();

        assert_eq!(batches.len(), 5);
        assert_eq!(batches.last().unwrap().len(), 3);

        let mut seen: Vec<usize> = batches.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, indices);
    }

    #[test]
    fn test_zero_val_split_keeps_everything_in_train() {
        let split = train_val_split(10, 0.0, 42);
        assert_eq!(split.train.len(), 10);
        assert!(split.val.is_empty());
    }
}
