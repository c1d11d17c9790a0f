use std::collections::VecDeque;

use rand::{seq::index, Rng};

use crate::env::Environment;

use super::{Exp, ExpBatch};

/// A fixed-size memory storage for reinforcement learning experiences
///
/// Once `capacity` experiences are stored, each push evicts the oldest one.
pub struct ReplayMemory<E: Environment> {
    memory: VecDeque<Exp<E>>,
    capacity: usize,
}

impl<E: Environment> ReplayMemory<E> {
    /// **Panics** if `capacity` is zero
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ReplayMemory capacity must be positive");
        Self {
            // Replay capacities run into the millions, so storage grows on demand
            memory: VecDeque::new(),
            capacity,
        }
    }

    /// Add a new experience to the memory
    pub fn push(&mut self, exp: Exp<E>) {
        if self.memory.len() == self.capacity {
            self.memory.pop_front();
        }
        self.memory.push_back(exp);
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Sample up to `batch_size` distinct experiences and zip them into a batch
    ///
    /// While the memory holds fewer than `batch_size` experiences, all of them are returned
    ///
    /// ### Returns
    /// - `Some(batch)` of `min(len, batch_size)` experiences
    /// - `None` if the memory is empty
    pub fn sample_zipped(&self, batch_size: usize, rng: &mut impl Rng) -> Option<ExpBatch<E>> {
        if self.memory.is_empty() || batch_size == 0 {
            return None;
        }

        let size = batch_size.min(self.memory.len());
        let picks = index::sample(rng, self.memory.len(), size);
        Some(ExpBatch::from_iter(picks.iter().map(|i| &self.memory[i]), size))
    }
}
