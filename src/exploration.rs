use rand::Rng;

use crate::decay::Decay;

/// Exploration policy result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Explore,
    Exploit,
}

/// Epsilon greedy exploration policy with a decaying epsilon threshold
///
/// Unlike a schedule indexed by episode, the decay clock here only advances
/// when the owning agent calls [`decay`](Self::decay), so each algorithm
/// decides what counts as one decay step.
#[derive(Debug, Clone)]
pub struct EpsilonGreedy<D: Decay> {
    epsilon: D,
    t: u32,
}

impl<D: Decay> EpsilonGreedy<D> {
    /// Initialize epsilon greedy policy with a decay strategy
    pub fn new(decay: D) -> Self {
        Self { epsilon: decay, t: 0 }
    }

    /// The current exploration probability
    pub fn epsilon(&self) -> f32 {
        self.epsilon.evaluate(self.t as f32)
    }

    /// Advance the decay clock by one step
    pub fn decay(&mut self) {
        self.t = self.t.saturating_add(1);
    }

    /// Invoke the policy: explore with probability epsilon
    pub fn choose(&self, rng: &mut impl Rng) -> Choice {
        if rng.gen::<f32>() < self.epsilon() {
            Choice::Explore
        } else {
            Choice::Exploit
        }
    }
}
