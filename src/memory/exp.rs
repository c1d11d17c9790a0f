use crate::env::Environment;

/// Represents a single experience or transition in the environment
pub struct Exp<E: Environment> {
    /// The state of the environment before taking the action
    pub state: E::State,
    /// The action taken in the given state
    pub action: E::Action,
    /// The state of the environment after the action is taken, or if terminal, `None`
    pub next_state: Option<E::State>,
    /// The (shaped) reward received after taking the action
    pub reward: f32,
}

impl<E: Environment> Clone for Exp<E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            action: self.action.clone(),
            next_state: self.next_state.clone(),
            reward: self.reward,
        }
    }
}

/// A zipped batch of [experiences](Exp)
pub struct ExpBatch<E: Environment> {
    pub states: Vec<E::State>,
    pub actions: Vec<E::Action>,
    pub next_states: Vec<Option<E::State>>,
    pub rewards: Vec<f32>,
}

impl<E: Environment> ExpBatch<E> {
    /// Zip experiences into a batch, cloning each field
    pub fn from_iter<'a>(iter: impl IntoIterator<Item = &'a Exp<E>>, batch_size: usize) -> Self
    where
        E: 'a,
    {
        let batch = Self {
            states: Vec::with_capacity(batch_size),
            actions: Vec::with_capacity(batch_size),
            next_states: Vec::with_capacity(batch_size),
            rewards: Vec::with_capacity(batch_size),
        };

        iter.into_iter().fold(batch, |mut b, e| {
            b.states.push(e.state.clone());
            b.actions.push(e.action.clone());
            b.next_states.push(e.next_state.clone());
            b.rewards.push(e.reward);
            b
        })
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::tests::{MockAction, MockEnv};

    use super::*;

    #[test]
    fn exp_batch_from_iter() {
        let experiences: [Exp<MockEnv>; 2] = [
            Exp {
                state: [0.0, 0.0],
                action: MockAction::Right,
                next_state: Some([0.5, 0.1]),
                reward: 1.0,
            },
            Exp {
                state: [0.5, 0.1],
                action: MockAction::Left,
                next_state: None,
                reward: -100.0,
            },
        ];
        let batch = ExpBatch::from_iter(&experiences, 2);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.states, [[0.0, 0.0], [0.5, 0.1]], "states zipped");
        assert_eq!(batch.actions, [MockAction::Right, MockAction::Left], "actions zipped");
        assert_eq!(batch.next_states, [Some([0.5, 0.1]), None], "next states zipped");
        assert_eq!(batch.rewards, [1.0, -100.0], "rewards zipped");
    }
}
