use std::collections::BTreeMap;

/// Represents a Markov decision process, defining the dynamics of an environment
/// in which an agent can operate.
///
/// This base trait represents the common case of a discrete-time MDP with one agent
/// and episodic tasks.
pub trait Environment {
    /// A representation of the state of the environment to be passed to an agent
    type State: Clone;

    /// A representation of an action that an agent can take to affect the environment
    type Action: Clone;

    /// Update the environment in response to an action taken by an agent, producing a new state and associated reward
    ///
    /// **Returns** `(next_state, reward)`, where `next_state` is `None` once the episode is over
    fn step(&mut self, action: Self::Action) -> (Option<Self::State>, f32);

    /// Reset the environment to an initial state
    ///
    /// **Returns** the state
    fn reset(&mut self) -> Self::State;
}

/// An environment with a finite set of actions, each identified by an index in `0..num_actions()`
///
/// Agents working over this trait additionally need `Action: From<usize> + Into<usize>`
pub trait DiscreteActionSpace: Environment {
    /// Get all actions in index order
    fn actions(&self) -> Vec<Self::Action>;

    /// Size of the action space
    fn num_actions(&self) -> usize {
        self.actions().len()
    }
}

/// Reward shaping applied while training
///
/// The step that ends an episode has its reward replaced with
/// `failure_penalty`, whether the episode failed or hit the step limit, and
/// every finished episode gets `completion_bonus` added to its total. With a
/// penalty of -100 and a bonus of 100, a full 500 step CartPole episode totals 499.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardShaping {
    pub failure_penalty: f32,
    pub completion_bonus: f32,
}

impl RewardShaping {
    /// Shape the reward of a single step
    pub fn step(&self, done: bool, reward: f32) -> f32 {
        if done {
            self.failure_penalty
        } else {
            reward
        }
    }

    /// Shape the total of a finished episode
    pub fn finish(&self, total: f32) -> f32 {
        total + self.completion_bonus
    }
}

/// A tally of named per-episode metrics
#[derive(Debug, Clone, Default)]
pub struct Report {
    metrics: BTreeMap<&'static str, f64>,
}

impl Report {
    pub fn new(keys: Vec<&'static str>) -> Self {
        Self {
            metrics: keys.into_iter().map(|k| (k, 0.0)).collect(),
        }
    }

    /// Add `value` to a tracked metric, ignoring untracked keys
    pub fn add(&mut self, key: &str, value: f64) {
        if let Some(x) = self.metrics.get_mut(key) {
            *x += value;
        }
    }

    /// Return the current tally and zero every metric
    pub fn take(&mut self) -> BTreeMap<&'static str, f64> {
        let zeroed = self.metrics.keys().map(|&k| (k, 0.0)).collect();
        std::mem::replace(&mut self.metrics, zeroed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A one-dimensional corridor of `len` cells
    ///
    /// The agent starts in the middle. Episodes end when it steps off either
    /// end or after `max_steps` steps. Every step is worth `1.0`, and the state
    /// is `[position / len, steps / max_steps]`.
    #[derive(Debug, Clone)]
    pub struct MockEnv {
        pub len: i32,
        pub max_steps: u32,
        pos: i32,
        steps: u32,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MockAction {
        Left,
        Right,
    }

    impl From<usize> for MockAction {
        fn from(value: usize) -> Self {
            if value == 0 {
                Self::Left
            } else {
                Self::Right
            }
        }
    }

    impl From<MockAction> for usize {
        fn from(value: MockAction) -> Self {
            value as usize
        }
    }

    impl MockEnv {
        pub fn new(len: i32, max_steps: u32) -> Self {
            Self {
                len,
                max_steps,
                pos: len / 2,
                steps: 0,
            }
        }

        fn state(&self) -> [f32; 2] {
            [
                self.pos as f32 / self.len as f32,
                self.steps as f32 / self.max_steps as f32,
            ]
        }
    }

    impl Environment for MockEnv {
        type State = [f32; 2];
        type Action = MockAction;

        fn step(&mut self, action: Self::Action) -> (Option<Self::State>, f32) {
            self.pos += match action {
                MockAction::Left => -1,
                MockAction::Right => 1,
            };
            self.steps += 1;

            let fell_off = self.pos < 0 || self.pos >= self.len;
            if fell_off || self.steps >= self.max_steps {
                (None, 1.0)
            } else {
                (Some(self.state()), 1.0)
            }
        }

        fn reset(&mut self) -> Self::State {
            self.pos = self.len / 2;
            self.steps = 0;
            self.state()
        }
    }

    impl DiscreteActionSpace for MockEnv {
        fn actions(&self) -> Vec<Self::Action> {
            vec![MockAction::Left, MockAction::Right]
        }
    }

    /// Shaped total of `steps` steps under the `-100`/`+100` shaping
    pub fn shaped_total(steps: u32) -> f32 {
        steps as f32 - 1.0
    }

    #[test]
    fn mock_env_ends_episodes() {
        let mut env = MockEnv::new(4, 10);
        env.reset();
        assert_eq!(env.step(MockAction::Left).0, Some([0.25, 0.1]));
        assert_eq!(env.step(MockAction::Left).0, Some([0.0, 0.2]));
        assert_eq!(env.step(MockAction::Left).0, None, "fell off");

        env.reset();
        for i in 0..9 {
            let action = MockAction::from(i % 2);
            assert!(env.step(action).0.is_some());
        }
        assert!(env.step(MockAction::Right).0.is_none(), "step limit");
    }

    #[test]
    fn shaping_penalizes_every_terminal_step() {
        let shaping = RewardShaping {
            failure_penalty: -100.0,
            completion_bonus: 100.0,
        };
        assert_eq!(shaping.step(false, 1.0), 1.0);
        assert_eq!(shaping.step(true, 1.0), -100.0);
        assert_eq!(shaping.finish(41.0), 141.0);

        // A full-length episode: 499 unit steps, then the penalized last one
        let mut env = MockEnv::new(2000, 500);
        env.reset();
        let mut total = 0.0;
        let mut steps = 0;
        loop {
            let (next, reward) = env.step(MockAction::from(steps as usize % 2));
            steps += 1;
            total += shaping.step(next.is_none(), reward);
            if next.is_none() {
                break;
            }
        }
        assert_eq!(steps, 500);
        assert_eq!(shaping.finish(total), 499.0);
        assert_eq!(shaping.finish(total), shaped_total(steps));
    }

    #[test]
    fn report_functional() {
        let mut report = Report::new(vec!["steps", "reward"]);
        report.add("reward", 2.0);
        report.add("reward", 3.0);
        report.add("steps", 7.0);
        report.add("unknown", 1.0);

        let tally = report.take();
        assert_eq!(tally.keys().copied().collect::<Vec<_>>(), ["reward", "steps"]);
        assert_eq!(tally.get("reward"), Some(&5.0));
        assert_eq!(tally.get("steps"), Some(&7.0));
        assert_eq!(report.take().get("reward"), Some(&0.0), "zeroed after take");
    }
}
