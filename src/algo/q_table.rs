use std::{collections::HashMap, marker::PhantomData, path::Path};

use burn::config::Config;
use log::{info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    checkpoint::{self, Artifacts},
    decay,
    env::{DiscreteActionSpace, Environment, RewardShaping},
    error::Error,
    exploration::{Choice, EpsilonGreedy},
    util::{argmax, check_interval, check_positive, tail_mean},
};

/// Key of a continuous state rounded to `precision` decimals per component
///
/// ```
/// # use classic_rl::algo::q_table::state_key;
/// assert_eq!(state_key(&[0.123, -0.004, 1.0], 2), "0.12_0.00_1.00");
/// ```
pub fn state_key(state: &[f32], precision: u32) -> String {
    let scale = 10f32.powi(precision as i32);
    state
        .iter()
        .map(|&x| {
            // Adding zero folds -0.0 into 0.0 so both round to the same key
            let rounded = (x * scale).round() / scale + 0.0;
            format!("{rounded:.prec$}", prec = precision as usize)
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// Action values per discretized state
///
/// Every row holds exactly `num_actions` values. States that were never
/// updated read as all zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QTable {
    num_actions: usize,
    values: HashMap<String, Vec<f32>>,
}

impl QTable {
    pub fn new(num_actions: usize) -> Self {
        Self {
            num_actions,
            values: HashMap::new(),
        }
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    /// Number of visited states
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Q value of `action` in `state`, `None` if `action` is outside of the action space
    pub fn get(&self, state: &str, action: usize) -> Option<f32> {
        if action >= self.num_actions {
            return None;
        }
        Some(self.values.get(state).map_or(0.0, |row| row[action]))
    }

    /// **Errors** if `action` is outside of the action space
    pub fn set(&mut self, state: &str, action: usize, value: f32) -> crate::Result<()> {
        let num_actions = self.num_actions;
        if action >= num_actions {
            return Err(Error::InvalidAction {
                action,
                num_actions,
            });
        }
        let row = self
            .values
            .entry(state.to_owned())
            .or_insert_with(|| vec![0.0; num_actions]);
        row[action] = value;
        Ok(())
    }

    /// The highest Q value available in `state`
    pub fn value(&self, state: &str) -> f32 {
        match self.values.get(state) {
            Some(row) => row.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            None => 0.0,
        }
    }

    /// The action with the highest Q value in `state`, the lowest index winning ties
    pub fn best_action(&self, state: &str) -> usize {
        self.values.get(state).map_or(0, |row| argmax(row))
    }

    fn validate(&self) -> crate::Result<()> {
        match self.values.values().find(|row| row.len() != self.num_actions) {
            Some(row) => Err(Error::InvalidConfig(format!(
                "Q table row has {} values, expected {}",
                row.len(),
                self.num_actions
            ))),
            None => Ok(()),
        }
    }
}

/// Configuration for the [`QTableAgent`]
#[derive(Config, Debug)]
pub struct QTableAgentConfig {
    /// The discount factor
    #[config(default = 0.9)]
    pub gamma: f32,
    /// The learning rate
    #[config(default = 0.8)]
    pub alpha: f32,
    /// Initial exploration probability
    #[config(default = 0.9)]
    pub epsilon: f32,
    #[config(default = 0.1)]
    pub epsilon_min: f32,
    /// Factor applied to epsilon after each exploratory step
    #[config(default = 0.95)]
    pub epsilon_decay: f32,
    /// Decimals kept per state component when discretizing
    #[config(default = 2)]
    pub precision: u32,
    /// Number of recent episodes averaged for the stopping criterion
    #[config(default = 10)]
    pub mean_window: usize,
    /// Training stops once the windowed mean reward reaches this
    #[config(default = 495.0)]
    pub reward_bound: f32,
    /// Episodes between progress reports
    #[config(default = 1)]
    pub report_interval: usize,
    #[config(default = "-100.0")]
    pub failure_penalty: f32,
    #[config(default = 100.0)]
    pub completion_bonus: f32,
    pub seed: Option<u64>,
}

impl QTableAgentConfig {
    pub fn validate(&self) -> crate::Result<()> {
        check_interval("alpha", self.alpha.into(), 0.0, 1.0)?;
        check_interval("gamma", self.gamma.into(), 0.0, 1.0)?;
        check_interval("epsilon", self.epsilon.into(), 0.0, 1.0)?;
        check_interval("epsilon_min", self.epsilon_min.into(), 0.0, 1.0)?;
        check_positive("mean_window", self.mean_window)?;
        check_positive("report_interval", self.report_interval)
    }
}

/// A Q-learning agent that records its learned values in a [`QTable`]
///
/// ### Generics
/// - `E` - The [`Environment`] in which the agent will learn
///     - The action space must be discrete because a Q value is recorded for each action
///     - The state must be viewable as `&[f32]`; it is discretized into a string key
pub struct QTableAgent<E> {
    q_table: QTable,
    exploration: EpsilonGreedy<decay::Multiplicative>,
    shaping: RewardShaping,
    config: QTableAgentConfig,
    rng: StdRng,
    environment: PhantomData<E>,
}

impl<E> QTableAgent<E>
where
    E: Environment + DiscreteActionSpace,
    E::State: AsRef<[f32]>,
    E::Action: From<usize> + Into<usize>,
{
    /// Initialize a new `QTableAgent` for an action space of size `num_actions`
    ///
    /// **Errors** if the configuration is invalid
    pub fn new(config: QTableAgentConfig, num_actions: usize) -> crate::Result<Self> {
        config.validate()?;
        check_positive("num_actions", num_actions)?;
        let exploration = decay::Multiplicative::new(
            config.epsilon_decay,
            config.epsilon,
            config.epsilon_min,
        )
        .map(EpsilonGreedy::new)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            q_table: QTable::new(num_actions),
            exploration,
            shaping: RewardShaping {
                failure_penalty: config.failure_penalty,
                completion_bonus: config.completion_bonus,
            },
            config,
            rng,
            environment: PhantomData,
        })
    }

    pub fn q_table(&self) -> &QTable {
        &self.q_table
    }

    pub fn epsilon(&self) -> f32 {
        self.exploration.epsilon()
    }

    fn key(&self, state: &E::State) -> String {
        state_key(state.as_ref(), self.config.precision)
    }

    /// Epsilon-greedy action; epsilon only decays when the agent explores
    fn act(&mut self, key: &str) -> usize {
        match self.exploration.choose(&mut self.rng) {
            Choice::Explore => {
                self.exploration.decay();
                self.rng.gen_range(0..self.q_table.num_actions())
            }
            Choice::Exploit => self.q_table.best_action(key),
        }
    }

    /// Apply the temporal difference update for one transition
    ///
    /// `next` is `None` for a terminal transition, which has no future value
    ///
    /// **Errors** if `action` is outside of the action space
    pub fn learn(
        &mut self,
        key: &str,
        action: usize,
        reward: f32,
        next: Option<&str>,
    ) -> crate::Result<()> {
        let q_value = self.q_table.get(key, action).ok_or(Error::InvalidAction {
            action,
            num_actions: self.q_table.num_actions(),
        })?;
        let max_next_q = next.map_or(0.0, |n| self.q_table.value(n));
        let new_q_value = reward + self.config.gamma * max_next_q;
        let alpha = self.config.alpha;
        self.q_table
            .set(key, action, (1.0 - alpha) * q_value + alpha * new_q_value)
    }

    /// Deploy the agent into the environment for one training episode
    ///
    /// **Returns** the shaped total reward
    ///
    /// **Errors** if the environment has more actions than the table
    pub fn go(&mut self, env: &mut E) -> crate::Result<f32> {
        let mut total = 0.0;
        let mut key = self.key(&env.reset());

        loop {
            let action = self.act(&key);
            let (next_state, raw_reward) = env.step(E::Action::from(action));
            let reward = self.shaping.step(next_state.is_none(), raw_reward);
            total += reward;

            let next_key = next_state.as_ref().map(|s| self.key(s));
            self.learn(&key, action, reward, next_key.as_deref())?;

            match next_key {
                Some(next_key) => key = next_key,
                None => break,
            }
        }

        Ok(self.shaping.finish(total))
    }

    /// Train for up to `num_episodes` episodes
    ///
    /// The table is saved to `artifacts.checkpoint` once the windowed mean
    /// reward reaches the bound, or after the last episode.
    ///
    /// **Returns** the shaped reward of every episode
    pub fn train(
        &mut self,
        env: &mut E,
        num_episodes: usize,
        artifacts: &Artifacts,
    ) -> crate::Result<Vec<f32>> {
        let mut total_rewards = Vec::new();

        for episode in 1..=num_episodes {
            let reward = self.go(env)?;
            total_rewards.push(reward);
            let mean_reward = tail_mean(&total_rewards, self.config.mean_window);

            if episode % self.config.report_interval == 0 {
                info!(
                    "Episode: {episode}/{num_episodes} \tTotal Reward: {reward} \tMean Total Rewards: {mean_reward:.2}"
                );
            }

            if mean_reward >= self.config.reward_bound {
                info!("Episode {episode}: mean reward {mean_reward:.2} reached the bound, stopping");
                break;
            }
        }

        self.save(&artifacts.checkpoint)?;
        Ok(total_rewards)
    }

    /// Run the greedy policy for `num_episodes` episodes without learning or shaping
    ///
    /// **Returns** the raw total reward of each episode
    pub fn play(&mut self, env: &mut E, num_episodes: usize) -> Vec<f32> {
        (1..=num_episodes)
            .map(|episode| {
                let mut total = 0.0;
                let mut next_state = Some(env.reset());
                while let Some(state) = next_state {
                    let action = self.q_table.best_action(&self.key(&state));
                    let (next, reward) = env.step(E::Action::from(action));
                    total += reward;
                    next_state = next;
                }
                info!("Episode: {episode} \tTotal Reward: {total}");
                total
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        checkpoint::save_json(&self.q_table, path)
    }

    /// Replace the table with the one saved at `path`
    ///
    /// **Errors** if it cannot be read or was built for a different action space
    pub fn load(&mut self, path: &Path) -> crate::Result<()> {
        let table: QTable = checkpoint::load_json(path)?;
        if table.num_actions != self.q_table.num_actions {
            return Err(Error::InvalidConfig(format!(
                "Q table at {} has {} actions, expected {}",
                path.display(),
                table.num_actions,
                self.q_table.num_actions
            )));
        }
        table.validate()?;
        self.q_table = table;
        Ok(())
    }

    /// Like [`load`](Self::load), but keeps the current table if there is no usable one
    pub fn restore(&mut self, path: &Path) {
        match self.load(path) {
            Ok(()) => info!("Loaded {} Q table rows from {}", self.q_table.len(), path.display()),
            Err(err) => warn!("Model does not exist ({err}), creating a new one"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::tests::MockEnv;

    type Agent = QTableAgent<MockEnv>;

    fn test_config() -> QTableAgentConfig {
        QTableAgentConfig::new().with_seed(Some(5))
    }

    #[test]
    fn state_keys_discretize() {
        assert_eq!(state_key(&[0.126, 0.5], 2), "0.13_0.50");
        assert_eq!(state_key(&[-0.001], 2), "0.00", "negative zero folded");
        assert_eq!(state_key(&[-0.25], 1), "-0.3");
        assert_eq!(state_key(&[0.1234], 2), state_key(&[0.1201], 2));
    }

    #[test]
    fn q_table_defaults_to_zero() {
        let mut table = QTable::new(3);
        assert_eq!(table.get("s", 2), Some(0.0));
        assert_eq!(table.value("s"), 0.0);
        assert_eq!(table.best_action("s"), 0);

        table.set("s", 1, -2.0).unwrap();
        assert_eq!(table.value("s"), 0.0, "untouched actions stay zero");
        table.set("s", 2, 3.0).unwrap();
        assert_eq!(table.best_action("s"), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn q_table_rejects_unknown_actions() {
        let mut table = QTable::new(2);
        assert_eq!(table.get("s", 2), None);
        assert!(matches!(
            table.set("s", 2, 1.0),
            Err(Error::InvalidAction {
                action: 2,
                num_actions: 2
            })
        ));
        assert!(table.is_empty(), "no row created");

        let mut agent = Agent::new(test_config(), 2).unwrap();
        assert!(agent.learn("s", 5, 1.0, None).is_err());
        assert!(agent.q_table().is_empty());
    }

    #[test]
    fn learn_applies_td_update() {
        let mut agent = Agent::new(test_config(), 2).unwrap();
        agent.q_table.set("next", 0, 10.0).unwrap();
        agent.q_table.set("next", 1, 20.0).unwrap();
        agent.q_table.set("s", 1, 5.0).unwrap();

        agent.learn("s", 1, 1.0, Some("next")).unwrap();
        // (1 - 0.8) * 5 + 0.8 * (1 + 0.9 * 20)
        let q = agent.q_table.get("s", 1).unwrap();
        assert!((q - 16.2).abs() < 1e-5);

        agent.learn("t", 0, -100.0, None).unwrap();
        let q = agent.q_table.get("t", 0).unwrap();
        assert!((q - -80.0).abs() < 1e-5, "terminal has no future value");
    }

    #[test]
    fn epsilon_decays_only_when_exploring() {
        let config = test_config()
            .with_epsilon(1.0)
            .with_epsilon_min(0.0)
            .with_epsilon_decay(0.5);
        let mut agent = Agent::new(config, 2).unwrap();
        agent.act("s");
        assert_eq!(agent.epsilon(), 0.5, "explored once");

        let config = test_config().with_epsilon(0.0).with_epsilon_min(0.0);
        let mut agent = Agent::new(config, 2).unwrap();
        agent.q_table.set("s", 1, 1.0).unwrap();
        for _ in 0..10 {
            assert_eq!(agent.act("s"), 1, "greedy");
        }
    }

    #[test]
    fn train_saves_table_and_play_uses_it() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::in_dir(dir.path(), "q.json");
        let mut agent = Agent::new(test_config(), 2).unwrap();
        let mut env = MockEnv::new(4, 6);

        let rewards = agent.train(&mut env, 20, &artifacts).unwrap();
        assert_eq!(rewards.len(), 20);
        assert!(!agent.q_table().is_empty());

        let mut restored = Agent::new(test_config(), 2).unwrap();
        restored.load(&artifacts.checkpoint).unwrap();
        assert_eq!(restored.q_table(), agent.q_table());
        assert_eq!(restored.play(&mut env, 3).len(), 3);

        let mut mismatched = Agent::new(test_config(), 3).unwrap();
        assert!(mismatched.load(&artifacts.checkpoint).is_err());
        mismatched.restore(&artifacts.checkpoint);
        assert!(mismatched.q_table().is_empty(), "kept the fresh table");
    }

    #[test]
    fn train_stops_at_reward_bound() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::in_dir(dir.path(), "q.json");
        let config = test_config().with_reward_bound(0.0).with_mean_window(3);
        let mut agent = Agent::new(config, 2).unwrap();
        let mut env = MockEnv::new(4, 6);

        let rewards = agent.train(&mut env, 100, &artifacts).unwrap();
        assert_eq!(rewards.len(), 1);
        assert!(artifacts.checkpoint.exists());
    }
}
