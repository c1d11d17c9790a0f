use std::path::Path;

use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use log::{debug, info};
use nn::loss::{MseLoss, Reduction};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    checkpoint::{self, Artifacts},
    decay,
    env::{DiscreteActionSpace, Environment, RewardShaping},
    exploration::{Choice, EpsilonGreedy},
    memory::{Exp, ReplayMemory},
    plot,
    tensor::{to_rows, ToTensor},
    util::{argmax, check_interval, check_positive, tail_mean},
};

/// A burn module used with a Deep Q network agent
pub trait DQNModel<B: AutodiffBackend>: AutodiffModule<B> {
    /// Forward pass through the model, producing one Q value per action
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Soft update the parameters of the target network
    ///
    /// θ′ ← τθ + (1 − τ)θ′
    ///
    /// ```ignore
    /// target_net = target_net.soft_update(policy_net, tau);
    /// ```
    fn soft_update(self, other: &Self, tau: f32) -> Self;
}

/// How the target network follows the policy network
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TargetUpdate {
    /// Copy the policy network every `interval` steps
    Hard { interval: u32 },
    /// Blend the policy network in with rate `tau` every step
    Soft { tau: f32 },
}

/// Configuration for the [`DQNAgent`]
#[derive(Config, Debug)]
pub struct DQNAgentConfig {
    /// Capacity of the replay memory
    #[config(default = 1000000)]
    pub memory_capacity: usize,
    /// Number of experiences replayed per step
    #[config(default = 128)]
    pub batch_size: usize,
    /// Weight of the new target when blending it into the current Q value
    #[config(default = 0.2)]
    pub alpha: f32,
    /// The discount factor
    #[config(default = 0.95)]
    pub gamma: f32,
    /// Initial exploration probability
    #[config(default = 0.1)]
    pub epsilon: f32,
    /// Exploration floor, also used when playing
    #[config(default = 0.01)]
    pub epsilon_min: f32,
    /// Factor applied to epsilon after each step
    #[config(default = 0.98)]
    pub epsilon_decay: f32,
    /// The learning rate for the optimizer
    #[config(default = 1e-3)]
    pub lr: f64,
    #[config(default = "TargetUpdate::Hard { interval: 1000 }")]
    pub target_update: TargetUpdate,
    /// Episodes between checkpoints
    #[config(default = 10)]
    pub save_interval: usize,
    /// Episodes between progress reports and plot refreshes
    #[config(default = 100)]
    pub report_interval: usize,
    /// Number of recent episodes averaged for the stopping criterion
    #[config(default = 5)]
    pub mean_window: usize,
    /// Training stops once the windowed mean reward exceeds this
    #[config(default = 495.0)]
    pub reward_bound: f32,
    #[config(default = "-100.0")]
    pub failure_penalty: f32,
    #[config(default = 100.0)]
    pub completion_bonus: f32,
    pub seed: Option<u64>,
}

impl DQNAgentConfig {
    pub fn validate(&self) -> crate::Result<()> {
        check_interval("alpha", self.alpha.into(), 0.0, 1.0)?;
        check_interval("gamma", self.gamma.into(), 0.0, 1.0)?;
        check_interval("epsilon", self.epsilon.into(), 0.0, 1.0)?;
        check_interval("epsilon_min", self.epsilon_min.into(), 0.0, 1.0)?;
        check_interval("lr", self.lr, 0.0, 1.0)?;
        check_positive("memory_capacity", self.memory_capacity)?;
        check_positive("batch_size", self.batch_size)?;
        check_positive("save_interval", self.save_interval)?;
        check_positive("report_interval", self.report_interval)?;
        check_positive("mean_window", self.mean_window)?;
        match self.target_update {
            TargetUpdate::Hard { interval } => check_positive("interval", interval as usize),
            TargetUpdate::Soft { tau } => check_interval("tau", tau.into(), 0.0, 1.0),
        }
    }

    fn exploration(&self) -> crate::Result<EpsilonGreedy<decay::Multiplicative>> {
        decay::Multiplicative::new(self.epsilon_decay, self.epsilon, self.epsilon_min)
            .map(EpsilonGreedy::new)
    }
}

/// Regression targets for a replayed batch
///
/// Row `i` is the policy's Q values for sample `i` with the taken action's entry
/// blended towards its TD target: `(1 - alpha) * q + alpha * target`, where
/// `target = r` for a terminal transition (`max_next_q[i] == None`) and
/// `r + gamma * max_next_q[i]` otherwise. The other entries are unchanged so
/// they add no loss.
pub fn replay_targets(
    mut q_rows: Vec<Vec<f32>>,
    actions: &[usize],
    rewards: &[f32],
    max_next_q: &[Option<f32>],
    alpha: f32,
    gamma: f32,
) -> Vec<Vec<f32>> {
    let samples = actions.iter().zip(rewards).zip(max_next_q);
    for (row, ((&action, &reward), &next)) in q_rows.iter_mut().zip(samples) {
        let target = match next {
            Some(max_q) => reward + gamma * max_q,
            None => reward,
        };
        row[action] = (1.0 - alpha) * row[action] + alpha * target;
    }
    q_rows
}

/// A Deep Q Network agent
///
/// ### Generics
/// - `B`: A burn backend
/// - `M`: The [`DQNModel`] used for the policy and target networks
/// - `E`: The [`Environment`] in which the agent will learn
///     - The environment's action space must be discrete, since the policy network produces a Q value for each action.
///     - The state and action types' implementations of [`Clone`] should be very lightweight, as they are cloned often.
/// - `O`: An [`Optimizer`] for the policy network, e.g. `AdamConfig::new().init()`
pub struct DQNAgent<B, M, E, O>
where
    B: AutodiffBackend,
    M: DQNModel<B>,
    E: Environment,
{
    policy_net: M,
    target_net: M,
    device: B::Device,
    memory: ReplayMemory<E>,
    optimizer: O,
    loss: MseLoss<B>,
    exploration: EpsilonGreedy<decay::Multiplicative>,
    shaping: RewardShaping,
    config: DQNAgentConfig,
    rng: StdRng,
    total_steps: u32,
}

impl<B, M, E, O> DQNAgent<B, M, E, O>
where
    B: AutodiffBackend,
    M: DQNModel<B>,
    O: Optimizer<M, B>,
    E: Environment + DiscreteActionSpace,
    E::State: AsRef<[f32]>,
    E::Action: From<usize> + Into<usize>,
{
    /// Initialize a new `DQNAgent`
    ///
    /// ### Arguments
    /// - `model` A [`DQNModel`] to be used as the policy and target networks
    /// - `optimizer` The [`Optimizer`] to train the policy network with
    /// - `config` A [`DQNAgentConfig`] containing hyperparameters for the agent
    /// - `device` The device used for the `model`
    ///
    /// **Errors** if the configuration is invalid
    pub fn new(
        model: M,
        optimizer: O,
        config: DQNAgentConfig,
        device: &B::Device,
    ) -> crate::Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            target_net: model.clone(),
            policy_net: model,
            device: device.clone(),
            memory: ReplayMemory::new(config.memory_capacity),
            optimizer,
            loss: MseLoss::new(),
            exploration: config.exploration()?,
            shaping: RewardShaping {
                failure_penalty: config.failure_penalty,
                completion_bonus: config.completion_bonus,
            },
            config,
            rng,
            total_steps: 0,
        })
    }

    pub fn policy_net(&self) -> &M {
        &self.policy_net
    }

    pub fn target_net(&self) -> &M {
        &self.target_net
    }

    pub fn epsilon(&self) -> f32 {
        self.exploration.epsilon()
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    /// Q values of the policy network in `state`
    pub fn q_values(&self, state: &E::State) -> Vec<f32> {
        let input = std::slice::from_ref(state).to_tensor(&self.device);
        to_rows(self.policy_net.forward(input)).swap_remove(0)
    }

    /// Invoke the agent's policy along with the exploration strategy to choose an action from the given state
    fn act(&mut self, env: &E, state: &E::State) -> E::Action {
        match self.exploration.choose(&mut self.rng) {
            Choice::Explore => E::Action::from(self.rng.gen_range(0..env.num_actions())),
            Choice::Exploit => E::Action::from(argmax(&self.q_values(state))),
        }
    }

    /// Perform one DQN learning step on a replayed batch
    ///
    /// **Returns** the loss, or `None` while the memory is empty
    fn learn(&mut self) -> Option<f32> {
        let batch = self
            .memory
            .sample_zipped(self.config.batch_size, &mut self.rng)?;
        let &DQNAgentConfig { alpha, gamma, .. } = &self.config;

        let states = batch.states.as_slice().to_tensor(&self.device);
        let q_values = self.policy_net.forward(states);

        // Only non-terminal next states are evaluated, in batch order
        let next_states = batch
            .next_states
            .iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>();
        let non_terminal_max: Vec<f32> = if next_states.is_empty() {
            Vec::new()
        } else {
            let input = next_states.as_slice().to_tensor(&self.device);
            to_rows(self.target_net.forward(input))
                .iter()
                .map(|row| row.iter().copied().fold(f32::NEG_INFINITY, f32::max))
                .collect()
        };
        let mut non_terminal_max = non_terminal_max.into_iter();
        let max_next_q = batch
            .next_states
            .iter()
            .map(|s| s.as_ref().and_then(|_| non_terminal_max.next()))
            .collect::<Vec<_>>();
        let actions = batch
            .actions
            .iter()
            .map(|a| a.clone().into())
            .collect::<Vec<usize>>();

        let targets = replay_targets(
            to_rows(q_values.clone().detach()),
            &actions,
            &batch.rewards,
            &max_next_q,
            alpha,
            gamma,
        );
        let targets = targets.as_slice().to_tensor(&self.device);

        let loss = self.loss.forward(q_values, targets, Reduction::Mean);
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.policy_net);
        self.policy_net = self
            .optimizer
            .step(self.config.lr, self.policy_net.clone(), grads);

        Some(loss_value)
    }

    fn update_target(&mut self) {
        match self.config.target_update {
            TargetUpdate::Hard { interval } => {
                if self.total_steps % interval == 0 {
                    self.target_net = self.policy_net.clone();
                    debug!("Synced target network at step {}", self.total_steps);
                }
            }
            TargetUpdate::Soft { tau } => {
                self.target_net = self.target_net.clone().soft_update(&self.policy_net, tau);
            }
        }
    }

    /// Deploy the `DQNAgent` into the environment for one training episode
    ///
    /// **Returns** the shaped total reward
    pub fn go(&mut self, env: &mut E) -> f32 {
        let mut total = 0.0;
        let mut next_state = Some(env.reset());

        while let Some(state) = next_state {
            self.total_steps += 1;

            let action = self.act(env, &state);
            let (next, raw_reward) = env.step(action.clone());
            let reward = self.shaping.step(next.is_none(), raw_reward);
            next_state = next;

            self.memory.push(Exp {
                state,
                action,
                next_state: next_state.clone(),
                reward,
            });

            if let Some(loss) = self.learn() {
                debug!("Step {}: loss {loss:.5}", self.total_steps);
            }
            self.exploration.decay();
            self.update_target();

            total += reward;
        }

        self.shaping.finish(total)
    }

    /// Train for up to `num_episodes` episodes
    ///
    /// The policy network is checkpointed every `save_interval` episodes, when
    /// the windowed mean reward exceeds the bound, and at the end. The reward
    /// plot is refreshed at every report.
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
            if episode % self.config.save_interval == 0 {
                self.save(&artifacts.checkpoint)?;
            }

            let reward = self.go(env);
            total_rewards.push(reward);
            let mean_reward = tail_mean(&total_rewards, self.config.mean_window);

            if episode % self.config.report_interval == 0 {
                info!(
                    "Episode: {episode}/{num_episodes} \tStep: {} \tMemory Size: {} \tEpsilon: {:.3} \tReward: {reward} \tLast {} Mean: {mean_reward:.2}",
                    self.total_steps,
                    self.memory.len(),
                    self.epsilon(),
                    self.config.mean_window,
                );
                plot::plot_rewards(&artifacts.plot, "DQN-Learning", &total_rewards, true)?;
            }

            if mean_reward > self.config.reward_bound {
                info!("Episode {episode}: mean reward {mean_reward:.2} exceeded the bound, stopping");
                break;
            }
        }

        self.save(&artifacts.checkpoint)?;
        Ok(total_rewards)
    }

    /// Run the agent for `num_episodes` episodes with exploration at its floor and without learning
    ///
    /// **Returns** the raw total reward of each episode
    pub fn play(&mut self, env: &mut E, num_episodes: usize) -> crate::Result<Vec<f32>> {
        let floor = self.config.epsilon_min;
        self.exploration = EpsilonGreedy::new(decay::Multiplicative::new(1.0, floor, floor)?);

        let rewards = (1..=num_episodes)
            .map(|episode| {
                let mut total = 0.0;
                let mut next_state = Some(env.reset());
                while let Some(state) = next_state {
                    let action = self.act(env, &state);
                    let (next, reward) = env.step(action);
                    total += reward;
                    next_state = next;
                }
                info!("Episode: {episode}/{num_episodes} \tTotal Reward: {total:.2}");
                total
            })
            .collect();
        Ok(rewards)
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        checkpoint::save_module(&self.policy_net, path)
    }

    /// Load the policy network from `path` and sync the target network to it
    pub fn load(&mut self, path: &Path) -> crate::Result<()> {
        self.policy_net = checkpoint::load_module(self.policy_net.clone(), path, &self.device)?;
        self.target_net = self.policy_net.clone();
        Ok(())
    }

    /// Like [`load`](Self::load), but keeps the fresh networks if there is no usable checkpoint
    pub fn restore(&mut self, path: &Path) {
        if let Err(err) = self.load(path) {
            log::warn!("Model does not exist ({err}), creating a new one");
        }
    }
}
