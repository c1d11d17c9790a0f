use std::{marker::PhantomData, path::Path};

use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::{activation::softmax, backend::AutodiffBackend, ElementConversion},
};
use log::{debug, info};
use nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
    seq::SliceRandom,
    SeedableRng,
};

use crate::{
    checkpoint::{self, Artifacts},
    env::{DiscreteActionSpace, Environment, RewardShaping},
    tensor::{to_rows, ToTensor},
    util::{argmax, check_interval, check_positive, mean, percentile},
};

/// A burn module used as the policy of a [`CrossEntropyAgent`]
pub trait PolicyModel<B: AutodiffBackend>: AutodiffModule<B> {
    /// Action logits for a batch of states
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2>;
}

/// Configuration for the [`CrossEntropyAgent`]
#[derive(Config, Debug)]
pub struct CrossEntropyAgentConfig {
    /// Fraction of episodes ranked below the reward bound each epoch; the rest are imitated
    #[config(default = 0.75)]
    pub percentile: f32,
    /// The learning rate for the optimizer
    #[config(default = 1e-3)]
    pub lr: f64,
    /// Minibatch size used when fitting the policy to the elite steps
    #[config(default = 32)]
    pub batch_size: usize,
    /// Training stops once an epoch's mean episode reward reaches this
    #[config(default = 495.0)]
    pub reward_bound: f32,
    #[config(default = "-100.0")]
    pub failure_penalty: f32,
    #[config(default = 100.0)]
    pub completion_bonus: f32,
    /// Seed for action sampling and minibatch shuffling
    pub seed: Option<u64>,
}

impl CrossEntropyAgentConfig {
    pub fn validate(&self) -> crate::Result<()> {
        check_interval("percentile", self.percentile.into(), 0.0, 1.0)?;
        check_interval("lr", self.lr, 0.0, 1.0)?;
        check_positive("batch_size", self.batch_size)
    }

    fn shaping(&self) -> RewardShaping {
        RewardShaping {
            failure_penalty: self.failure_penalty,
            completion_bonus: self.completion_bonus,
        }
    }
}

/// One sampled trajectory
#[derive(Debug, Clone)]
pub struct Episode<S> {
    /// `(state, action index)` for every step taken
    pub steps: Vec<(S, usize)>,
    /// Shaped total reward
    pub reward: f32,
}

/// Steps of the elite episodes, ready to fit on
#[derive(Debug, Clone)]
pub struct TrainingData<S> {
    pub states: Vec<S>,
    pub actions: Vec<usize>,
    /// Episodes with a total reward below this were dropped
    pub reward_bound: f32,
}

impl<S> TrainingData<S> {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Select every step of the episodes whose reward reaches the `p`-th percentile
pub fn training_data<S: Clone>(episodes: &[Episode<S>], p: f32) -> TrainingData<S> {
    let rewards = episodes.iter().map(|e| e.reward).collect::<Vec<_>>();
    let reward_bound = percentile(&rewards, p);

    let (states, actions) = episodes
        .iter()
        .filter(|e| e.reward >= reward_bound)
        .flat_map(|e| e.steps.iter().cloned())
        .unzip();

    TrainingData {
        states,
        actions,
        reward_bound,
    }
}

/// A cross-entropy method agent
///
/// Each epoch samples a batch of episodes from the current stochastic policy,
/// keeps the top-percentile episodes by reward and refits the policy towards
/// the actions taken in them.
///
/// ### Generics
/// - `B`: A burn backend
/// - `M`: The [`PolicyModel`]
/// - `E`: The [`Environment`] in which the agent will learn
///     - The action space must be discrete since the policy produces one probability per action
/// - `O`: An [`Optimizer`] for the policy, e.g. `AdamConfig::new().init()`
pub struct CrossEntropyAgent<B, M, E, O>
where
    B: AutodiffBackend,
    M: PolicyModel<B>,
{
    model: M,
    device: B::Device,
    optimizer: O,
    loss: CrossEntropyLoss<B>,
    config: CrossEntropyAgentConfig,
    shaping: RewardShaping,
    rng: StdRng,
    environment: PhantomData<E>,
}

impl<B, M, E, O> CrossEntropyAgent<B, M, E, O>
where
    B: AutodiffBackend,
    M: PolicyModel<B>,
    O: Optimizer<M, B>,
    E: Environment + DiscreteActionSpace,
    E::State: AsRef<[f32]>,
    E::Action: From<usize> + Into<usize>,
{
    /// Initialize a new `CrossEntropyAgent`
    ///
    /// **Errors** if the configuration is invalid
    pub fn new(
        model: M,
        optimizer: O,
        config: CrossEntropyAgentConfig,
        device: &B::Device,
    ) -> crate::Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            model,
            device: device.clone(),
            optimizer,
            loss: CrossEntropyLossConfig::new().init(device),
            shaping: config.shaping(),
            config,
            rng,
            environment: PhantomData,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Action probabilities of the current policy in `state`
    pub fn policy(&self, state: &E::State) -> Vec<f32> {
        let input = std::slice::from_ref(state).to_tensor(&self.device);
        let probs = softmax(self.model.forward(input), 1);
        to_rows(probs).swap_remove(0)
    }

    /// Sample an action from the current policy
    fn act(&mut self, state: &E::State) -> E::Action {
        let probs = self.policy(state);
        let ix = match WeightedIndex::new(&probs) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => argmax(&probs),
        };
        E::Action::from(ix)
    }

    /// Run the policy for `num_episodes` episodes, recording every step
    pub fn sample(&mut self, env: &mut E, num_episodes: usize) -> Vec<Episode<E::State>> {
        (0..num_episodes)
            .map(|_| {
                let mut steps = Vec::new();
                let mut total = 0.0;
                let mut next_state = Some(env.reset());

                while let Some(state) = next_state {
                    let action = self.act(&state);
                    let ix: usize = action.clone().into();
                    let (next, reward) = env.step(action);
                    total += self.shaping.step(next.is_none(), reward);
                    steps.push((state, ix));
                    next_state = next;
                }

                Episode {
                    steps,
                    reward: self.shaping.finish(total),
                }
            })
            .collect()
    }

    /// Fit the policy to `data` for one pass over shuffled minibatches
    ///
    /// **Returns** the mean loss, or `None` if there was nothing to fit
    pub fn fit(&mut self, data: &TrainingData<E::State>) -> Option<f32> {
        if data.is_empty() {
            return None;
        }

        let mut order = (0..data.len()).collect::<Vec<_>>();
        order.shuffle(&mut self.rng);

        let mut losses = Vec::new();
        for chunk in order.chunks(self.config.batch_size) {
            let states = chunk
                .iter()
                .map(|&i| data.states[i].clone())
                .collect::<Vec<_>>();
            let actions = chunk.iter().map(|&i| data.actions[i]).collect::<Vec<_>>();

            let logits = self.model.forward(states.as_slice().to_tensor(&self.device));
            let targets = actions.as_slice().to_tensor(&self.device);
            let loss = self.loss.forward(logits, targets);
            losses.push(loss.clone().into_scalar().elem::<f32>());

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self
                .optimizer
                .step(self.config.lr, self.model.clone(), grads);
        }

        Some(mean(&losses))
    }

    /// Train for up to `num_epochs` epochs of `num_episodes` sampled episodes each
    ///
    /// Stops early, before fitting, once an epoch's mean reward reaches the
    /// configured bound. The model is saved to `artifacts.checkpoint` on return.
    ///
    /// **Returns** the shaped reward of every sampled episode
    pub fn train(
        &mut self,
        env: &mut E,
        num_epochs: usize,
        num_episodes: usize,
        artifacts: &Artifacts,
    ) -> crate::Result<Vec<f32>> {
        check_positive("num_episodes", num_episodes)?;
        let mut total_rewards = Vec::with_capacity(num_epochs * num_episodes);

        for epoch in 1..=num_epochs {
            let episodes = self.sample(env, num_episodes);
            let data = training_data(&episodes, self.config.percentile);
            let rewards = episodes.iter().map(|e| e.reward).collect::<Vec<_>>();
            let mean_reward = mean(&rewards);
            total_rewards.extend(rewards);

            if mean_reward >= self.config.reward_bound {
                info!("Epoch {epoch}/{num_epochs}: mean reward {mean_reward:.2} reached the bound, stopping");
                break;
            }

            if let Some(loss) = self.fit(&data) {
                debug!("Epoch {epoch}: {} elite steps, loss {loss:.4}", data.len());
            }
            info!(
                "Epoch: {epoch}/{num_epochs} \tMean Reward: {mean_reward:.2} \tReward Bound: {:.2}",
                data.reward_bound
            );
        }

        self.save(&artifacts.checkpoint)?;
        Ok(total_rewards)
    }

    /// Run the trained policy for `num_episodes` episodes without shaping
    ///
    /// **Returns** the raw total reward of each episode
    pub fn play(&mut self, env: &mut E, num_episodes: usize) -> Vec<f32> {
        (1..=num_episodes)
            .map(|episode| {
                let mut total = 0.0;
                let mut next_state = Some(env.reset());
                while let Some(state) = next_state {
                    let action = self.act(&state);
                    let (next, reward) = env.step(action);
                    total += reward;
                    next_state = next;
                }
                info!("Episode: {episode}/{num_episodes} \tReward: {total}");
                total
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        checkpoint::save_module(&self.model, path)
    }

    /// Replace the policy with the checkpoint at `path`
    pub fn load(&mut self, path: &Path) -> crate::Result<()> {
        self.model = checkpoint::load_module(self.model.clone(), path, &self.device)?;
        Ok(())
    }

    /// Like [`load`](Self::load), but keeps the current policy if there is no usable checkpoint
    pub fn restore(&mut self, path: &Path) {
        self.model = checkpoint::load_or_keep(self.model.clone(), path, &self.device);
    }
}

#[cfg(test)]
mod tests {
    use burn::{
        backend::{Autodiff, NdArray},
        optim::AdamConfig,
    };

    use super::*;
    use crate::{
        env::tests::{shaped_total, MockEnv},
        model::{Mlp, MlpConfig},
    };

    type B = Autodiff<NdArray>;

    fn new_agent(
        model: Mlp<B>,
        config: CrossEntropyAgentConfig,
    ) -> crate::Result<CrossEntropyAgent<B, Mlp<B>, MockEnv, impl Optimizer<Mlp<B>, B>>> {
        CrossEntropyAgent::new(model, AdamConfig::new().init(), config, &Default::default())
    }

    fn agent() -> CrossEntropyAgent<B, Mlp<B>, MockEnv, impl Optimizer<Mlp<B>, B>> {
        let model = MlpConfig::new(2, 2)
            .with_hidden1(8)
            .with_hidden2(8)
            .init(&Default::default());
        new_agent(model, CrossEntropyAgentConfig::new().with_seed(Some(3))).unwrap()
    }

    fn episode(reward: f32, actions: &[usize]) -> Episode<[f32; 2]> {
        Episode {
            steps: actions.iter().map(|&a| ([reward, a as f32], a)).collect(),
            reward,
        }
    }

    #[test]
    fn training_data_keeps_elite_episodes() {
        let episodes = [
            episode(10.0, &[0]),
            episode(40.0, &[1, 1]),
            episode(20.0, &[0, 1]),
            episode(30.0, &[1, 0, 1]),
        ];
        let data = training_data(&episodes, 0.75);

        assert_eq!(data.reward_bound, 32.5);
        assert_eq!(data.actions, [1, 1]);
        assert_eq!(data.states, [[40.0, 1.0], [40.0, 1.0]]);

        let data = training_data(&episodes, 0.5);
        assert_eq!(data.reward_bound, 25.0);
        assert_eq!(data.actions, [1, 1, 1, 0, 1], "episode order preserved");

        let data = training_data(&episodes, 0.0);
        assert_eq!(data.len(), 8, "everything at the 0th percentile");
    }

    #[test]
    fn ties_at_the_bound_are_kept() {
        let episodes = [episode(5.0, &[0]), episode(5.0, &[1])];
        let data = training_data(&episodes, 0.75);
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn invalid_config_rejected() {
        let device = Default::default();
        let model = MlpConfig::new(2, 2).init::<B>(&device);
        let config = CrossEntropyAgentConfig::new().with_percentile(1.5);
        assert!(new_agent(model, config).is_err());
    }

    #[test]
    fn policy_is_a_distribution() {
        let agent = agent();
        let probs = agent.policy(&[0.5, 0.0]);
        assert_eq!(probs.len(), 2);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn sample_records_shaped_episodes() {
        let mut agent = agent();
        let mut env = MockEnv::new(4, 6);
        let episodes = agent.sample(&mut env, 5);

        assert_eq!(episodes.len(), 5);
        for e in &episodes {
            assert!(!e.steps.is_empty() && e.steps.len() <= 6);
            assert_eq!(e.reward, shaped_total(e.steps.len() as u32), "last step penalized");
        }
    }

    #[test]
    fn train_fits_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::in_dir(dir.path(), "dnn");
        let mut agent = agent();
        let mut env = MockEnv::new(4, 6);

        let rewards = agent.train(&mut env, 2, 4, &artifacts).unwrap();
        assert_eq!(rewards.len(), 8);
        assert!(artifacts.checkpoint.with_extension("mpk").exists());

        let device = Default::default();
        let model = MlpConfig::new(2, 2).with_hidden1(8).with_hidden2(8).init(&device);
        let mut restored = new_agent(model, CrossEntropyAgentConfig::new()).unwrap();
        restored.load(&artifacts.checkpoint).unwrap();
        assert_eq!(restored.play(&mut env, 2).len(), 2);
    }

    #[test]
    fn train_stops_at_reward_bound() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::in_dir(dir.path(), "dnn");
        let device = Default::default();
        let model = MlpConfig::new(2, 2).init(&device);
        let config = CrossEntropyAgentConfig::new()
            .with_reward_bound(0.0)
            .with_seed(Some(1));
        let mut agent = new_agent(model, config).unwrap();
        let mut env = MockEnv::new(4, 6);

        let rewards = agent.train(&mut env, 10, 3, &artifacts).unwrap();
        assert_eq!(rewards.len(), 3, "first epoch already reaches the bound");
    }
}
