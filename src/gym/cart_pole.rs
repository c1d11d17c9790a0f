use gym_rs::core::{ActionReward, Env};
use gym_rs::envs::classical_control::cartpole::{CartPoleEnv, CartPoleObservation};
use gym_rs::utils::renderer::RenderMode;
use strum::{FromRepr, VariantArray};

use crate::env::{DiscreteActionSpace, Environment, Report};

/// Episode length at which CartPole counts as solved
pub const MAX_STEPS: u32 = 500;

fn obs2arr(observation: CartPoleObservation) -> [f32; 4] {
    let mut arr = [0.0; 4];
    for (a, x) in arr.iter_mut().zip(Vec::from(observation)) {
        *a = x as f32;
    }
    arr
}

/// Actions for the [`CartPole`] environment, representing applying a left or right force to the cart
#[derive(FromRepr, VariantArray, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CPAction {
    Left = 0,
    Right = 1,
}

impl From<usize> for CPAction {
    fn from(value: usize) -> Self {
        Self::from_repr(value).expect("CPAction::from is only called with valid values [0, 1]")
    }
}

impl From<CPAction> for usize {
    fn from(value: CPAction) -> Self {
        value as usize
    }
}

/// The classic CartPole reinforcement learning environment
///
/// This implementation is a thin wrapper around [gym_rs](https://github.com/MathisWellmann/gym-rs).
/// Episodes end after `max_steps` steps, which default to [`MAX_STEPS`], if the pole has not fallen by then.
#[derive(Debug, Clone)]
pub struct CartPole {
    gym_env: CartPoleEnv,
    max_steps: u32,
    steps: u32,
    pub report: Report,
}

impl CartPole {
    pub fn new(render_mode: RenderMode) -> Self {
        Self {
            gym_env: CartPoleEnv::new(render_mode),
            max_steps: MAX_STEPS,
            steps: 0,
            report: Report::new(vec!["reward", "steps"]),
        }
    }

    #[cfg(test)]
    fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }
}

impl Environment for CartPole {
    type State = [f32; 4];
    type Action = CPAction;

    fn step(&mut self, action: Self::Action) -> (Option<Self::State>, f32) {
        let ActionReward {
            observation,
            reward,
            done,
            ..
        } = self.gym_env.step(action as usize);

        self.steps += 1;

        let next_state = if done || self.steps >= self.max_steps {
            None
        } else {
            Some(obs2arr(observation))
        };

        let reward = *reward as f32;
        self.report.add("reward", reward.into());
        self.report.add("steps", 1.0);

        (next_state, reward)
    }

    fn reset(&mut self) -> Self::State {
        self.steps = 0;
        obs2arr(self.gym_env.reset(None, false, None).0)
    }
}

impl DiscreteActionSpace for CartPole {
    fn actions(&self) -> Vec<Self::Action> {
        CPAction::VARIANTS.to_vec()
    }

    fn num_actions(&self) -> usize {
        CPAction::VARIANTS.len()
    }
}
