use burn::{
    module::Param,
    prelude::*,
    tensor::{activation::relu, backend::AutodiffBackend},
};
use nn::{Linear, LinearConfig};

use crate::algo::{cross_entropy::PolicyModel, dqn::DQNModel};

/// A two hidden layer perceptron mapping a state to one output per action
///
/// Serves as the policy network of the cross-entropy agent (outputs are
/// logits) and as the Q network of the DQN agent (outputs are Q values)
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
}

#[derive(Config, Debug)]
pub struct MlpConfig {
    /// Dimension of the state
    input: usize,
    /// Number of actions
    output: usize,
    #[config(default = 24)]
    hidden1: usize,
    #[config(default = 24)]
    hidden2: usize,
}

impl MlpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        Mlp {
            fc1: LinearConfig::new(self.input, self.hidden1).init(device),
            fc2: LinearConfig::new(self.hidden1, self.hidden2).init(device),
            out: LinearConfig::new(self.hidden2, self.output).init(device),
        }
    }
}

impl<B: Backend> Mlp<B> {
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.fc1.forward(input));
        let x = relu(self.fc2.forward(x));
        self.out.forward(x)
    }
}

impl<B: AutodiffBackend> PolicyModel<B> for Mlp<B> {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        Mlp::forward(self, input)
    }
}

impl<B: AutodiffBackend> DQNModel<B> for Mlp<B> {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        Mlp::forward(self, input)
    }

    fn soft_update(self, other: &Self, tau: f32) -> Self {
        Self {
            fc1: soft_update_linear(self.fc1, &other.fc1, tau),
            fc2: soft_update_linear(self.fc2, &other.fc2, tau),
            out: soft_update_linear(self.out, &other.out, tau),
        }
    }
}

fn soft_update_tensor<B: Backend, const D: usize>(
    this: Param<Tensor<B, D>>,
    that: &Param<Tensor<B, D>>,
    tau: f32,
) -> Param<Tensor<B, D>> {
    this.map(|tensor| tensor * (1.0 - tau) + that.val().detach() * tau)
}

fn soft_update_linear<B: Backend>(mut this: Linear<B>, that: &Linear<B>, tau: f32) -> Linear<B> {
    this.weight = soft_update_tensor(this.weight, &that.weight, tau);
    this.bias = match (this.bias, &that.bias) {
        (Some(b1), Some(b2)) => Some(soft_update_tensor(b1, b2, tau)),
        (b1, _) => b1,
    };

    this
}
