/// Cross-entropy method over a softmax policy network
pub mod cross_entropy;

/// Deep Q-learning with experience replay and a target network
pub mod dqn;

/// Tabular Q-learning over discretized states
pub mod q_table;

pub use cross_entropy::{CrossEntropyAgent, CrossEntropyAgentConfig};
pub use dqn::{DQNAgent, DQNAgentConfig};
pub use q_table::{QTableAgent, QTableAgentConfig};
