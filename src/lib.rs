/// Implemented RL algorithms
pub mod algo;

/// Saving and loading agents
pub mod checkpoint;

/// Implementations of strategies for time-decaying hyperparameters
pub mod decay;

/// Command line of the binaries
pub mod cli;

/// Environment
pub mod env;

mod error;

/// Exploration policies
pub mod exploration;

pub mod logging;

/// Experience replay
pub mod memory;

/// Neural network models
pub mod model;

/// Reward curves
pub mod plot;

/// Conversions between batches and tensors
pub mod tensor;

/// Testing environments
#[cfg(feature = "gym")]
pub mod gym;

pub mod util;

pub use error::{Error, Result};
