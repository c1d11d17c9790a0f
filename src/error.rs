use std::{io, path::PathBuf};

/// Errors produced while configuring, training or persisting an agent
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A hyperparameter is outside of its valid range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An action index outside of the action space
    #[error("action {action} out of range for {num_actions} actions")]
    InvalidAction { action: usize, num_actions: usize },

    /// A model checkpoint could not be written or read
    #[error("checkpoint `{}`: {reason}", path.display())]
    Checkpoint { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The reward plot could not be rendered
    #[error("plot: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, Error>;
