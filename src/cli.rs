use std::path::{Path, PathBuf};

use burn::config::Config;
use clap::{Parser, Subcommand};

/// Command line shared by the CartPole binaries
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// JSON file holding the agent configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory receiving the `models/` and `plots/` artifacts
    #[arg(long, default_value = "artifacts")]
    pub dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Train an agent, resuming from its checkpoint if there is one
    Train {
        #[arg(long)]
        episodes: Option<usize>,
        /// Only used by the cross-entropy agent
        #[arg(long)]
        epochs: Option<usize>,
    },
    /// Watch a trained agent play
    Play {
        #[arg(long, default_value = "5")]
        episodes: usize,
    },
}

/// Read a burn config from `path`, or use `default` when no path is given
pub fn load_config<C: Config>(path: Option<&Path>, default: C) -> anyhow::Result<C> {
    match path {
        Some(path) => C::load(path)
            .map_err(|err| anyhow::anyhow!("config `{}`: {err:?}", path.display())),
        None => Ok(default),
    }
}
