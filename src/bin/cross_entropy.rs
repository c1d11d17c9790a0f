use burn::{
    backend::{ndarray::NdArrayDevice, Autodiff, NdArray},
    optim::AdamConfig,
};
use clap::Parser;
use classic_rl::{
    algo::cross_entropy::{CrossEntropyAgent, CrossEntropyAgentConfig},
    checkpoint::Artifacts,
    cli::{load_config, Args, Command},
    env::DiscreteActionSpace,
    gym::CartPole,
    logging,
    model::MlpConfig,
    plot,
};
use gym_rs::utils::renderer::RenderMode;
use log::info;

type B = Autodiff<NdArray>;

const NUM_EPOCHS: usize = 100;
const NUM_EPISODES: usize = 100;

fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref(), CrossEntropyAgentConfig::new())?;
    let artifacts = Artifacts::in_dir(&args.dir, "cross_entropy");
    let device = NdArrayDevice::default();

    let render_mode = match args.command {
        Command::Train { .. } => RenderMode::None,
        Command::Play { .. } => RenderMode::Human,
    };
    let mut env = CartPole::new(render_mode);
    let model = MlpConfig::new(4, env.num_actions()).init::<B>(&device);
    let mut agent = CrossEntropyAgent::new(model, AdamConfig::new().init(), config, &device)?;

    match args.command {
        Command::Train { episodes, epochs } => {
            agent.restore(&artifacts.checkpoint);
            let rewards = agent.train(
                &mut env,
                epochs.unwrap_or(NUM_EPOCHS),
                episodes.unwrap_or(NUM_EPISODES),
                &artifacts,
            )?;
            plot::plot_rewards(&artifacts.plot, "Cross-Entropy", &rewards, false)?;
            info!("Saved reward plot to {}", artifacts.plot.display());
        }
        Command::Play { episodes } => {
            agent.load(&artifacts.checkpoint)?;
            agent.play(&mut env, episodes);
            let totals = env.report.take();
            info!(
                "Played {episodes} episodes: {} steps, {} reward",
                totals["steps"], totals["reward"]
            );
        }
    }

    Ok(())
}
