use clap::Parser;
use classic_rl::{
    algo::q_table::{QTableAgent, QTableAgentConfig},
    checkpoint::Artifacts,
    cli::{load_config, Args, Command},
    env::DiscreteActionSpace,
    gym::CartPole,
    logging, plot,
};
use gym_rs::utils::renderer::RenderMode;
use log::info;

const NUM_EPISODES: usize = 100_000;

fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref(), QTableAgentConfig::new())?;
    let mut artifacts = Artifacts::in_dir(&args.dir, "q_table");
    artifacts.checkpoint.set_extension("json");

    let render_mode = match args.command {
        Command::Train { .. } => RenderMode::None,
        Command::Play { .. } => RenderMode::Human,
    };
    let mut env = CartPole::new(render_mode);
    let mut agent = QTableAgent::<CartPole>::new(config, env.num_actions())?;

    match args.command {
        Command::Train { episodes, .. } => {
            agent.restore(&artifacts.checkpoint);
            let rewards = agent.train(&mut env, episodes.unwrap_or(NUM_EPISODES), &artifacts)?;
            plot::plot_rewards(&artifacts.plot, "Q-Learning", &rewards, false)?;
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
