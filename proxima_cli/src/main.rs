mod campaign;

use campaign::Campaign;
use clap::Parser;
use proxima_core::config::ProximaConfig;
use proxima_core::Corpus;
use proxima_core::rng;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Number of scheduling cycles to simulate.
    #[clap(long)]
    cycles: Option<u64>,
    /// Seed for the scheduler and the simulated target.
    #[clap(short, long)]
    seed: Option<u64>,
    /// Print the final summary as JSON instead of progress lines.
    #[clap(long)]
    json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = match cli.config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            ProximaConfig::load_from_file(&config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("proxima.toml");
            if default_config_path.exists() {
                info!("No config file specified via CLI, loading default: {default_config_path:?}");
                ProximaConfig::load_from_file(&default_config_path)?
            } else {
                info!("No config file specified and 'proxima.toml' not found, using built-in defaults.");
                ProximaConfig::default()
            }
        }
    };

    if let Some(cycles) = cli.cycles {
        config
            .campaign
            .get_or_insert_with(Default::default)
            .max_cycles = cycles;
    }
    if let Some(seed) = cli.seed {
        config.scheduler.seed = Some(seed);
    }
    info!("Effective configuration: {config:?}");

    let settings = config.campaign.clone().unwrap_or_default();
    let max_cycles = settings.max_cycles;
    let (rng, seed) = rng::from_settings(config.scheduler.seed);
    let scheduler = config.scheduler.build_scheduler();
    let mut campaign = Campaign::new(
        settings,
        config.scheduler.ring_capacity,
        scheduler,
        rng,
        seed,
    )?;
    info!(
        seed,
        policy = campaign.scheduler().policy_name(),
        sampler = campaign.scheduler().sampler_name(),
        entries = campaign.corpus().len(),
        "Campaign ready"
    );

    let start_time = Instant::now();
    for cycle in 1..=max_cycles {
        let report = campaign.run_cycle()?;
        if !cli.json {
            println!(
                "Cycle {}/{}: fuzzed {}, execs {}, interesting {}, new entries {}, corpus {}, clusters {}",
                cycle,
                max_cycles,
                report.entries_fuzzed,
                report.executions,
                report.interesting,
                report.discoveries,
                campaign.corpus().len(),
                campaign.scheduler().manager().len()
            );
        }
    }
    let elapsed_total = start_time.elapsed();

    let summary = campaign.summary();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("\nCampaign finished in {elapsed_total:.2?} (seed {}).", summary.seed);
    println!(
        "Total Executions: {}, Interesting: {}, Corpus Size: {}, Covered Nodes: {}",
        summary.executions, summary.interesting, summary.corpus_size, summary.covered_nodes
    );
    println!(
        "Most selected operator: {} ({} selections), most productive operator: {}",
        summary.favourite_operator,
        summary.operator_selections[summary.favourite_operator],
        summary.best_operator
    );
    println!(
        "Reranks: {}, Stale resets: {}, Mean entry posterior: {:.4}",
        summary.reranks, summary.stale_resets, summary.mean_entry_posterior
    );

    Ok(())
}
