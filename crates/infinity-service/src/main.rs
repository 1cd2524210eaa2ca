//! Infinity daemon - iterated learning experiment administrator
//!
//! `infinityd` serves the experiment pages over HTTP and offers operator
//! subcommands to check, provision and analyze chains offline.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use infinity_core::{Analyzer, Condition, ExperimentFlow, StimulusLoader};
use infinity_service::{Server, ServiceConfig};
use serde::Serialize;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Infinity daemon CLI
#[derive(Parser)]
#[command(name = "infinityd")]
#[command(about = "Infinity - iterated learning experiment administrator", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "INFINITY_CONFIG")]
    config: Option<String>,

    /// Log level (overrides the configuration file)
    #[arg(long, global = true, env = "INFINITY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, global = true, env = "INFINITY_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve {
        /// Listen address
        #[arg(short, long, env = "INFINITY_LISTEN_ADDR")]
        listen: Option<String>,
    },

    /// Print the validation report for a run
    Validate {
        #[arg(long)]
        chain: String,
        #[arg(long)]
        generation: String,
        #[arg(long)]
        condition: String,
    },

    /// Create the empty output files of a chain
    Provision {
        #[arg(long)]
        condition: Condition,
        #[arg(long)]
        chain: String,
        /// Last generation to provision (defaults to the maximum generation)
        #[arg(long)]
        generations: Option<u32>,
    },

    /// Print transmission measures for a finished generation
    Analyze {
        #[arg(long)]
        condition: Condition,
        #[arg(long)]
        chain: String,
        #[arg(long)]
        generation: u32,
        /// Shuffled baselines for the learnability score (0 skips it)
        #[arg(long, default_value_t = 0)]
        simulations: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref())
        .with_context(|| format!("loading configuration {:?}", cli.config))?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }

    init_tracing(&config);

    match cli.command.unwrap_or(Command::Serve { listen: None }) {
        Command::Serve { listen } => serve(config, listen).await,
        Command::Validate {
            chain,
            generation,
            condition,
        } => validate(config, &chain, &generation, &condition),
        Command::Provision {
            condition,
            chain,
            generations,
        } => provision(config, condition, &chain, generations),
        Command::Analyze {
            condition,
            chain,
            generation,
            simulations,
        } => analyze(config, condition, &chain, generation, simulations),
    }
}

fn init_tracing(config: &ServiceConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn serve(mut config: ServiceConfig, listen: Option<String>) -> anyhow::Result<()> {
    if let Some(listen) = listen {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("Invalid listen address: {}", listen))?;
    }

    println!(
        r#"
  Infinity - iterated learning experiment
  Version: {}
  Data: {}
  Listening: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.experiment.data_dir.display(),
        config.server.listen_addr
    );

    Server::new(config)?.run().await?;
    Ok(())
}

fn validate(
    config: ServiceConfig,
    chain: &str,
    generation: &str,
    condition: &str,
) -> anyhow::Result<()> {
    let flow = ExperimentFlow::new(Arc::new(config.experiment));
    let report = flow.gate().validate_run(chain, generation, condition);

    for check in &report.checks {
        let mark = if check.passed { "ok  " } else { "FAIL" };
        println!("[{}] {:<13} {}", mark, check.name, check.detail);
    }
    for advisory in &report.advisories {
        println!("[ ?  ] {}", advisory);
    }

    if !report.passed() {
        bail!("{} validation check(s) failed", report.failures().count());
    }
    Ok(())
}

fn provision(
    config: ServiceConfig,
    condition: Condition,
    chain: &str,
    generations: Option<u32>,
) -> anyhow::Result<()> {
    let experiment = config.experiment;
    if !experiment.is_valid_chain(chain) {
        bail!("Chain \"{}\" is invalid", chain);
    }
    let last = generations.unwrap_or(experiment.max_generation);
    if last == 0 || last > experiment.max_generation {
        bail!("Generation \"{}\" is invalid", last);
    }

    let flow = ExperimentFlow::new(Arc::new(experiment));
    let created = flow.store().provision(condition, chain, 1..=last)?;
    tracing::info!(condition = %condition, chain, last, created, "provisioned chain");
    println!(
        "Provisioned {}/{} generations 1..={} ({} new files)",
        condition, chain, last, created
    );
    Ok(())
}

#[derive(Serialize)]
struct AnalysisOutput {
    #[serde(flatten)]
    analysis: infinity_core::GenerationAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    learnability: Option<infinity_core::analysis::Learnability>,
}

fn analyze(
    config: ServiceConfig,
    condition: Condition,
    chain: &str,
    generation: u32,
    simulations: usize,
) -> anyhow::Result<()> {
    let experiment = config.experiment;
    if !experiment.is_valid_chain(chain) {
        bail!("Chain \"{}\" is invalid", chain);
    }

    let flow = ExperimentFlow::new(Arc::new(experiment));
    let analyzer = Analyzer::new(StimulusLoader::new(flow.store().clone()));
    let analysis = analyzer.analyze(condition, chain, generation)?;

    let learnability = if simulations > 0 {
        let current = analyzer.stable_words(condition, chain, generation)?;
        let previous = analyzer.stable_words(condition, chain, generation - 1)?;
        infinity_core::analysis::learnability(
            &current,
            &previous,
            simulations,
            &mut rand::thread_rng(),
        )
    } else {
        None
    };

    let output = AnalysisOutput {
        analysis,
        learnability,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
