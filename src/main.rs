use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::{Parser, Subcommand};
use gdp_compare::config::{ExperimentConfig, PriorConfig};
use gdp_compare::data::{self, SyntheticDesign};
use gdp_compare::model::ModelSpec;
use gdp_compare::report;
use gdp_compare::run_comparison;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Parser, Debug)]
#[command(
    name = "gdp-compare",
    version,
    about = "Held-out prediction error of OLS, Cp-selected lasso and Bayesian GDP regression."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the repeated train/test comparison described by a TOML file.
    Run {
        /// Path to the experiment configuration.
        #[arg(long)]
        config: PathBuf,
        /// Override the number of repetitions.
        #[arg(long)]
        nsim: Option<usize>,
        /// Override the random seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Override the output directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the Bayesian model graph.
    Model {
        /// Take the prior hyperparameters from this configuration.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write a synthetic dataset with a sparse linear signal on the
    /// square-root scale.
    Simulate {
        #[arg(long, default_value_t = 100)]
        n: usize,
        #[arg(long, default_value_t = 10)]
        p: usize,
        /// Noise standard deviation on the square-root scale.
        #[arg(long, default_value_t = 0.5)]
        noise: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Destination CSV file.
        output: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = execute(cli.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn execute(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Run {
            config,
            nsim,
            seed,
            out,
        } => {
            let start = Instant::now();
            let mut config = ExperimentConfig::from_toml_file(&config)?;
            if let Some(nsim) = nsim {
                config.experiment.nsim = nsim;
            }
            if let Some(seed) = seed {
                config.experiment.seed = seed;
            }
            if let Some(out) = out {
                config.output.dir = out;
            }
            config.validate()?;

            let data_config = config.data()?;
            log::info!("Reading {}", data_config.path.display());
            let dataset = data::load_csv(&data_config.path, &data_config.schema())?;

            let results = run_comparison(&dataset, &config)?;
            let written =
                report::write_outputs(&config.output.dir, &results, config.output.write_draws)?;
            for path in &written {
                log::info!("Wrote {}", path.display());
            }
            println!("{}", report::comparison_table(&results));
            log::info!("Finished in {:.2?}", start.elapsed());
        }
        Command::Model { config } => {
            let priors = match config {
                Some(path) => ExperimentConfig::from_toml_file(path)?.priors,
                None => PriorConfig::default(),
            };
            println!("{}", ModelSpec::gdp(&priors));
        }
        Command::Simulate {
            n,
            p,
            noise,
            seed,
            output,
        } => {
            let mut rng = StdRng::seed_from_u64(seed);
            let dataset = SyntheticDesign::sparse(n, p, noise).generate(&mut rng)?;
            data::write_csv(&output, &dataset, "y")?;
            log::info!("Wrote {} rows and {} predictors to {}", n, p, output.display());
        }
    }
    Ok(())
}
