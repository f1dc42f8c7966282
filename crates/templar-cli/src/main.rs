//! CLI for templar — simulated template attacks on a single key byte.

mod commands;

use clap::{Parser, Subcommand};

use commands::ExperimentArgs;

#[derive(Parser)]
#[command(name = "templar")]
#[command(about = "templar — profile a leaky device, then recover its key from one trace")]
#[command(version = templar_core::VERSION)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build templates, attack one trace of the true key, print the guess
    Attack {
        #[command(flatten)]
        experiment: ExperimentArgs,

        /// Write the full report as JSON
        #[arg(long)]
        output: Option<String>,

        /// Write `sample,template_mean,test_trace` CSV for plotting
        #[arg(long)]
        plot_data: Option<String>,
    },

    /// Build templates once, attack many random keys, report success rate
    Bench {
        #[command(flatten)]
        experiment: ExperimentArgs,

        /// Number of attacked traces
        #[arg(long, default_value = "100")]
        trials: usize,

        /// Write the bench report as JSON
        #[arg(long)]
        output: Option<String>,
    },

    /// Build templates only and summarize (or dump) the template store
    Profile {
        #[command(flatten)]
        experiment: ExperimentArgs,

        /// Write the template store as JSON
        #[arg(long)]
        output: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Attack {
            experiment,
            output,
            plot_data,
        } => commands::attack::run(&experiment, output.as_deref(), plot_data.as_deref()),
        Commands::Bench {
            experiment,
            trials,
            output,
        } => commands::bench::run(&experiment, trials, output.as_deref()),
        Commands::Profile { experiment, output } => {
            commands::profile::run(&experiment, output.as_deref())
        }
    }
}
