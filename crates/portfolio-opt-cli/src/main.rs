mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::allocate::AllocateArgs;
use commands::clean::CleanArgs;
use commands::estimate::EstimateArgs;
use commands::optimize::{FrontierArgs, OptimizeArgs};
use commands::run::RunArgs;

/// Mean-variance portfolio optimization and discrete share allocation
#[derive(Parser)]
#[command(
    name = "pfopt",
    version,
    about = "Mean-variance portfolio optimization and discrete share allocation",
    long_about = "A CLI that estimates expected returns and covariance from price \
                  history, finds the maximum-Sharpe portfolio, cleans the weights \
                  and converts them into whole-share orders for a cash budget. \
                  All arithmetic is decimal."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Settings file (.json, .yaml or .yml) for `estimate` and `run`;
    /// flags override its values
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log more to stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate annualized expected returns and covariance from prices
    Estimate(EstimateArgs),
    /// Optimize weights from expected returns and a covariance matrix
    Optimize(OptimizeArgs),
    /// Trace the efficient frontier between min volatility and max return
    Frontier(FrontierArgs),
    /// Zero tiny weights and round the rest
    Clean(CleanArgs),
    /// Convert target weights into whole shares for a budget
    Allocate(AllocateArgs),
    /// Price history to share orders: estimate, optimize, clean, allocate
    Run(RunArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: u8) {
    let default_directive = match verbose {
        0 => "portfolio_opt_core=warn,pfopt=warn",
        1 => "portfolio_opt_core=debug,pfopt=debug",
        _ => "portfolio_opt_core=trace,pfopt=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = match input::config::load_settings(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Estimate(args) => commands::estimate::run_estimate(args, &settings),
        Commands::Optimize(args) => commands::optimize::run_optimize(args),
        Commands::Frontier(args) => commands::optimize::run_frontier(args),
        Commands::Clean(args) => commands::clean::run_clean(args),
        Commands::Allocate(args) => commands::allocate::run_allocate(args),
        Commands::Run(args) => commands::run::run_pipeline(args, settings),
        Commands::Version => {
            println!("pfopt {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
