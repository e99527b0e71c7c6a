//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    /// Log debug messages
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute monthly regional means for the configured datasets
    Run {
        /// Run configuration file
        #[arg(short, long)]
        config: PathBuf,
        /// Only run the named dataset; may be repeated
        #[arg(short, long = "dataset")]
        datasets: Vec<String>,
        /// Directory for output files, overriding the configuration
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Also write a Parquet file per dataset
        #[arg(long)]
        parquet: bool,
    },
    /// List the monthly buckets of a period
    Buckets {
        #[arg(long)]
        start_year: i32,
        #[arg(long)]
        end_year: i32,
    },
    /// Validate a configuration and open its sources without computing
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Join exported CSV series on their date column
    Merge {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Fit one series against the others over their common months
    Regress {
        /// Column to predict
        #[arg(long)]
        target: String,
        /// Explanatory column; may be repeated, defaults to all other columns
        #[arg(long = "feature")]
        features: Vec<String>,
        /// CSV file for the per-month residuals
        #[arg(short, long)]
        output: PathBuf,
        /// Share of months held out for scoring
        #[arg(long, default_value_t = 0.2)]
        test_fraction: f64,
        /// Seed of the train/test shuffle
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    let style = ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

    ProgressBar::new(size).with_message(message).with_style(style)
}
