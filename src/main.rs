mod bucket;
mod cli;
mod composite;
mod config;
mod error;
mod export;
mod pipeline;
mod raster;
mod reduce;
mod regression;
mod region;
mod source;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};
use env_logger::Env;
use regression::RegressionOptions;

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Commands::Run {
            config,
            datasets,
            output_dir,
            parquet,
        } => command::run(&config, &datasets, output_dir, parquet, |file| {
            println!("File saved to `{}`", file.display())
        })
        .await
        .map(|_| ()),
        Commands::Buckets {
            start_year,
            end_year,
        } => command::buckets(start_year, end_year).map(|lines| {
            for line in lines {
                println!("{}", line);
            }
        }),
        Commands::Check { config } => command::check(&config).await.map(|lines| {
            for line in lines {
                println!("{}", line);
            }
            println!("Configuration `{}` is valid", config.display());
        }),
        Commands::Merge { output, inputs } => command::merge(&output, &inputs)
            .map(|file| println!("File saved to `{}`", file.display())),
        Commands::Regress {
            target,
            features,
            output,
            test_fraction,
            seed,
            inputs,
        } => {
            let options = RegressionOptions {
                target,
                features,
                test_fraction,
                seed,
            };
            command::regress(&output, &inputs, &options).map(|(lines, file)| {
                for line in lines {
                    println!("{}", line);
                }
                println!("File saved to `{}`", file.display());
            })
        }
    };

    if let Err(e) = outcome {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
