use anyhow::{bail, Context};
use colored::Colorize;
use rampart::{clap_args, config::Config};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // dotenv
    dotenvy::dotenv().ok();

    let args = clap_args::parse();

    match args.command {
        clap_args::Commands::Init => {
            Config::write_example_to_file(Path::new("./rampart.toml"))?;
            println!("{}", "rampart.toml created!".green());
        }

        clap_args::Commands::Run {
            config,
            mode,
            base_url,
            out,
        } => {
            // config errors are fatal here, before any virtual user starts
            let config = Config::load(&config, mode.as_deref(), base_url.as_deref())?;
            init_tracing(args.verbose, config.debug_level.as_deref())?;

            let cancel = CancellationToken::new();
            let handler_token = cancel.clone();
            ctrlc::set_handler(move || {
                info!("interrupt received, finishing in-flight iterations");
                handler_token.cancel();
            })?;

            let report = rampart::run(&config, out.as_deref(), cancel).await?;
            if !report.passed() {
                bail!("one or more thresholds failed");
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, debug_level: Option<&str>) -> anyhow::Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        match debug_level {
            Some(level) => match level.to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => {
                    eprintln!("unknown debug_level {level} in config, falling back to info");
                    Level::INFO
                }
            },
            None => Level::INFO,
        }
    };

    tracing::subscriber::set_global_default(
        tracing_subscriber::fmt().with_max_level(level).finish(),
    )
    .context("Failed to set global default subscriber")?;

    Ok(())
}
