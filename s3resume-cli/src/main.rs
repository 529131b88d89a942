use clap::Parser;
use commands::{handle_download, Args};
use dotenv::dotenv;
use std::{
    fs::OpenOptions,
    path::Path,
    process,
    sync::Mutex,
};
use tracing_subscriber::EnvFilter;

pub mod commands;
mod progress;

#[tokio::main]
async fn main() {
    // Credentials may come from a .env file through the AWS_* variables.
    dotenv().ok();

    let args = Args::parse();

    if let Err(e) = setup_logging(args.debug, args.logfile.as_deref()) {
        eprintln!("{}", e);
        process::exit(1);
    }

    let successful = handle_download(args).await.is_ok();

    if !successful {
        process::exit(1);
    }
}

fn setup_logging(debug: bool, logfile: Option<&Path>) -> Result<(), String> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,s3resume={level},s3resume_core={level}"))
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("{} : {}", e, path.display()))?;
            subscriber
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| e.to_string())
        }
        None => subscriber
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| e.to_string()),
    }
}
