use std::{
    path::{Path, PathBuf, MAIN_SEPARATOR},
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use s3resume_core::{
    config::DownloaderConfig,
    downloader::Downloader,
    http::HttpStore,
    s3::{S3Config, S3Store},
    store::ObjectStore,
};

use crate::progress::CliProgress;

#[derive(Parser, Debug)]
#[clap(name = "s3resume", version, about = "Download large objects in resumable parts")]
pub struct Args {
    /// Source object: s3://bucket/key or http(s)://host/bucket/key
    #[clap(value_parser)]
    pub source: String,
    /// Target directory or file (defaults to the current directory)
    #[clap(value_parser)]
    pub target: Option<PathBuf>,
    /// Maximum size of temporary parts in MB
    #[clap(long, value_parser, default_value_t = 15)]
    pub part_size: u64,
    /// Directory for temporary parts (defaults to the target directory)
    #[clap(long, value_parser)]
    pub temp_dir: Option<PathBuf>,
    /// Number of parts downloaded at the same time
    #[clap(long, value_parser, default_value_t = 1)]
    pub concurrency: usize,
    /// Seconds to wait for another instance downloading the same file
    #[clap(long, value_parser, default_value_t = 10)]
    pub lock_timeout: u64,
    #[clap(long, value_parser, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub aws_access_key_id: Option<String>,
    #[clap(long, value_parser, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,
    #[clap(long, value_parser, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    pub aws_session_token: Option<String>,
    #[clap(long, value_parser, env = "AWS_REGION")]
    pub region: Option<String>,
    /// Custom S3 endpoint (MinIO, R2, ...)
    #[clap(long, value_parser, env = "AWS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,
    #[clap(long, action)]
    pub force_path_style: bool,
    /// Increase output verbosity
    #[clap(long, action)]
    pub debug: bool,
    /// Write log lines to this file instead of stderr
    #[clap(long, value_parser)]
    pub logfile: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    S3 {
        bucket: String,
        key: String,
    },
    Http {
        base_url: String,
        bucket: String,
        key: String,
    },
}

impl Source {
    pub fn bucket(&self) -> &str {
        match self {
            Source::S3 { bucket, .. } | Source::Http { bucket, .. } => bucket,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Source::S3 { key, .. } | Source::Http { key, .. } => key,
        }
    }
}

/// Parses `s3://bucket/key` or `http(s)://host/bucket/key`.
pub fn parse_source(source: &str) -> Result<Source, String> {
    let invalid = || format!("invalid argument for source url: {source}");

    let (scheme, rest) = source.split_once("://").ok_or_else(invalid)?;
    match scheme {
        "s3" => {
            let (bucket, key) = split_bucket_key(rest).ok_or_else(invalid)?;
            Ok(Source::S3 { bucket, key })
        }
        "http" | "https" => {
            let (host, path) = rest.split_once('/').ok_or_else(invalid)?;
            if host.is_empty() {
                return Err(invalid());
            }
            let (bucket, key) = split_bucket_key(path).ok_or_else(invalid)?;
            Ok(Source::Http {
                base_url: format!("{scheme}://{host}"),
                bucket,
                key,
            })
        }
        _ => Err(invalid()),
    }
}

fn split_bucket_key(path: &str) -> Option<(String, String)> {
    let (bucket, key) = path.split_once('/')?;
    if bucket.is_empty() || key.trim_matches('/').is_empty() {
        return None;
    }
    Some((bucket.to_string(), key.to_string()))
}

/// Splits the target into a download directory and an optional file name.
/// Existing directories and paths ending with a separator are directories.
pub fn resolve_target(target: &Path) -> (PathBuf, Option<String>) {
    let as_text = target.to_string_lossy();
    if target.is_dir() || as_text.ends_with(MAIN_SEPARATOR) || as_text.ends_with('/') {
        return (target.to_path_buf(), None);
    }

    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().to_string());
    let download_dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    (download_dir, file_name)
}

fn downloader_config(args: &Args) -> Result<DownloaderConfig, String> {
    let config = DownloaderConfig::with_part_size_megabytes(args.part_size)
        .map_err(|e| e.to_string())?;
    Ok(DownloaderConfig {
        lock_timeout: Duration::from_secs(args.lock_timeout),
        concurrency: args.concurrency,
        ..config
    })
}

fn s3_config(args: &Args) -> S3Config {
    S3Config {
        region: args.region.clone(),
        endpoint_url: args.endpoint_url.clone(),
        access_key_id: args.aws_access_key_id.clone(),
        secret_access_key: args.aws_secret_access_key.clone(),
        session_token: args.aws_session_token.clone(),
        force_path_style: args.force_path_style,
    }
}

pub async fn handle_download(args: Args) -> Result<(), ()> {
    let source = match parse_source(&args.source) {
        Ok(source) => source,
        Err(e) => {
            tracing::error!("{}", e);
            return Err(());
        }
    };

    let config = match downloader_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return Err(());
        }
    };

    let target = match &args.target {
        Some(target) => target.clone(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let (download_dir, file_name) = resolve_target(&target);

    tracing::debug!("bucket: {}", source.bucket());
    tracing::debug!("key: {}", source.key());
    tracing::debug!("download_dir: {}", download_dir.display());
    tracing::debug!(
        "download_file: {}",
        file_name.as_deref().unwrap_or(source.key().rsplit('/').next().unwrap_or(""))
    );
    tracing::debug!(
        "temp_dir: {}",
        args.temp_dir.as_deref().unwrap_or(&download_dir).display()
    );

    let request = Request {
        bucket: source.bucket(),
        key: source.key(),
        download_dir: &download_dir,
        file_name: file_name.as_deref(),
        temp_dir: args.temp_dir.as_deref(),
    };

    match &source {
        Source::S3 { .. } => {
            let store = S3Store::connect(&s3_config(&args)).await;
            run(store, config, request).await
        }
        Source::Http { base_url, .. } => run(HttpStore::new(base_url.clone()), config, request).await,
    }
}

struct Request<'a> {
    bucket: &'a str,
    key: &'a str,
    download_dir: &'a Path,
    file_name: Option<&'a str>,
    temp_dir: Option<&'a Path>,
}

async fn run<S: ObjectStore>(
    store: S,
    config: DownloaderConfig,
    request: Request<'_>,
) -> Result<(), ()> {
    let downloader = match Downloader::new(store, config) {
        Ok(downloader) => downloader,
        Err(e) => {
            tracing::error!("{}", e);
            return Err(());
        }
    };

    let progress = Arc::new(CliProgress::new());
    downloader.attach(progress.clone());

    let result = downloader
        .download_file(
            request.bucket,
            request.key,
            request.download_dir,
            request.file_name,
            request.temp_dir,
        )
        .await;
    progress.finish();

    match result {
        Ok(path) => {
            tracing::info!("{} downloaded", path.display());
            Ok(())
        }
        Err(e) => {
            tracing::error!("{}", e);
            Err(())
        }
    }
}
