//! Resumable, part-based downloads from byte-range addressable object stores.
//!
//! An object is fetched as fixed-size byte ranges, each persisted as its own
//! part file next to the destination. A rerun after an interruption keeps every
//! part that is already complete on disk and only fetches the rest. Once all
//! parts are present they are joined, size-checked and moved into place. An
//! advisory lock keyed by the destination file name keeps two processes from
//! downloading the same target at once.
//!
//! ```no_run
//! use s3resume_core::{
//!     config::DownloaderConfig,
//!     downloader::Downloader,
//!     s3::{S3Config, S3Store},
//! };
//!
//! # async fn run() -> s3resume_core::errors::Result<()> {
//! let store = S3Store::connect(&S3Config::default()).await;
//! let downloader = Downloader::new(store, DownloaderConfig::default())?;
//! let path = downloader
//!     .download_file("my-bucket", "backups/db.tar.gz", "./downloads", None, None)
//!     .await?;
//! println!("{}", path.display());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod download;
pub mod downloader;
pub mod errors;
pub mod event;
pub mod http;
pub mod lock;
pub mod s3;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::DownloaderConfig;
pub use downloader::Downloader;
pub use errors::{DownloadError, ResumableError, StoreError};
pub use event::{PartProgress, ProgressSink};
pub use store::{ObjectHead, ObjectStore};
