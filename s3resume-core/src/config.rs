use std::time::Duration;

use crate::errors::{ResumableError, Result};

/// Bytes in one (decimal) megabyte, the unit of the part size setting.
pub const MEGABYTE: u64 = 1_000_000;
pub const DEFAULT_PART_SIZE_MEGABYTES: u64 = 15;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settings of a [`crate::downloader::Downloader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderConfig {
    /// Size of every part but the last, in bytes.
    pub part_size_bytes: u64,
    /// How long to wait for another process to release the target's lock.
    pub lock_timeout: Duration,
    pub lock_poll_interval: Duration,
    /// Number of parts fetched at the same time. 1 downloads parts in order.
    pub concurrency: usize,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        DownloaderConfig {
            part_size_bytes: DEFAULT_PART_SIZE_MEGABYTES * MEGABYTE,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
            concurrency: 1,
        }
    }
}

impl DownloaderConfig {
    pub fn with_part_size_megabytes(part_size_megabytes: u64) -> Result<Self> {
        if part_size_megabytes < 1 {
            return Err(ResumableError::Validation(
                "Invalid value for part size megabytes".to_string(),
            ));
        }
        let part_size_bytes = part_size_megabytes.checked_mul(MEGABYTE).ok_or_else(|| {
            ResumableError::Validation(format!(
                "Part size of {part_size_megabytes} megabytes is too large"
            ))
        })?;
        Ok(DownloaderConfig {
            part_size_bytes,
            ..Default::default()
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.part_size_bytes < 1 {
            return Err(ResumableError::Validation(
                "Part size must be at least one byte".to_string(),
            ));
        }
        if self.concurrency < 1 {
            return Err(ResumableError::Validation(
                "Concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_part_size_is_15_megabytes() {
        let config = DownloaderConfig::default();
        assert_eq!(config.part_size_bytes, 15_000_000);
        assert_eq!(config.lock_timeout, Duration::from_secs(10));
        assert_eq!(config.concurrency, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_part_size_from_megabytes() {
        let config = DownloaderConfig::with_part_size_megabytes(5).unwrap();
        assert_eq!(config.part_size_bytes, 5_000_000);
    }

    #[test]
    fn test_zero_part_size_is_rejected() {
        assert!(matches!(
            DownloaderConfig::with_part_size_megabytes(0),
            Err(ResumableError::Validation(_))
        ));

        let config = DownloaderConfig {
            part_size_bytes: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ResumableError::Validation(_))
        ));
    }

    #[test]
    fn test_oversized_part_size_is_rejected() {
        assert!(matches!(
            DownloaderConfig::with_part_size_megabytes(u64::MAX / 1000),
            Err(ResumableError::Validation(_))
        ));
        assert!(DownloaderConfig::with_part_size_megabytes(u64::MAX / MEGABYTE).is_ok());
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let config = DownloaderConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ResumableError::Validation(_))
        ));
    }
}
