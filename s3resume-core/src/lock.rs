use std::{
    fs::{File, OpenOptions, TryLockError},
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::time::{sleep, Instant};

use crate::errors::{ResumableError, Result};

/// Exclusive advisory lock on a file, released when dropped.
#[derive(Debug)]
pub struct TransferLock {
    file: File,
    path: PathBuf,
}

impl TransferLock {
    /// Tries to take the lock at `path`, polling every `poll_interval` until
    /// `timeout` elapses. Fails with [`ResumableError::Busy`] when another
    /// holder keeps it past the deadline.
    pub async fn acquire(
        path: &Path,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<TransferLock> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        // No deadline when the timeout cannot be represented.
        let deadline = Instant::now().checked_add(timeout);

        loop {
            match file.try_lock() {
                Ok(()) => {
                    tracing::debug!(lock = %path.display(), "lock acquired");
                    return Ok(TransferLock {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(TryLockError::WouldBlock) => {}
                Err(TryLockError::Error(e)) => return Err(ResumableError::Io(e)),
            }

            let now = Instant::now();
            let wait = match deadline {
                Some(deadline) if now >= deadline => {
                    return Err(ResumableError::Busy {
                        path: path.to_path_buf(),
                    })
                }
                Some(deadline) => poll_interval.min(deadline - now),
                None => poll_interval,
            };
            sleep(wait).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransferLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release lock");
        } else {
            tracing::debug!(lock = %self.path.display(), "lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_second_acquirer_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.lock");

        let held = TransferLock::acquire(&path, Duration::from_secs(1), POLL)
            .await
            .unwrap();
        let started = std::time::Instant::now();
        let err = TransferLock::acquire(&path, Duration::from_millis(150), POLL)
            .await
            .unwrap_err();

        assert!(matches!(err, ResumableError::Busy { .. }));
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(held.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.lock");

        let held = TransferLock::acquire(&path, Duration::from_secs(1), POLL)
            .await
            .unwrap();
        drop(held);

        TransferLock::acquire(&path, Duration::from_millis(100), POLL)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unbounded_timeout_does_not_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.lock");

        let held = TransferLock::acquire(&path, Duration::MAX, POLL)
            .await
            .unwrap();
        let waiting = tokio::time::timeout(
            Duration::from_millis(100),
            TransferLock::acquire(&path, Duration::MAX, POLL),
        )
        .await;

        assert!(waiting.is_err());
        drop(held);
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_once_released() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.lock");

        let held = TransferLock::acquire(&path, Duration::from_secs(1), POLL)
            .await
            .unwrap();
        let releaser = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            drop(held);
        });

        TransferLock::acquire(&path, Duration::from_secs(5), POLL)
            .await
            .unwrap();
        releaser.await.unwrap();
    }
}
