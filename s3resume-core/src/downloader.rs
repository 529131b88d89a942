use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::{stream, StreamExt, TryStreamExt};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};

use crate::{
    config::DownloaderConfig,
    download::{is_complete, resolve, TransferDescriptor},
    errors::{DownloadError, ResumableError, Result, StoreError},
    event::{ObserverId, Observers, PartProgress, ProgressSink},
    lock::TransferLock,
    store::{ObjectStore, RangeBody},
    utils::{create_directory_tree, file_name_from_key, lock_path_for},
};

/// Downloads objects in parts so that interrupted transfers can resume.
///
/// Each downloader owns its observer registry; progress of one downloader is
/// never delivered to observers of another.
#[derive(Debug)]
pub struct Downloader<S> {
    store: S,
    config: DownloaderConfig,
    observers: Observers,
}

impl<S> Downloader<S>
where
    S: ObjectStore,
{
    /// Creates a downloader, rejecting invalid configuration.
    pub fn new(store: S, config: DownloaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Downloader {
            store,
            config,
            observers: Observers::new(),
        })
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers `sink` for progress updates of every later download.
    pub fn attach(&self, sink: Arc<dyn ProgressSink>) -> ObserverId {
        self.observers.attach(sink)
    }

    pub fn detach(&self, id: ObserverId) -> bool {
        self.observers.detach(id)
    }

    /// Downloads `bucket`/`key` into `download_dir` and returns the final path.
    ///
    /// `file_name` defaults to the last segment of the key and `temp_dir`,
    /// where parts are kept until the transfer completes, defaults to
    /// `download_dir`. If the final file already exists its path is returned
    /// without contacting the store.
    pub async fn download_file(
        &self,
        bucket: &str,
        key: &str,
        download_dir: impl AsRef<Path>,
        file_name: Option<&str>,
        temp_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        validate_bucket(bucket)?;
        if key.is_empty() {
            return Err(ResumableError::Validation("Key must not be empty".to_string()));
        }

        let download_dir = download_dir.as_ref();
        let temp_dir = temp_dir.unwrap_or(download_dir);
        let file_name = match file_name {
            Some(name) => name.to_string(),
            None => file_name_from_key(key).ok_or_else(|| {
                ResumableError::Validation(format!("Cannot derive a file name from key {key}"))
            })?,
        };
        validate_file_name(&file_name)?;

        create_directory_tree(temp_dir).await?;
        create_directory_tree(download_dir).await?;

        let local_file_path = download_dir.join(&file_name);

        // The file was already downloaded
        if is_file(&local_file_path).await {
            tracing::debug!(path = %local_file_path.display(), "file already downloaded");
            return Ok(local_file_path);
        }

        // Avoid other instances downloading the same file
        let lock_path = lock_path_for(&file_name);
        let _lock = TransferLock::acquire(
            &lock_path,
            self.config.lock_timeout,
            self.config.lock_poll_interval,
        )
        .await
        .map_err(|e| match e {
            ResumableError::Busy { .. } => ResumableError::Busy {
                path: local_file_path.clone(),
            },
            other => other,
        })?;

        // Whoever held the lock may have just finished this file.
        if is_file(&local_file_path).await {
            tracing::debug!(path = %local_file_path.display(), "file downloaded by another instance");
            return Ok(local_file_path);
        }

        let downloaded_file = self
            .download_parts(bucket, key, &file_name, temp_dir)
            .await?;

        if let Err(e) = move_into_place(&downloaded_file, &local_file_path).await {
            remove_if_exists(&downloaded_file).await;
            return Err(e.into());
        }

        tracing::info!(
            bucket,
            key,
            path = %local_file_path.display(),
            "download complete"
        );
        Ok(local_file_path)
    }

    /// Fetches every missing part, then joins them into the hidden file
    /// `<temp_dir>/.<file_name>.s3resume` and returns its path once its size
    /// matches the object.
    async fn download_parts(
        &self,
        bucket: &str,
        key: &str,
        file_name: &str,
        temp_dir: &Path,
    ) -> Result<PathBuf> {
        let part_base = temp_dir.join(file_name);
        // The final name only ever holds a verified file.
        let assembled = staging_path(&part_base);

        let descriptor = resolve(
            &self.store,
            bucket,
            key,
            self.config.part_size_bytes,
            part_base,
        )
        .await?;
        tracing::debug!(
            key,
            content_length = descriptor.content_length(),
            total_parts = descriptor.total_parts(),
            "resolved object metadata"
        );

        stream::iter(0..descriptor.total_parts())
            .map(Ok)
            .try_for_each_concurrent(self.config.concurrency, |index| {
                self.fetch_part(index, &descriptor)
            })
            .await?;

        concatenate_parts(&descriptor, &assembled).await?;

        // Check file size
        let actual = fs::metadata(&assembled).await?.len();
        if actual != descriptor.content_length() {
            remove_if_exists(&assembled).await;
            return Err(DownloadError::AssembledSizeMismatch {
                expected: descriptor.content_length(),
                actual,
            }
            .into());
        }

        Ok(assembled)
    }

    /// Downloads part `index` into its part file unless it is already there,
    /// then notifies the observers.
    pub async fn fetch_part(&self, index: u64, descriptor: &TransferDescriptor) -> Result<()> {
        let part = descriptor.part(index).ok_or_else(|| {
            ResumableError::Validation(format!(
                "Part {index} is out of range for {} parts",
                descriptor.total_parts()
            ))
        })?;
        let part_file = descriptor.part_path(index);

        if is_complete(&part_file, index, descriptor).await {
            tracing::debug!(part = index, "part already downloaded");
            return Ok(());
        }

        let body = self
            .store
            .get_object_range(
                descriptor.bucket(),
                descriptor.key(),
                part.start_byte,
                part.end_byte,
            )
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ResumableError::from(DownloadError::ObjectMissing {
                    key: descriptor.key().to_string(),
                }),
                other => other.into(),
            })?;

        // Removes the part file on every exit below, including cancellation,
        // until the part is verified.
        let unverified = UnverifiedPart::new(&part_file);
        write_part(&part_file, body).await?;

        if !is_complete(&part_file, index, descriptor).await {
            let actual = fs::metadata(&part_file)
                .await
                .map(|metadata| metadata.len())
                .unwrap_or(0);
            return Err(DownloadError::PartSizeMismatch {
                part: index,
                expected: part.size(),
                actual,
            }
            .into());
        }
        unverified.keep();

        tracing::debug!(
            part = index + 1,
            total_parts = descriptor.total_parts(),
            "downloaded part"
        );
        self.observers.notify(&PartProgress {
            key: descriptor.key().to_string(),
            part: index + 1,
            total_parts: descriptor.total_parts(),
            content_length: descriptor.content_length(),
            part_size: descriptor.part_size(),
        });

        Ok(())
    }
}

/// Part file that is deleted when dropped unless [`UnverifiedPart::keep`] is
/// called.
struct UnverifiedPart<'a> {
    path: &'a Path,
    keep: bool,
}

impl<'a> UnverifiedPart<'a> {
    fn new(path: &'a Path) -> Self {
        UnverifiedPart { path, keep: false }
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for UnverifiedPart<'_> {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = std::fs::remove_file(self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove part");
            }
        }
    }
}

/// Writes `body` to `path`, replacing whatever was there.
async fn write_part(path: &Path, mut body: RangeBody) -> Result<()> {
    let mut file = File::create(path).await?;
    while let Some(chunk) = body.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

/// Joins all parts, in order, into `target`. Every part file is removed once
/// consumed, and `target` is removed if joining fails.
async fn concatenate_parts(descriptor: &TransferDescriptor, target: &Path) -> Result<()> {
    let mut result_file = File::create(target).await?;

    let joined = append_parts(&mut result_file, descriptor).await;
    drop(result_file);

    if let Err(e) = joined {
        remove_if_exists(target).await;
        return Err(e);
    }
    Ok(())
}

async fn append_parts(result_file: &mut File, descriptor: &TransferDescriptor) -> Result<()> {
    for index in 0..descriptor.total_parts() {
        let part_file = descriptor.part_path(index);
        let appended = append_part(result_file, &part_file).await;
        remove_if_exists(&part_file).await;
        appended?;
    }
    result_file.flush().await?;
    result_file.sync_all().await?;
    Ok(())
}

async fn append_part(result_file: &mut File, part_file: &Path) -> io::Result<u64> {
    let mut part = File::open(part_file).await?;
    tokio::io::copy(&mut part, result_file).await
}

/// Renames `from` to `to`. Across filesystems the file is copied next to `to`
/// first so the final step is still a rename.
async fn move_into_place(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            let staging = staging_path(to);
            let copied = async {
                fs::copy(from, &staging).await?;
                fs::rename(&staging, to).await
            }
            .await;
            if let Err(e) = copied {
                remove_if_exists(&staging).await;
                return Err(e);
            }
            fs::remove_file(from).await
        }
        Err(e) => Err(e),
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.s3resume"))
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove file");
        }
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

fn validate_bucket(bucket: &str) -> Result<()> {
    if bucket.is_empty() || bucket.contains('/') {
        return Err(ResumableError::Validation(format!(
            "Invalid bucket name {bucket:?}"
        )));
    }
    Ok(())
}

fn validate_file_name(file_name: &str) -> Result<()> {
    let invalid = file_name.is_empty()
        || file_name == "."
        || file_name == ".."
        || file_name.contains(['/', '\\']);
    if invalid {
        return Err(ResumableError::Validation(format!(
            "Invalid file name {file_name:?}"
        )));
    }
    Ok(())
}
