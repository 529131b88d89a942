use std::path::{Path, PathBuf};

use tokio::fs;

use crate::{
    errors::{ResumableError, Result},
    store::ObjectStore,
    utils::part_path,
};

/// A planned part-based download of one object.
///
/// Content length and part count are resolved together by [`resolve`] and
/// cannot change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    bucket: String,
    key: String,
    part_size: u64,
    content_length: u64,
    total_parts: u64,
    /// Part `i` is stored at `<part_base>.part<i>`.
    part_base: PathBuf,
}

/// Representation of a part of the object to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    pub index: u64,
    pub start_byte: u64,
    /// Inclusive.
    pub end_byte: u64,
}

impl Part {
    pub fn size(&self) -> u64 {
        self.end_byte - self.start_byte + 1
    }
}

/// Gets the object's length and range support from the store and plans its
/// parts. Fails with [`ResumableError::Incompatible`] when the object is empty
/// or cannot be read in ranges.
pub async fn resolve<S>(
    store: &S,
    bucket: &str,
    key: &str,
    part_size: u64,
    part_base: impl Into<PathBuf>,
) -> Result<TransferDescriptor>
where
    S: ObjectStore + ?Sized,
{
    if part_size < 1 {
        return Err(ResumableError::Validation(
            "Part size must be at least one byte".to_string(),
        ));
    }

    let head = store.head_object(bucket, key).await?;
    if head.content_length == 0 || !head.supports_byte_ranges {
        return Err(ResumableError::Incompatible {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
    }

    Ok(TransferDescriptor {
        bucket: bucket.to_string(),
        key: key.to_string(),
        part_size,
        content_length: head.content_length,
        total_parts: head.content_length.div_ceil(part_size),
        part_base: part_base.into(),
    })
}

impl TransferDescriptor {
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn total_parts(&self) -> u64 {
        self.total_parts
    }

    pub fn part_base(&self) -> &Path {
        &self.part_base
    }

    pub fn part_path(&self, index: u64) -> PathBuf {
        part_path(&self.part_base, index)
    }

    /// Byte range of part `index`, or `None` past the last part.
    pub fn part(&self, index: u64) -> Option<Part> {
        if index >= self.total_parts {
            return None;
        }
        let start_byte = index * self.part_size;
        let end_byte = (start_byte + self.part_size - 1).min(self.content_length - 1);
        Some(Part {
            index,
            start_byte,
            end_byte,
        })
    }

    /// Returns the download parts in ascending order.
    pub fn parts(&self) -> impl Iterator<Item = Part> + '_ {
        (0..self.total_parts).filter_map(|index| self.part(index))
    }

    pub fn expected_part_size(&self, index: u64) -> Option<u64> {
        self.part(index).map(|part| part.size())
    }
}

/// Checks whether `part_file` already holds part `index` in full.
///
/// Any file of the wrong size (including a partially written one) counts as
/// absent and gets downloaded again from scratch.
pub async fn is_complete(part_file: &Path, index: u64, descriptor: &TransferDescriptor) -> bool {
    let expected = match descriptor.expected_part_size(index) {
        Some(expected) => expected,
        None => return false,
    };
    match fs::metadata(part_file).await {
        Ok(metadata) => metadata.is_file() && metadata.len() == expected,
        Err(_) => false,
    }
}
