use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::errors::StoreError;

/// Body of a ranged read, streamed in chunks.
pub type RangeBody = BoxStream<'static, Result<Bytes, StoreError>>;

/// Object metadata needed to plan a part-based download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: u64,
    pub supports_byte_ranges: bool,
}

/// A remote store whose objects can be read in byte ranges.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, StoreError>;

    /// Reads the inclusive byte range `start..=end` of an object.
    ///
    /// Returns `StoreError::NotFound` if the object doesn't exist.
    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<RangeBody, StoreError>;
}

#[async_trait]
impl<S> ObjectStore for std::sync::Arc<S>
where
    S: ObjectStore + ?Sized,
{
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, StoreError> {
        (**self).head_object(bucket, key).await
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<RangeBody, StoreError> {
        (**self).get_object_range(bucket, key, start, end).await
    }
}
