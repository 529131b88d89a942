//! In-memory object store used by unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};

use crate::{
    errors::StoreError,
    store::{ObjectHead, ObjectStore, RangeBody},
};

pub(crate) const BUCKET: &str = "test-bucket";

/// Deterministic, non-repeating-looking payload of `len` bytes.
pub(crate) fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    no_byte_ranges: AtomicBool,
    /// Bytes dropped from the end of every ranged response.
    truncate_by: AtomicU64,
    /// Fail the body stream after its first chunk.
    interrupt_streams: AtomicBool,
    /// Wait before answering every ranged read.
    range_delay: Mutex<Duration>,
    /// Ranges (by start byte) that fail with a transport error after a wait.
    failing_ranges: Mutex<HashMap<u64, Duration>>,
    /// Ranges (by start byte) whose body never ends after the first chunk.
    stalled_ranges: Mutex<HashSet<u64>>,
    heads: AtomicUsize,
    ranges: Mutex<Vec<(u64, u64)>>,
}

impl MemoryStore {
    pub(crate) fn with_object(key: &str, data: Vec<u8>) -> Self {
        let store = MemoryStore::default();
        store.put(key, data);
        store
    }

    pub(crate) fn put(&self, key: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((BUCKET.to_string(), key.to_string()), data);
    }

    pub(crate) fn remove(&self, key: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&(BUCKET.to_string(), key.to_string()));
    }

    pub(crate) fn disable_byte_ranges(&self) {
        self.no_byte_ranges.store(true, Ordering::SeqCst);
    }

    pub(crate) fn truncate_responses_by(&self, bytes: u64) {
        self.truncate_by.store(bytes, Ordering::SeqCst);
    }

    pub(crate) fn interrupt_streams(&self) {
        self.interrupt_streams.store(true, Ordering::SeqCst);
    }

    pub(crate) fn delay_ranges(&self, delay: Duration) {
        *self.range_delay.lock().unwrap() = delay;
    }

    pub(crate) fn fail_range(&self, start: u64, after: Duration) {
        self.failing_ranges.lock().unwrap().insert(start, after);
    }

    pub(crate) fn stall_range(&self, start: u64) {
        self.stalled_ranges.lock().unwrap().insert(start);
    }

    pub(crate) fn head_count(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    /// Inclusive ranges requested so far, in request order.
    pub(crate) fn requested_ranges(&self) -> Vec<(u64, u64)> {
        self.ranges.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.head_count() + self.ranges.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, StoreError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();
        let data = objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or(StoreError::NotFound)?;
        Ok(ObjectHead {
            content_length: data.len() as u64,
            supports_byte_ranges: !self.no_byte_ranges.load(Ordering::SeqCst),
        })
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<RangeBody, StoreError> {
        self.ranges.lock().unwrap().push((start, end));

        let delay = *self.range_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failing_ranges.lock().unwrap().get(&start).copied();
        if let Some(after) = failure {
            tokio::time::sleep(after).await;
            return Err(StoreError::Transport("service unavailable".to_string()));
        }

        let mut slice = {
            let objects = self.objects.lock().unwrap();
            let data = objects
                .get(&(bucket.to_string(), key.to_string()))
                .ok_or(StoreError::NotFound)?;
            let last = (data.len() as u64).saturating_sub(1);
            let end = end.min(last);
            data[start as usize..=end as usize].to_vec()
        };
        let truncate_by = self.truncate_by.load(Ordering::SeqCst) as usize;
        slice.truncate(slice.len().saturating_sub(truncate_by));

        // Two chunks, so writers see a real stream.
        let split = slice.len() / 2;
        let tail = slice.split_off(split);
        if self.stalled_ranges.lock().unwrap().contains(&start) {
            return Ok(stream::iter(vec![Ok(Bytes::from(slice))])
                .chain(stream::pending())
                .boxed());
        }

        let mut chunks: Vec<Result<Bytes, StoreError>> =
            vec![Ok(Bytes::from(slice)), Ok(Bytes::from(tail))];
        if self.interrupt_streams.load(Ordering::SeqCst) {
            chunks[1] = Err(StoreError::Transport("connection reset".to_string()));
        }

        Ok(stream::iter(chunks).boxed())
    }
}
