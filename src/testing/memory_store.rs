use crate::error::{AppError, Result};
use crate::infrastructure::storage::{ByteStream, ObjectStore, StoredObject, UploadInfo};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{StreamExt, stream};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

const GET_CHUNK_SIZE: usize = 16 * 1024;

/// How `put` treats the incoming stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PutBehavior {
    /// Read to the end and store.
    #[default]
    Drain,
    /// Store the first chunk, report success and hang up on the sender.
    AcceptFirstChunk,
    /// Fail without reading anything.
    Fail(String),
}

/// Holds `get` calls until released, so a test can act while a job is
/// in flight.
#[derive(Debug)]
pub struct GetGate {
    entered: Notify,
    release: Semaphore,
}

impl GetGate {
    /// Resolves once a `get` reached the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Lets one waiting `get` through.
    pub fn release(&self) {
        self.release.add_permits(1);
    }
}

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<(String, String), (String, Bytes)>,
    buckets: HashSet<String>,
    put_behavior: PutBehavior,
    read_delay: Option<Duration>,
    gate: Option<Arc<GetGate>>,
    puts: usize,
    deletes: usize,
    largest_chunk: usize,
}

/// [`ObjectStore`] keeping objects in a map.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the store from the others.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, bucket: &str, key: &str, content_type: &str, bytes: impl Into<Bytes>) {
        self.lock().objects.insert(
            (bucket.to_string(), key.to_string()),
            (content_type.to_string(), bytes.into()),
        );
    }

    /// Content type and body of a stored object.
    pub fn object(&self, bucket: &str, key: &str) -> Option<(String, Bytes)> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<_> = self
            .lock()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn buckets(&self) -> Vec<String> {
        let mut buckets: Vec<_> = self.lock().buckets.iter().cloned().collect();
        buckets.sort();
        buckets
    }

    pub fn set_put_behavior(&self, behavior: PutBehavior) {
        self.lock().put_behavior = behavior;
    }

    /// Pause between chunks read by `put`, making the upload a slow reader.
    pub fn set_read_delay(&self, delay: Duration) {
        self.lock().read_delay = Some(delay);
    }

    pub fn pause_gets(&self) -> Arc<GetGate> {
        let gate = Arc::new(GetGate {
            entered: Notify::new(),
            release: Semaphore::new(0),
        });
        self.lock().gate = Some(gate.clone());
        gate
    }

    pub fn put_count(&self) -> usize {
        self.lock().puts
    }

    pub fn delete_count(&self) -> usize {
        self.lock().deletes
    }

    /// Largest single chunk `put` received so far.
    pub fn largest_chunk(&self) -> usize {
        self.lock().largest_chunk
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let gate = self.lock().gate.clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            if let Ok(permit) = gate.release.acquire().await {
                permit.forget();
            }
        }

        let (content_type, body) = self
            .object(bucket, key)
            .ok_or_else(|| AppError::not_found(bucket, key))?;

        let size = body.len() as u64;
        let chunks: Vec<std::io::Result<Bytes>> = body
            .chunks(GET_CHUNK_SIZE)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        Ok(StoredObject {
            stream: Box::pin(stream::iter(chunks)),
            content_type,
            size: Some(size),
        })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        mut stream: ByteStream<'_>,
        _size: Option<u64>,
        content_type: &str,
    ) -> Result<UploadInfo> {
        let (behavior, delay) = {
            let mut inner = self.lock();
            inner.puts += 1;
            (inner.put_behavior.clone(), inner.read_delay)
        };

        if let PutBehavior::Fail(reason) = behavior {
            return Err(AppError::Transport(reason));
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| AppError::Transport(format!("source stream interrupted: {e}")))?;

            {
                let mut inner = self.lock();
                inner.largest_chunk = inner.largest_chunk.max(chunk.len());
            }
            body.extend_from_slice(&chunk);

            if behavior == PutBehavior::AcceptFirstChunk {
                break;
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }

        let size = body.len() as u64;
        self.insert(bucket, key, content_type, body.freeze());

        Ok(UploadInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            etag: None,
        })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.deletes += 1;
        inner.objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn ensure_bucket(&self, bucket: &str, _location: &str) -> Result<()> {
        self.lock().buckets.insert(bucket.to_string());
        Ok(())
    }
}
