//! In-process object service. Stands in for S3 in tests and local runs, with
//! switches to inject failures.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::ObjectBackend;
use crate::bucket::{BucketAdmin, BucketProbe};
use crate::error::BoxError;

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Vec<u8>>,
    buckets: BTreeSet<String>,
    fail_gets: bool,
    fail_puts: bool,
    /// Number of puts still allowed to succeed; `None` for unlimited.
    puts_left: Option<usize>,
    inconclusive_probes: bool,
    gets: usize,
    puts: usize,
    list_probes: usize,
    bucket_creations: usize,
}

#[derive(Default)]
pub struct MemoryObjectBackend {
    state: Mutex<State>,
}

impl MemoryObjectBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(bucket: &str) -> Self {
        let backend = Self::new();
        backend.state().buckets.insert(bucket.to_string());
        backend
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, key: &str, data: Vec<u8>) {
        self.state().objects.insert(key.to_string(), data);
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.state().objects.is_empty()
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.state().buckets.contains(bucket)
    }

    pub fn fail_gets(&self, fail: bool) {
        self.state().fail_gets = fail;
    }

    pub fn fail_puts(&self, fail: bool) {
        self.state().fail_puts = fail;
    }

    /// Lets `n` more puts through, then fails every put after them.
    pub fn fail_puts_after(&self, n: usize) {
        self.state().puts_left = Some(n);
    }

    pub fn inconclusive_probes(&self, inconclusive: bool) {
        self.state().inconclusive_probes = inconclusive;
    }

    pub fn gets(&self) -> usize {
        self.state().gets
    }

    pub fn puts(&self) -> usize {
        self.state().puts
    }

    pub fn list_probes(&self) -> usize {
        self.state().list_probes
    }

    pub fn bucket_creations(&self) -> usize {
        self.state().bucket_creations
    }
}

fn injected(what: &str) -> BoxError {
    std::io::Error::other(format!("injected {} failure", what)).into()
}

#[tonic::async_trait]
impl ObjectBackend for MemoryObjectBackend {
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        let mut state = self.state();
        state.gets += 1;
        if state.fail_gets {
            return Err(injected("get"));
        }
        Ok(state.objects.get(key).cloned())
    }

    async fn put_object(&self, key: &str, data: &[u8]) -> Result<(), BoxError> {
        let mut state = self.state();
        if state.fail_puts {
            return Err(injected("put"));
        }
        let puts_left = state.puts_left;
        match puts_left {
            Some(0) => return Err(injected("put")),
            Some(n) => state.puts_left = Some(n - 1),
            None => {}
        }
        state.puts += 1;
        state.objects.insert(key.to_string(), data.to_vec());
        Ok(())
    }
}

#[tonic::async_trait]
impl BucketAdmin for MemoryObjectBackend {
    async fn probe_bucket(&self, bucket: &str) -> BucketProbe {
        let state = self.state();
        if state.inconclusive_probes {
            BucketProbe::Inconclusive(injected("head"))
        } else if state.buckets.contains(bucket) {
            BucketProbe::Exists
        } else {
            BucketProbe::Missing
        }
    }

    async fn list_probe(&self, bucket: &str) -> Result<bool, BoxError> {
        let mut state = self.state();
        state.list_probes += 1;
        if state.fail_gets {
            return Err(injected("list"));
        }
        Ok(state.buckets.contains(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), BoxError> {
        let mut state = self.state();
        state.bucket_creations += 1;
        state.buckets.insert(bucket.to_string());
        Ok(())
    }
}
