//! In-memory port implementations that record every call in order.

use crate::domain::{
    ClusterState, CreateVolumeRequest, DeleteVolumeRequest, Volume, VolumeBackend,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// A call made against one of the ports
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    BackendCreate(CreateVolumeRequest),
    BackendDelete(DeleteVolumeRequest),
    ClusterGet(String),
    ClusterPost(String, Volume),
    ClusterDelete(String),
}

/// Ordered log shared by the fakes
#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<Call>>,
}

impl CallLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, call: Call) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

fn take_failure(counter: &Mutex<u32>) -> bool {
    let mut remaining = counter.lock();
    if *remaining > 0 {
        *remaining -= 1;
        true
    } else {
        false
    }
}

// =============================================================================
// Backend
// =============================================================================

pub struct FakeBackend {
    log: Arc<CallLog>,
    volumes: Mutex<BTreeSet<String>>,
    create_failures: Mutex<u32>,
    delete_failures: Mutex<u32>,
    delay: Mutex<Option<Duration>>,
}

impl FakeBackend {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            volumes: Mutex::new(BTreeSet::new()),
            create_failures: Mutex::new(0),
            delete_failures: Mutex::new(0),
            delay: Mutex::new(None),
        }
    }

    /// Fail the next `n` create calls
    pub fn fail_create(&self, n: u32) {
        *self.create_failures.lock() = n;
    }

    /// Fail the next `n` delete calls
    pub fn fail_delete(&self, n: u32) {
        *self.delete_failures.lock() = n;
    }

    /// Sleep this long inside every call
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.volumes.lock().contains(name)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl VolumeBackend for FakeBackend {
    async fn create(&self, request: &CreateVolumeRequest) -> Result<()> {
        self.log.push(Call::BackendCreate(request.clone()));
        self.pause().await;
        if take_failure(&self.create_failures) {
            return Err(Error::backend("create", &request.name, "injected failure"));
        }
        self.volumes.lock().insert(request.name.clone());
        Ok(())
    }

    async fn delete(&self, request: &DeleteVolumeRequest) -> Result<()> {
        self.log.push(Call::BackendDelete(request.clone()));
        self.pause().await;
        if take_failure(&self.delete_failures) {
            return Err(Error::backend("delete", &request.name, "injected failure"));
        }
        self.volumes.lock().remove(&request.name);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "fake"
    }
}

// =============================================================================
// Cluster
// =============================================================================

pub struct FakeCluster {
    log: Arc<CallLog>,
    records: Mutex<BTreeMap<String, Volume>>,
    post_failures: Mutex<VecDeque<u16>>,
    delete_failures: Mutex<VecDeque<u16>>,
}

impl FakeCluster {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            records: Mutex::new(BTreeMap::new()),
            post_failures: Mutex::new(VecDeque::new()),
            delete_failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Seed a record at `path`
    pub fn insert(&self, path: &str, volume: Volume) {
        self.records.lock().insert(path.to_string(), volume);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.records.lock().contains_key(path)
    }

    /// Fail the next post with `status`
    pub fn fail_post(&self, status: u16) {
        self.post_failures.lock().push_back(status);
    }

    /// Fail the next delete with `status`
    pub fn fail_delete(&self, status: u16) {
        self.delete_failures.lock().push_back(status);
    }
}

#[async_trait]
impl ClusterState for FakeCluster {
    async fn get(&self, path: &str) -> Result<Volume> {
        self.log.push(Call::ClusterGet(path.to_string()));
        self.records
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::cluster("GET", path, Some(404), "not found"))
    }

    async fn post(&self, path: &str, body: &Volume) -> Result<()> {
        self.log
            .push(Call::ClusterPost(path.to_string(), body.clone()));
        if let Some(status) = self.post_failures.lock().pop_front() {
            return Err(Error::cluster("POST", path, Some(status), "injected failure"));
        }
        self.records
            .lock()
            .insert(format!("{}/{}", path, body.name()), body.clone());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.log.push(Call::ClusterDelete(path.to_string()));
        if let Some(status) = self.delete_failures.lock().pop_front() {
            return Err(Error::cluster("DELETE", path, Some(status), "injected failure"));
        }
        self.records
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::cluster("DELETE", path, Some(404), "not found"))
    }
}
