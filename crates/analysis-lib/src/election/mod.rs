//! Singleton election over a shared document store
//!
//! Replicas contend for a named task by reading and writing one lock record
//! per task. There is no compare-and-swap: two replicas may briefly both
//! write, and the candidacy grace period absorbs that overlap so at most one
//! of them reports itself active.
//!
//! A replica becomes active only after it has renewed the lock continuously
//! for longer than the grace period. A lock not renewed within the lock
//! timeout is taken over by the next replica that asks.

mod clock;


pub use clock::{Clock, ManualClock, SystemClock};

use crate::error::{AnalysisError, Result};
use crate::models::LockRecord;
use crate::store::DocumentStore;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Index holding every lock record
pub const LOCK_INDEX: &str = "cluster_singleton_lock";

/// Document type of lock records
pub const LOCK_TYPE: &str = "cluster_analysis";

/// Election timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionConfig {
    /// A lock not renewed for longer than this may be taken over
    pub lock_timeout: Duration,
    /// Continuous renewal required before the holder reports itself active
    pub candidacy_grace_period: Duration,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(90),
            candidacy_grace_period: Duration::from_secs(60),
        }
    }
}

/// Decides whether this process is the active singleton for a task
pub struct SingletonElection {
    store: Arc<dyn DocumentStore>,
    holder_id: String,
    lock_timeout: chrono::Duration,
    candidacy_grace_period: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl SingletonElection {
    pub fn new(store: Arc<dyn DocumentStore>, holder_id: impl Into<String>, config: ElectionConfig) -> Self {
        Self::with_clock(store, holder_id, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn DocumentStore>,
        holder_id: impl Into<String>,
        config: ElectionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            holder_id: holder_id.into(),
            lock_timeout: to_chrono(config.lock_timeout),
            candidacy_grace_period: to_chrono(config.candidacy_grace_period),
            clock,
        }
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Consult and update the lock for `task_name`.
    ///
    /// Every call is also the lease renewal, so it must be made at intervals
    /// shorter than the lock timeout to keep an acquired lock.
    pub async fn is_selected_as_singleton(&self, task_name: &str) -> Result<bool> {
        let now = self.clock.now();

        let record = match self.load(task_name).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                debug!(task = task_name, holder = %self.holder_id, "No lock record, seeding candidacy");
                self.save(task_name, &LockRecord::candidate(&self.holder_id, now)).await?;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        if now - record.last_renewed_at > self.lock_timeout {
            info!(
                task = task_name,
                previous_holder = %record.holder_id,
                holder = %self.holder_id,
                "Lock timed out, taking over"
            );
            self.save(task_name, &LockRecord::candidate(&self.holder_id, now)).await?;
            return Ok(false);
        }

        if record.holder_id != self.holder_id {
            return Ok(false);
        }

        // Compared before renewing: activity lags the lease by one call.
        let active = record.last_renewed_at - record.first_acquired_at > self.candidacy_grace_period;
        self.save(task_name, &record.renewed(now)).await?;

        Ok(active)
    }

    async fn load(&self, task_name: &str) -> Result<LockRecord> {
        let source = self.store.get(LOCK_INDEX, LOCK_TYPE, task_name).await?;
        serde_json::from_value(source)
            .map_err(|e| AnalysisError::MalformedData(format!("lock record {}: {}", task_name, e)))
    }

    async fn save(&self, task_name: &str, record: &LockRecord) -> Result<()> {
        let document = serde_json::to_value(record)?;
        self.store.put(LOCK_INDEX, LOCK_TYPE, task_name, &document).await
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
}

/// First non-loopback IPv4 address of this host.
///
/// Resolved from the source address the kernel picks for an outbound route;
/// no packet is sent.
pub async fn local_ipv4() -> Result<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect("8.8.8.8:80").await?;

    match socket.local_addr()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Ok(ip),
        other => Err(AnalysisError::InvalidInput(format!(
            "no non-loopback IPv4 address available (found {})",
            other
        ))),
    }
}

/// The configured holder id, or the local IPv4 address
pub async fn resolve_holder_id(configured: Option<&str>) -> Result<String> {
    match configured.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => Ok(id.to_string()),
        None => Ok(local_ipv4().await?.to_string()),
    }
}
