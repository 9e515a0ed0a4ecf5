//! # Publication Store
//!
//! The storage engine is an external collaborator; the analytics core only
//! depends on the narrow query capability defined here. `MemoryStore`
//! implements it in-process for local runs and tests.

pub mod memory;
pub mod query;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::{PollSnapshot, Publication};
use crate::store::query::{AggregateQuery, GroupedRow, RecordFilter};

pub use memory::MemoryStore;

/// Failures surfaced by a store backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store query failed: {0}")]
    Query(String),
    #[error("store call timed out")]
    Timeout,
    #[error("store disconnected")]
    Disconnected,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Grouped aggregation and recent-first lookup over the publication stream.
///
/// Implementations must tolerate concurrent reads; the analytics jobs never
/// write through this interface.
#[async_trait]
pub trait PublicationStore: Send + Sync {
    /// Run a grouped aggregation (sum/average by group key, optionally
    /// sorted and limited).
    async fn aggregate(&self, query: AggregateQuery) -> StoreResult<Vec<GroupedRow>>;

    /// Most recent matching publications, newest first.
    async fn find_recent(&self, filter: RecordFilter, limit: usize)
        -> StoreResult<Vec<Publication>>;
}

/// Lookup over poll snapshots.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// The newest snapshot, if any exists.
    async fn latest_snapshot(&self) -> StoreResult<Option<PollSnapshot>>;

    /// The snapshot for an exact calendar day.
    async fn snapshot_on(&self, date: chrono::NaiveDate) -> StoreResult<Option<PollSnapshot>>;
}

/// Connection lifecycle notifications.
///
/// The store's bridge owns reconnection policy; the core only observes.
/// No ordering is guaranteed between a disconnect and the completion of
/// in-flight queries; those may fail independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "state", content = "detail")]
pub enum StoreLifecycle {
    Connected,
    Disconnected,
    Reconnected,
    ConnectionError(String),
}

/// A store exposing lifecycle notifications.
pub trait LifecycleSource {
    fn lifecycle(&self) -> broadcast::Receiver<StoreLifecycle>;
}

/// Decorator applying a per-call timeout to every store operation.
///
/// The source system issued unbounded queries; here a slow backend surfaces
/// as `StoreError::Timeout` and is handled like any other job failure.
pub struct TimedStore<S: ?Sized> {
    inner: std::sync::Arc<S>,
    timeout: std::time::Duration,
}

impl<S: ?Sized> TimedStore<S> {
    pub fn new(inner: std::sync::Arc<S>, timeout: std::time::Duration) -> Self {
        Self { inner, timeout }
    }

    async fn timed<T>(
        &self,
        fut: impl std::future::Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

#[async_trait]
impl<S: PublicationStore + ?Sized> PublicationStore for TimedStore<S> {
    async fn aggregate(&self, query: AggregateQuery) -> StoreResult<Vec<GroupedRow>> {
        self.timed(self.inner.aggregate(query)).await
    }

    async fn find_recent(
        &self,
        filter: RecordFilter,
        limit: usize,
    ) -> StoreResult<Vec<Publication>> {
        self.timed(self.inner.find_recent(filter, limit)).await
    }
}

#[async_trait]
impl<S: PollStore + ?Sized> PollStore for TimedStore<S> {
    async fn latest_snapshot(&self) -> StoreResult<Option<PollSnapshot>> {
        self.timed(self.inner.latest_snapshot()).await
    }

    async fn snapshot_on(&self, date: chrono::NaiveDate) -> StoreResult<Option<PollSnapshot>> {
        self.timed(self.inner.snapshot_on(date)).await
    }
}
