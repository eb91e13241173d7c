//! # Sync Job
//!
//! Runs one reconciliation pass as a background task and publishes its
//! state through a `watch` channel.
//!
//! ```text
//!   Idle ──start()──► Running ──┬──► Succeeded(report)
//!                     ▲         └──► Failed(message)
//!                     │                    │
//!                     └──── start() ◄──────┘
//!
//!   start() while Running ──► SyncError::AlreadyRunning
//! ```
//!
//! A run never resumes a previous one: every start loads fresh snapshots
//! (unless built from a fixed snapshot) and reconciles from scratch.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use shelf_db::IdentityRepository;

use crate::client::{PosCatalogClient, StorefrontCatalogClient};
use crate::engine::{ReconciliationContext, ReconciliationEngine, ReconciliationReport};
use crate::error::{SyncError, SyncResult};
use crate::snapshot::CatalogSnapshot;

/// Observable state of a [`SyncJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Succeeded(ReconciliationReport),
    Failed(String),
}

impl JobState {
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded(_) | JobState::Failed(_))
    }
}

#[derive(Debug, Clone)]
enum Source {
    Remote {
        pos: Arc<PosCatalogClient>,
        storefront: Arc<StorefrontCatalogClient>,
    },
    Fixed(Arc<CatalogSnapshot>),
}

/// The "synchronize" action.
#[derive(Debug, Clone)]
pub struct SyncJob {
    source: Source,
    identity: IdentityRepository,
    drift_detection: bool,
    state: Arc<watch::Sender<JobState>>,
}

impl SyncJob {
    /// A job that loads both catalogs on every start.
    pub fn new(
        pos: Arc<PosCatalogClient>,
        storefront: Arc<StorefrontCatalogClient>,
        identity: IdentityRepository,
    ) -> Self {
        Self::with_source(Source::Remote { pos, storefront }, identity)
    }

    /// A job that reconciles an already loaded snapshot.
    pub fn from_snapshot(snapshot: Arc<CatalogSnapshot>, identity: IdentityRepository) -> Self {
        Self::with_source(Source::Fixed(snapshot), identity)
    }

    fn with_source(source: Source, identity: IdentityRepository) -> Self {
        let (state, _) = watch::channel(JobState::Idle);
        SyncJob {
            source,
            identity,
            drift_detection: true,
            state: Arc::new(state),
        }
    }

    pub fn drift_detection(mut self, enabled: bool) -> Self {
        self.drift_detection = enabled;
        self
    }

    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }

    /// Starts a run in the background.
    ///
    /// ## Errors
    /// [`SyncError::AlreadyRunning`] while a previous run is in progress.
    pub fn start(&self) -> SyncResult<SyncJobHandle> {
        let claimed = self.state.send_if_modified(|state| {
            if state.is_running() {
                return false;
            }
            *state = JobState::Running;
            true
        });
        if !claimed {
            return Err(SyncError::AlreadyRunning);
        }

        info!(drift_detection = self.drift_detection, "Synchronization started");

        let source = self.source.clone();
        let identity = self.identity.clone();
        let drift_detection = self.drift_detection;
        let state = self.state.clone();

        let task = tokio::spawn(async move {
            // A panicking pass must still leave a terminal state behind.
            let outcome = match tokio::spawn(run_pass(source, identity, drift_detection)).await {
                Ok(outcome) => outcome,
                Err(join) => Err(SyncError::from(join)),
            };

            match &outcome {
                Ok(report) => {
                    info!(%report, "Synchronization succeeded");
                    state.send_replace(JobState::Succeeded(report.clone()));
                }
                Err(err) => {
                    error!(error = %err, transient = err.is_transient(), "Synchronization failed");
                    state.send_replace(JobState::Failed(err.to_string()));
                }
            }
            outcome
        });

        Ok(SyncJobHandle {
            state: self.state.subscribe(),
            task,
        })
    }
}

async fn run_pass(
    source: Source,
    identity: IdentityRepository,
    drift_detection: bool,
) -> SyncResult<ReconciliationReport> {
    let snapshot = match source {
        Source::Remote { pos, storefront } => Arc::new(CatalogSnapshot::load(pos, storefront).await?),
        Source::Fixed(snapshot) => snapshot,
    };
    let ctx = ReconciliationContext::new(snapshot, identity).with_drift_detection(drift_detection);
    ReconciliationEngine::run(&ctx).await
}

/// Handle on one started run.
#[derive(Debug)]
pub struct SyncJobHandle {
    state: watch::Receiver<JobState>,
    task: JoinHandle<SyncResult<ReconciliationReport>>,
}

impl SyncJobHandle {
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    /// Waits for the run to finish; the error keeps its original cause.
    pub async fn wait(self) -> SyncResult<ReconciliationReport> {
        self.task.await?
    }

    /// Runs `f` with the outcome once the run finishes, without blocking the caller.
    pub fn on_complete<F>(self, f: F) -> JoinHandle<()>
    where
        F: FnOnce(SyncResult<ReconciliationReport>) + Send + 'static,
    {
        tokio::spawn(async move { f(self.wait().await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::{StorefrontProduct, StorefrontVariant};
    use shelf_db::{Database, DbConfig};
    use tokio::sync::oneshot;

    fn snapshot(products: Vec<StorefrontProduct>) -> Arc<CatalogSnapshot> {
        Arc::new(CatalogSnapshot::from_parts(vec![], vec![], products).unwrap())
    }

    fn product(id: &str, barcode: &str) -> StorefrontProduct {
        StorefrontProduct::new(id, "Acme", "Yarn")
            .id(id)
            .variant(StorefrontVariant::new("Default", Some(barcode)))
    }

    #[tokio::test]
    async fn test_run_succeeds() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let job = SyncJob::from_snapshot(snapshot(vec![product("S1", "B1")]), db.identity());
        assert_eq!(job.state(), JobState::Idle);

        let handle = job.start().unwrap();
        assert!(job.state().is_running());

        let report = handle.wait().await.unwrap();
        assert_eq!(report.aggregates_created, 1);
        assert_eq!(job.state(), JobState::Succeeded(report));
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_running() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let job = SyncJob::from_snapshot(snapshot(vec![product("S1", "B1")]), db.identity());

        let first = job.start().unwrap();
        assert!(matches!(job.start(), Err(SyncError::AlreadyRunning)));

        first.wait().await.unwrap();
        let again = job.start().unwrap();
        assert_eq!(again.wait().await.unwrap().changes(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_published_with_message() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let job = SyncJob::from_snapshot(
            snapshot(vec![product("S1", "B1"), product("S2", "B1")]),
            db.identity(),
        );
        let mut states = job.subscribe();

        let (tx, rx) = oneshot::channel();
        job.start().unwrap().on_complete(move |outcome| {
            let _ = tx.send(outcome.is_err());
        });
        assert!(rx.await.unwrap());

        states.wait_for(JobState::is_terminal).await.unwrap();
        match job.state() {
            JobState::Failed(message) => assert!(message.contains("B1"), "{}", message),
            other => panic!("unexpected state: {:?}", other),
        }
    }
}
