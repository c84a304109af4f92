//! Schema gate
//!
//! Runs topology reconciliation at most once at a time per process and holds
//! writers back until it has settled. Concurrent callers share the single
//! in-flight attempt and all observe its outcome. A failed attempt resets
//! the gate so the next caller starts a fresh one.

use std::sync::Arc;

use chatlake_common::{ChatLakeError, RemoteTableStore, Result, SchemaMode};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{error, info};

use crate::reconciler::{ReconciliationReport, TopologyReconciler};

type PendingReconciliation =
    Shared<BoxFuture<'static, std::result::Result<ReconciliationReport, Arc<ChatLakeError>>>>;

enum Phase {
    Unstarted,
    InProgress {
        generation: u64,
        pending: PendingReconciliation,
    },
    Ready,
}

/// Observable state of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Unstarted,
    InProgress,
    Ready,
    /// Reconciliation disabled, the remote schema is trusted as-is
    Passive,
}

struct GateState {
    phase: Phase,
    /// Bumped for every started attempt so stale waiters cannot settle a newer one
    generation: u64,
    last_report: Option<ReconciliationReport>,
}

pub struct SchemaGate {
    store: Arc<dyn RemoteTableStore>,
    reconciler: Arc<TopologyReconciler>,
    schema_mode: SchemaMode,
    state: Mutex<GateState>,
}

impl SchemaGate {
    pub fn new(
        store: Arc<dyn RemoteTableStore>,
        reconciler: Arc<TopologyReconciler>,
        schema_mode: SchemaMode,
    ) -> Self {
        Self {
            store,
            reconciler,
            schema_mode,
            state: Mutex::new(GateState {
                phase: Phase::Unstarted,
                generation: 0,
                last_report: None,
            }),
        }
    }

    /// Store handle usable for writes, reconciling first if needed
    pub async fn ready(&self) -> Result<Arc<dyn RemoteTableStore>> {
        if self.schema_mode == SchemaMode::Passive {
            return Ok(self.store.clone());
        }

        let (generation, pending) = {
            let mut state = self.state.lock();
            let joined = match &state.phase {
                Phase::Ready => return Ok(self.store.clone()),
                Phase::InProgress {
                    generation,
                    pending,
                } => Some((*generation, pending.clone())),
                Phase::Unstarted => None,
            };
            match joined {
                Some(joined) => joined,
                None => self.begin(&mut state),
            }
        };

        let result = pending.await;
        self.settle(generation, &result);

        match result {
            Ok(_) => Ok(self.store.clone()),
            Err(err) => Err(ChatLakeError::Reconciliation(err)),
        }
    }

    /// Warm the gate ahead of the first write
    pub async fn pre_heat(&self) -> Result<()> {
        self.ready().await.map(|_| ())
    }

    pub fn status(&self) -> GateStatus {
        if self.schema_mode == SchemaMode::Passive {
            return GateStatus::Passive;
        }
        match self.state.lock().phase {
            Phase::Unstarted => GateStatus::Unstarted,
            Phase::InProgress { .. } => GateStatus::InProgress,
            Phase::Ready => GateStatus::Ready,
        }
    }

    /// Report of the most recent successful reconciliation
    pub fn last_report(&self) -> Option<ReconciliationReport> {
        self.state.lock().last_report.clone()
    }

    /// Forget a settled reconciliation so the next `ready()` runs another pass.
    /// An attempt already in flight is left alone.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if matches!(state.phase, Phase::Ready) {
            state.phase = Phase::Unstarted;
        }
    }

    fn begin(&self, state: &mut GateState) -> (u64, PendingReconciliation) {
        state.generation += 1;
        let generation = state.generation;

        let reconciler = self.reconciler.clone();
        let pending = async move { reconciler.run().await.map_err(Arc::new) }
            .boxed()
            .shared();

        state.phase = Phase::InProgress {
            generation,
            pending: pending.clone(),
        };
        (generation, pending)
    }

    /// Record the outcome of an attempt; only the first waiter of the current attempt transitions
    fn settle(
        &self,
        generation: u64,
        result: &std::result::Result<ReconciliationReport, Arc<ChatLakeError>>,
    ) {
        let mut state = self.state.lock();
        let current = matches!(
            state.phase,
            Phase::InProgress { generation: g, .. } if g == generation
        );
        if !current {
            return;
        }

        match result {
            Ok(report) => {
                info!(
                    created = report.created(),
                    updated = report.updated(),
                    unchanged = report.unchanged(),
                    deferred = report.deferred(),
                    failed = report.failed(),
                    "Topology ready"
                );
                state.phase = Phase::Ready;
                state.last_report = Some(report.clone());
            }
            Err(err) => {
                error!(error = %err, "Failed to create/update topology");
                state.phase = Phase::Unstarted;
            }
        }
    }
}
