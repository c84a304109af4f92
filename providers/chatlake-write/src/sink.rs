//! Chatbot analytics sink
//!
//! Owns the schema gate and insert gateway for one dataset and maps chatbot
//! tracking data (session starts, tracking events) onto table rows.

use std::sync::Arc;

use chatlake_common::{
    rows::{session_batch, EventRows},
    BigQueryClient, ChatLakeConfig, InteractionContext, RemoteTableStore, Result, Row, RowBatch,
    SinkOptions, Topology, TrackingEvent, UserSession,
};
use chrono::{FixedOffset, Offset, Utc};
use tracing::{info, instrument};

use crate::gate::{GateStatus, SchemaGate};
use crate::gateway::InsertGateway;
use crate::reconciler::{ReconciliationReport, TopologyReconciler};

pub struct ChatLakeSink {
    topology: Arc<Topology>,
    gate: Arc<SchemaGate>,
    gateway: InsertGateway,
    options: SinkOptions,
    time_zone: FixedOffset,
}

impl ChatLakeSink {
    /// Sink writing to the configured BigQuery dataset
    pub fn from_config(config: &ChatLakeConfig, topology: Topology) -> Result<Self> {
        let store = BigQueryClient::new(config)?;
        let time_zone = config.time_zone()?;

        info!(
            instance_id = %config.instance_id,
            project = %config.project_id,
            dataset = %config.dataset,
            tables = topology.len(),
            "ChatLake sink configured"
        );

        Ok(Self::with_store(Arc::new(store), topology, config.sink_options())
            .with_time_zone(time_zone))
    }

    /// Sink over any remote table store
    pub fn with_store(
        store: Arc<dyn RemoteTableStore>,
        topology: Topology,
        options: SinkOptions,
    ) -> Self {
        let topology = Arc::new(topology);
        let reconciler = Arc::new(TopologyReconciler::new(
            store.clone(),
            topology.clone(),
            options.error_policy,
        ));
        let gate = Arc::new(SchemaGate::new(store, reconciler, options.schema_mode));
        let gateway = InsertGateway::new(gate.clone(), options.error_policy);

        Self {
            topology,
            gate,
            gateway,
            options,
            time_zone: Utc.fix(),
        }
    }

    /// Default offset of contexts created through [`ChatLakeSink::context`]
    pub fn with_time_zone(mut self, time_zone: FixedOffset) -> Self {
        self.time_zone = time_zone;
        self
    }

    /// Reconcile the topology ahead of the first write
    pub async fn pre_heat(&self) -> Result<()> {
        self.gate.pre_heat().await
    }

    /// Store handle, available once the topology has been reconciled
    pub async fn ready(&self) -> Result<Arc<dyn RemoteTableStore>> {
        self.gate.ready().await
    }

    /// Run reconciliation again on the next write, e.g. to create deferred views
    pub fn refresh_topology(&self) {
        self.gate.reset();
    }

    pub async fn insert(&self, table: &str, rows: &[Row]) -> Result<()> {
        self.gateway.insert(table, rows).await
    }

    pub async fn insert_batches(&self, batches: &[RowBatch]) -> Result<()> {
        self.gateway.insert_batches(batches).await
    }

    /// Interaction context in the sink's time zone
    pub fn context(
        &self,
        page_id: impl Into<String>,
        sender_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> InteractionContext {
        InteractionContext::new(page_id, sender_id, session_id).in_time_zone(self.time_zone)
    }

    /// Record the start of a user session
    #[instrument(skip_all, fields(session_id = %ctx.session_id))]
    pub async fn create_user_session(
        &self,
        ctx: &InteractionContext,
        session: &UserSession,
    ) -> Result<()> {
        let batch = session_batch(ctx, session)?;
        self.gateway.insert_batch(&batch).await
    }

    /// Store tracking events, conversation turns and plain events concurrently
    #[instrument(skip_all, fields(session_id = %ctx.session_id, events = events.len()))]
    pub async fn store_events(
        &self,
        ctx: &InteractionContext,
        events: &[TrackingEvent],
    ) -> Result<()> {
        let batches = EventRows::split(ctx, events).into_batches()?;
        self.gateway.insert_batches(&batches).await
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn options(&self) -> SinkOptions {
        self.options
    }

    pub fn gate_status(&self) -> GateStatus {
        self.gate.status()
    }

    pub fn last_report(&self) -> Option<ReconciliationReport> {
        self.gate.last_report()
    }
}
