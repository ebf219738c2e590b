//! Sync orchestrator.
//!
//! Every pass walks the watched contracts in order. For each one it computes
//! the block range after its cursor, fetches every stream of the category's
//! pipeline, decodes and projects the logs, and only then advances the cursor.
//! A failing contract is reported and left for the next pass; the others
//! carry on.

use crate::{
    chains::traits::{ChainError, ChainReader, RawLog},
    cursor::BlockRange,
    pipeline::{Pipeline, PipelineRegistry},
    projection::Projector,
    store::{StoreError, SyncStore},
    types::{ContractCategory, WatchedContract, address_key},
};
use alloy::primitives::Address;
use anyhow::Result;
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Retries after which a parked event is reported as unlikely to resolve.
pub const STALE_DEAD_LETTER_ATTEMPTS: i32 = 10;

/// Failure that abandons one contract for the current pass.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Counters for one scanned range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeSummary {
    pub from: u64,
    pub to: u64,
    /// Logs returned by the node across all streams.
    pub logs: usize,
    /// Logs whose projection wrote or confirmed a row.
    pub projected: usize,
    /// Logs parked because their event is not projected yet.
    pub deferred: usize,
    /// Logs that failed to decode or project.
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractOutcome {
    Synced(RangeSummary),
    UpToDate,
    NotConfigured,
    Unsupported,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ContractReport {
    pub category: ContractCategory,
    pub address: Option<Address>,
    pub outcome: ContractOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeadLetterSummary {
    pub retried: usize,
    pub resolved: usize,
    /// Still parked after [`STALE_DEAD_LETTER_ATTEMPTS`] retries.
    pub stale: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub dead_letters: DeadLetterSummary,
    pub contracts: Vec<ContractReport>,
}

impl PassReport {
    pub fn outcome(&self, category: ContractCategory) -> Option<&ContractOutcome> {
        self.contracts
            .iter()
            .find(|report| report.category == category)
            .map(|report| &report.outcome)
    }

    pub fn failed(&self) -> usize {
        self.contracts
            .iter()
            .filter(|report| matches!(report.outcome, ContractOutcome::Failed(_)))
            .count()
    }
}

pub struct SyncServiceBuilder {
    reader: Option<Arc<dyn ChainReader>>,
    store: Option<Arc<dyn SyncStore>>,
    pipelines: PipelineRegistry,
    contracts: Vec<WatchedContract>,
    interval: Duration,
    chain_id: Option<u64>,
}

impl Default for SyncServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncServiceBuilder {
    pub fn new() -> Self {
        Self {
            reader: None,
            store: None,
            pipelines: PipelineRegistry::with_defaults(),
            contracts: Vec::new(),
            interval: DEFAULT_SYNC_INTERVAL,
            chain_id: None,
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn ChainReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SyncStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the default pipelines.
    pub fn with_pipelines(mut self, pipelines: PipelineRegistry) -> Self {
        self.pipelines = pipelines;
        self
    }

    /// Contracts are scanned in the order they are added.
    pub fn add_contract(mut self, contract: WatchedContract) -> Self {
        self.contracts.push(contract);
        self
    }

    pub fn with_contracts(mut self, contracts: impl IntoIterator<Item = WatchedContract>) -> Self {
        self.contracts.extend(contracts);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn build(self) -> Result<SyncService> {
        let reader = self
            .reader
            .ok_or(anyhow::anyhow!("Chain reader must be set"))?;
        let store = self.store.ok_or(anyhow::anyhow!("Store must be set"))?;
        let chain_id = self.chain_id.ok_or(anyhow::anyhow!("Chain id must be set"))?;
        let chain_id = i64::try_from(chain_id)?;

        if self.interval.is_zero() {
            return Err(anyhow::anyhow!("Sync interval must be greater than zero"));
        }

        Ok(SyncService {
            projector: Projector::new(store.clone(), chain_id),
            reader,
            store,
            pipelines: self.pipelines,
            contracts: self.contracts,
            interval: self.interval,
            chain_id,
            pass_lock: Mutex::new(()),
        })
    }
}

pub struct SyncService {
    reader: Arc<dyn ChainReader>,
    store: Arc<dyn SyncStore>,
    projector: Projector,
    pipelines: PipelineRegistry,
    contracts: Vec<WatchedContract>,
    interval: Duration,
    chain_id: i64,
    pass_lock: Mutex<()>,
}

impl SyncService {
    pub fn builder() -> SyncServiceBuilder {
        SyncServiceBuilder::new()
    }

    /// Spawns the polling loop: one pass immediately, then one per interval.
    /// A pass that overruns the interval delays the next tick instead of
    /// stacking passes.
    pub fn start(self) -> SyncHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let service = self;

        let task = tokio::spawn(async move {
            info!(
                contracts = service.contracts.len(),
                interval = ?service.interval,
                "Starting sync service"
            );
            let mut ticker = interval(service.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        service.run_pass().await;
                    }
                }
            }
            info!("Sync service stopped");
        });

        SyncHandle { cancel, task }
    }

    /// Runs one full pass. Passes are serialized: a concurrent call waits for
    /// the running one.
    pub async fn run_pass(&self) -> PassReport {
        let _guard = self.pass_lock.lock().await;

        let dead_letters = self.retry_dead_letters().await;
        let mut contracts = Vec::with_capacity(self.contracts.len());

        for contract in &self.contracts {
            let outcome = match self.sync_contract(contract).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        category = %contract.category,
                        contract = ?contract.address,
                        error = %e,
                        "Contract sync failed, cursor left unchanged"
                    );
                    ContractOutcome::Failed(e.to_string())
                }
            };
            contracts.push(ContractReport {
                category: contract.category,
                address: contract.address,
                outcome,
            });
        }

        let report = PassReport {
            dead_letters,
            contracts,
        };
        info!(
            contracts = report.contracts.len(),
            failed = report.failed(),
            dead_letters_retried = report.dead_letters.retried,
            dead_letters_resolved = report.dead_letters.resolved,
            dead_letters_stale = report.dead_letters.stale,
            "Sync pass finished"
        );
        report
    }

    async fn sync_contract(&self, contract: &WatchedContract) -> Result<ContractOutcome, SyncError> {
        let Some(address) = contract.address else {
            debug!(category = %contract.category, "Contract address not configured, skipping");
            return Ok(ContractOutcome::NotConfigured);
        };
        let Some(pipeline) = self.pipelines.get(contract.category) else {
            warn!(
                category = %contract.category,
                contract = %address,
                "No pipeline registered for category, skipping"
            );
            return Ok(ContractOutcome::Unsupported);
        };

        let key = address_key(&address);
        let cursor = self.store.get_cursor(&key).await?;
        let head = self.reader.current_height().await?;
        let range = BlockRange::after(cursor.as_ref(), head);

        if range.is_empty() {
            debug!(
                category = %contract.category,
                contract = %key,
                head,
                "No new blocks"
            );
            return Ok(ContractOutcome::UpToDate);
        }

        // Every stream is fetched before anything is projected, so a fetch
        // failure leaves the range untouched.
        let mut batches: Vec<Vec<RawLog>> = Vec::with_capacity(pipeline.streams().len());
        for stream in pipeline.streams() {
            let logs = self
                .reader
                .get_logs(address, stream.signature, range.from, range.to)
                .await?;
            debug!(
                contract = %key,
                stream = stream.name,
                from_block = range.from,
                to_block = range.to,
                logs = logs.len(),
                "Fetched logs"
            );
            batches.push(logs);
        }

        let mut summary = RangeSummary {
            from: range.from,
            to: range.to,
            ..Default::default()
        };
        for logs in &batches {
            for log in logs {
                summary.logs += 1;
                self.process_log(pipeline.as_ref(), &key, log, &mut summary)
                    .await;
            }
        }

        self.store
            .upsert_cursor(&key, range.to, Utc::now())
            .await?;

        info!(
            category = %contract.category,
            contract = %key,
            from_block = summary.from,
            to_block = summary.to,
            logs = summary.logs,
            projected = summary.projected,
            deferred = summary.deferred,
            failed = summary.failed,
            "Synced contract"
        );
        Ok(ContractOutcome::Synced(summary))
    }

    async fn process_log(
        &self,
        pipeline: &dyn Pipeline,
        contract: &str,
        log: &RawLog,
        summary: &mut RangeSummary,
    ) {
        let event = match pipeline.decode(log) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                error!(
                    contract,
                    block = ?log.block_number,
                    log_index = ?log.log_index,
                    tx_hash = ?log.transaction_hash,
                    error = %e,
                    "Failed to decode log"
                );
                summary.failed += 1;
                return;
            }
        };

        match pipeline.project(&self.projector, &event).await {
            Ok(projection) if projection.is_deferred() => {
                match self
                    .store
                    .park_dead_letter(self.chain_id, contract, &event)
                    .await
                {
                    Ok(()) => summary.deferred += 1,
                    Err(e) => {
                        error!(contract, kind = event.kind(), error = %e, "Failed to park log");
                        summary.failed += 1;
                    }
                }
            }
            Ok(_) => summary.projected += 1,
            Err(e) => {
                error!(
                    contract,
                    kind = event.kind(),
                    block = ?log.block_number,
                    tx_hash = ?log.transaction_hash,
                    error = %e,
                    "Failed to project log"
                );
                summary.failed += 1;
            }
        }
    }

    /// Re-projects parked logs whose event may have arrived since.
    async fn retry_dead_letters(&self) -> DeadLetterSummary {
        let mut summary = DeadLetterSummary::default();
        let letters = match self.store.dead_letters(self.chain_id).await {
            Ok(letters) => letters,
            Err(e) => {
                error!(error = %e, "Failed to load dead letters");
                return summary;
            }
        };

        for letter in letters {
            summary.retried += 1;
            let result = match self.projector.apply(&letter.event).await {
                Ok(projection) if projection.is_deferred() => {
                    let attempts = letter.attempts.saturating_add(1);
                    if attempts >= STALE_DEAD_LETTER_ATTEMPTS {
                        summary.stale += 1;
                    }
                    if attempts == STALE_DEAD_LETTER_ATTEMPTS {
                        warn!(
                            id = letter.id,
                            kind = letter.event.kind(),
                            key = %letter.event.dedup_key(),
                            contract = %letter.contract_address,
                            block = ?letter.event.log().block_number,
                            tx_hash = ?letter.event.log().transaction_hash,
                            attempts,
                            "Dead letter still unresolved"
                        );
                    }
                    self.store.bump_dead_letter(letter.id).await
                }
                Ok(_) => {
                    summary.resolved += 1;
                    info!(
                        id = letter.id,
                        kind = letter.event.kind(),
                        key = %letter.event.dedup_key(),
                        "Resolved dead letter"
                    );
                    self.store.resolve_dead_letter(letter.id).await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                error!(
                    id = letter.id,
                    kind = letter.event.kind(),
                    block = ?letter.event.log().block_number,
                    error = %e,
                    "Dead letter retry failed"
                );
            }
        }

        summary
    }
}

/// Handle to a running [`SyncService`].
pub struct SyncHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Cancels the schedule and waits for an in-flight pass to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Sync task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
