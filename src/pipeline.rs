//! Per-category sync pipelines.
//!
//! A pipeline names the log streams a contract category emits, decodes them
//! and hands the result to the projector. The orchestrator looks pipelines up
//! by [`ContractCategory`]; a category with no entry is skipped.

use crate::{
    chains::traits::RawLog,
    decoders::{self, DecodeError, DomainEvent},
    projection::{Projection, Projector},
    store::StoreError,
    types::ContractCategory,
};
use alloy::{primitives::B256, sol_types::SolEvent};
use async_trait::async_trait;
use std::{collections::HashMap, fmt::Debug, sync::Arc};

/// One event signature fetched from a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogStream {
    pub name: &'static str,
    pub signature: B256,
}

#[async_trait]
pub trait Pipeline: Send + Sync + Debug {
    /// Streams in the order their logs are projected.
    fn streams(&self) -> &[LogStream];

    fn decode(&self, log: &RawLog) -> Result<Option<DomainEvent>, DecodeError>;

    async fn project(
        &self,
        projector: &Projector,
        event: &DomainEvent,
    ) -> Result<Projection, StoreError> {
        projector.apply(event).await
    }
}

#[derive(Debug, Default)]
pub struct RegistryPipeline;

const REGISTRY_STREAMS: &[LogStream] = &[LogStream {
    name: "EventCreated",
    signature: decoders::abi::EventCreated::SIGNATURE_HASH,
}];

#[async_trait]
impl Pipeline for RegistryPipeline {
    fn streams(&self) -> &[LogStream] {
        REGISTRY_STREAMS
    }

    fn decode(&self, log: &RawLog) -> Result<Option<DomainEvent>, DecodeError> {
        decoders::registry::decode(log)
    }
}

#[derive(Debug, Default)]
pub struct IssuancePipeline;

const ISSUANCE_STREAMS: &[LogStream] = &[
    LogStream {
        name: "TicketMinted",
        signature: decoders::issuance::MINTED_SIGNATURE,
    },
    LogStream {
        name: "Transfer",
        signature: decoders::issuance::TRANSFER_SIGNATURE,
    },
];

#[async_trait]
impl Pipeline for IssuancePipeline {
    fn streams(&self) -> &[LogStream] {
        ISSUANCE_STREAMS
    }

    fn decode(&self, log: &RawLog) -> Result<Option<DomainEvent>, DecodeError> {
        decoders::issuance::decode(log)
    }
}

#[derive(Debug, Default)]
pub struct MarketplacePipeline;

const MARKETPLACE_STREAMS: &[LogStream] = &[LogStream {
    name: "OrderCreated",
    signature: decoders::abi::OrderCreated::SIGNATURE_HASH,
}];

#[async_trait]
impl Pipeline for MarketplacePipeline {
    fn streams(&self) -> &[LogStream] {
        MARKETPLACE_STREAMS
    }

    fn decode(&self, log: &RawLog) -> Result<Option<DomainEvent>, DecodeError> {
        decoders::marketplace::decode(log)
    }
}

/// Lookup from contract category to its pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineRegistry {
    pipelines: HashMap<ContractCategory, Arc<dyn Pipeline>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry, issuance and marketplace pipelines. Token swaps have none.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ContractCategory::Registry, Arc::new(RegistryPipeline));
        registry.register(ContractCategory::Issuance, Arc::new(IssuancePipeline));
        registry.register(ContractCategory::Marketplace, Arc::new(MarketplacePipeline));
        registry
    }

    pub fn register(&mut self, category: ContractCategory, pipeline: Arc<dyn Pipeline>) {
        self.pipelines.insert(category, pipeline);
    }

    pub fn get(&self, category: ContractCategory) -> Option<Arc<dyn Pipeline>> {
        self.pipelines.get(&category).cloned()
    }
}
