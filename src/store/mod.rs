//! Relational store seam used by the projection writers and the cursor logic.
//!
//! [`SyncStore`] is implemented by [`postgres::PgStore`] in production and by
//! [`memory::MemoryStore`] where a database is not wanted. Both implement the
//! same "create if absent" and "update tolerating zero matches" semantics.

pub mod errors;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use uuid::Uuid;

pub use errors::StoreError;

use crate::{
    decoders::DomainEvent,
    types::{OrderStatus, OrderType},
};

/// High-water mark of a watched contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    pub contract_address: String,
    pub last_block_number: u64,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub chain_id: i64,
    pub contract_id: String,
    pub name: String,
    pub organizer_address: String,
    pub max_tickets: i64,
    pub ticket_price: BigDecimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub id: Uuid,
    pub chain_id: i64,
    pub contract_id: String,
    pub name: String,
    pub organizer_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub chain_id: i64,
    pub token_id: String,
    pub event_id: Uuid,
    pub seat_number: String,
    pub owner_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRecord {
    pub id: Uuid,
    pub chain_id: i64,
    pub token_id: String,
    pub event_id: Uuid,
    pub owner_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub chain_id: i64,
    pub transaction_hash: String,
    pub order_id: String,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: BigDecimal,
    pub payment_token: String,
    pub buyer_address: String,
    pub event_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub id: Uuid,
    pub chain_id: i64,
    pub transaction_hash: String,
    pub order_id: String,
    pub event_id: Uuid,
}

/// A decoded event parked because the event it references was not projected yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub id: i64,
    pub chain_id: i64,
    pub contract_address: String,
    pub event: DomainEvent,
    pub attempts: i32,
}

#[async_trait]
pub trait SyncStore: Send + Sync + Debug {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get_cursor(&self, contract_address: &str) -> Result<Option<SyncCursor>, StoreError>;

    /// Inserts or advances the cursor. A lower block than the stored one is
    /// ignored so the cursor never moves backwards.
    async fn upsert_cursor(
        &self,
        contract_address: &str,
        last_block_number: u64,
        synced_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Creates the user if no row exists for the lower-cased address.
    async fn ensure_user(&self, address: &str) -> Result<(), StoreError>;

    async fn find_event(
        &self,
        chain_id: i64,
        contract_id: &str,
    ) -> Result<Option<EventRecord>, StoreError>;

    /// Returns `true` when a row was created, `false` when one already existed.
    async fn create_event_if_absent(&self, event: &NewEvent) -> Result<bool, StoreError>;

    async fn find_ticket(
        &self,
        chain_id: i64,
        token_id: &str,
    ) -> Result<Option<TicketRecord>, StoreError>;

    async fn create_ticket_if_absent(&self, ticket: &NewTicket) -> Result<bool, StoreError>;

    /// Returns the number of rows updated; zero is not an error.
    async fn update_ticket_owner(
        &self,
        chain_id: i64,
        token_id: &str,
        owner_address: &str,
    ) -> Result<u64, StoreError>;

    async fn find_order(
        &self,
        chain_id: i64,
        transaction_hash: &str,
    ) -> Result<Option<OrderRecord>, StoreError>;

    async fn create_order_if_absent(&self, order: &NewOrder) -> Result<bool, StoreError>;

    /// Parks an event; parking the same event twice keeps a single entry.
    async fn park_dead_letter(
        &self,
        chain_id: i64,
        contract_address: &str,
        event: &DomainEvent,
    ) -> Result<(), StoreError>;

    /// Whether an event of `event_kind` with `dedup_key` is currently parked.
    async fn has_dead_letter(
        &self,
        chain_id: i64,
        event_kind: &str,
        dedup_key: &str,
    ) -> Result<bool, StoreError>;

    /// Parked events in the order they were parked.
    async fn dead_letters(&self, chain_id: i64) -> Result<Vec<DeadLetter>, StoreError>;

    async fn resolve_dead_letter(&self, id: i64) -> Result<(), StoreError>;

    async fn bump_dead_letter(&self, id: i64) -> Result<(), StoreError>;
}
