//! Pure log decoders, one per contract category.
//!
//! A decoder maps a [`RawLog`] to a typed [`DomainEvent`]. `Ok(None)` means the
//! log was recognised but carries nothing to project (mint-side transfers).

pub mod issuance;
pub mod marketplace;
pub mod registry;

use crate::chains::traits::RawLog;
use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

pub mod abi {
    use alloy::sol;

    sol! {
        #[derive(Debug, PartialEq, Eq)]
        event EventCreated(
            uint256 indexed eventId,
            address indexed organizer,
            string name,
            uint256 maxTickets,
            uint256 ticketPrice
        );

        #[derive(Debug, PartialEq, Eq)]
        event TicketMinted(
            uint256 indexed tokenId,
            uint256 indexed eventId,
            address indexed to,
            string seatNumber
        );

        #[derive(Debug, PartialEq, Eq)]
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

        #[derive(Debug, PartialEq, Eq)]
        event OrderCreated(
            bytes32 indexed orderId,
            address indexed buyer,
            uint256 indexed eventId,
            uint256 price
        );
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected log topic {0:?}")]
    UnexpectedTopic(Option<B256>),
    #[error("abi decode failed: {0}")]
    Abi(#[from] alloy::sol_types::Error),
    #[error("log is missing {0}")]
    MissingField(&'static str),
    #[error("{0} does not fit in 64 bits")]
    Overflow(&'static str),
}

/// Position of a log on chain, kept for logging and replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRef {
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub transaction_hash: Option<B256>,
}

impl LogRef {
    pub fn of(log: &RawLog) -> Self {
        Self {
            block_number: log.block_number,
            log_index: log.log_index,
            transaction_hash: log.transaction_hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCreated {
    pub event_id: U256,
    pub organizer: Address,
    pub name: String,
    pub max_tickets: u64,
    pub ticket_price: U256,
    pub log: LogRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMinted {
    pub token_id: U256,
    pub event_id: U256,
    pub owner: Address,
    pub seat_number: String,
    pub log: LogRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTransferred {
    pub token_id: U256,
    pub from: Address,
    pub to: Address,
    pub log: LogRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: B256,
    pub buyer: Address,
    pub event_id: U256,
    pub price: U256,
    pub transaction_hash: B256,
    pub log: LogRef,
}

/// A decoded chain event. Lives only between decode and projection, or in the
/// dead-letter table while its referenced event is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum DomainEvent {
    EventCreated(EventCreated),
    TicketMinted(TicketMinted),
    TicketTransferred(TicketTransferred),
    OrderCreated(OrderCreated),
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::EventCreated(_) => "EventCreated",
            DomainEvent::TicketMinted(_) => "TicketMinted",
            DomainEvent::TicketTransferred(_) => "TicketTransferred",
            DomainEvent::OrderCreated(_) => "OrderCreated",
        }
    }

    pub fn log(&self) -> &LogRef {
        match self {
            DomainEvent::EventCreated(e) => &e.log,
            DomainEvent::TicketMinted(e) => &e.log,
            DomainEvent::TicketTransferred(e) => &e.log,
            DomainEvent::OrderCreated(e) => &e.log,
        }
    }

    /// Identity of the row this event creates or mutates.
    pub fn dedup_key(&self) -> String {
        match self {
            DomainEvent::EventCreated(e) => e.event_id.to_string(),
            DomainEvent::TicketMinted(e) => e.token_id.to_string(),
            DomainEvent::TicketTransferred(e) => format!(
                "{}:{}",
                e.token_id,
                e.log.transaction_hash.unwrap_or_default()
            ),
            DomainEvent::OrderCreated(e) => e.transaction_hash.to_string(),
        }
    }
}

pub(crate) fn expect_topic(log: &RawLog, expected: &[B256]) -> Result<B256, DecodeError> {
    match log.topics().first() {
        Some(topic) if expected.contains(topic) => Ok(*topic),
        other => Err(DecodeError::UnexpectedTopic(other.copied())),
    }
}

pub(crate) fn to_u64(value: U256, field: &'static str) -> Result<u64, DecodeError> {
    u64::try_from(value).map_err(|_| DecodeError::Overflow(field))
}
