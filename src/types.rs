use alloy::{hex, primitives::Address};
use serde::{Deserialize, Serialize};

/// Chains the sync engine is allowed to mirror.
pub const SUPPORTED_CHAIN_IDS: &[u64] = &[1, 11155111, 31337];

/// Payment token recorded for primary purchases paid in the native currency.
pub const NATIVE_PAYMENT_TOKEN: &str = "0x0000000000000000000000000000000000000000";

/// Kind of contract being watched. Pipelines are registered per category,
/// never per address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractCategory {
    /// Event registry, emits `EventCreated`.
    Registry,
    /// Ticket NFT, emits `TicketMinted` and `Transfer`.
    Issuance,
    /// Primary marketplace, emits `OrderCreated`.
    Marketplace,
    TokenSwap,
}

impl ContractCategory {
    pub fn name(&self) -> &str {
        match self {
            ContractCategory::Registry => "EventManager",
            ContractCategory::Issuance => "TicketManager",
            ContractCategory::Marketplace => "Marketplace",
            ContractCategory::TokenSwap => "TokenSwap",
        }
    }
}

impl std::fmt::Display for ContractCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A contract the orchestrator scans every pass. `address` is `None` when
/// the deployment address was not configured.
#[derive(Clone, Debug)]
pub struct WatchedContract {
    pub category: ContractCategory,
    pub address: Option<Address>,
}

impl WatchedContract {
    pub fn new(category: ContractCategory, address: Option<Address>) -> Self {
        Self { category, address }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Primary,
    Secondary,
}

impl OrderType {
    pub fn as_str(&self) -> &str {
        match self {
            OrderType::Primary => "PRIMARY",
            OrderType::Secondary => "SECONDARY",
        }
    }
}

/// Canonical textual form of a chain address: `0x` followed by lower-case hex.
pub fn address_key(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Lower-cases an address string so mixed-case input maps to the same user.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    format!("0x{}", body.to_ascii_lowercase())
}
