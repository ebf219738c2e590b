//! Projection writers: apply decoded chain events to the store.
//!
//! Every writer is an idempotent upsert keyed by the on-chain identity of the
//! row it touches, so replaying a range after a crash leaves the same state.

use crate::{
    decoders::{DomainEvent, EventCreated, OrderCreated, TicketMinted, TicketTransferred},
    store::{NewEvent, NewOrder, NewTicket, StoreError, SyncStore},
    types::{NATIVE_PAYMENT_TOKEN, OrderStatus, OrderType, address_key},
};
use alloy::primitives::U256;
use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use std::{str::FromStr, sync::Arc};
use tracing::{debug, info, warn};

/// Default listing window applied to new events; the creation log carries no
/// schedule.
const DEFAULT_EVENT_DURATION_DAYS: i64 = 7;

/// Dead-letter kind of a parked mint, keyed by token id.
const MINT_KIND: &str = "TicketMinted";

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Created,
    /// The row already existed; nothing was written.
    AlreadyApplied,
    /// Rows matched by an update. Zero means the target does not exist.
    Updated(u64),
    /// The referenced event has not been projected yet.
    MissingEvent { event_id: String },
    /// Transfer of a token whose mint is parked; applying it now would be
    /// lost once the mint replays.
    MissingTicket { token_id: String },
}

impl Projection {
    /// Whether the event must be parked and replayed later.
    pub fn is_deferred(&self) -> bool {
        matches!(
            self,
            Projection::MissingEvent { .. } | Projection::MissingTicket { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct Projector {
    store: Arc<dyn SyncStore>,
    chain_id: i64,
}

impl Projector {
    pub fn new(store: Arc<dyn SyncStore>, chain_id: i64) -> Self {
        Self { store, chain_id }
    }

    pub async fn apply(&self, event: &DomainEvent) -> Result<Projection, StoreError> {
        match event {
            DomainEvent::EventCreated(e) => self.event_created(e).await,
            DomainEvent::TicketMinted(e) => self.ticket_minted(e).await,
            DomainEvent::TicketTransferred(e) => self.ticket_transferred(e).await,
            DomainEvent::OrderCreated(e) => self.order_created(e).await,
        }
    }

    async fn event_created(&self, e: &EventCreated) -> Result<Projection, StoreError> {
        let organizer = address_key(&e.organizer);
        self.store.ensure_user(&organizer).await?;

        let now = Utc::now();
        let created = self
            .store
            .create_event_if_absent(&NewEvent {
                chain_id: self.chain_id,
                contract_id: e.event_id.to_string(),
                name: e.name.clone(),
                organizer_address: organizer,
                max_tickets: i64::try_from(e.max_tickets).map_err(|_| {
                    StoreError::InvalidData(format!("maxTickets {} exceeds BIGINT", e.max_tickets))
                })?,
                ticket_price: to_decimal(&e.ticket_price)?,
                start_time: now,
                end_time: now + Duration::days(DEFAULT_EVENT_DURATION_DAYS),
            })
            .await?;

        if !created {
            debug!(event_id = %e.event_id, "Event already projected");
            return Ok(Projection::AlreadyApplied);
        }

        info!(event_id = %e.event_id, name = %e.name, "Created event");
        Ok(Projection::Created)
    }

    async fn ticket_minted(&self, e: &TicketMinted) -> Result<Projection, StoreError> {
        let owner = address_key(&e.owner);
        self.store.ensure_user(&owner).await?;

        let event_id = e.event_id.to_string();
        let Some(event) = self.store.find_event(self.chain_id, &event_id).await? else {
            warn!(
                token_id = %e.token_id,
                event_id = %event_id,
                "Mint references unknown event, deferring"
            );
            return Ok(Projection::MissingEvent { event_id });
        };

        let created = self
            .store
            .create_ticket_if_absent(&NewTicket {
                chain_id: self.chain_id,
                token_id: e.token_id.to_string(),
                event_id: event.id,
                seat_number: e.seat_number.clone(),
                owner_address: owner,
            })
            .await?;

        if !created {
            debug!(token_id = %e.token_id, "Ticket already projected");
            return Ok(Projection::AlreadyApplied);
        }

        info!(token_id = %e.token_id, event_id = %event_id, "Created ticket");
        Ok(Projection::Created)
    }

    async fn ticket_transferred(&self, e: &TicketTransferred) -> Result<Projection, StoreError> {
        let new_owner = address_key(&e.to);
        self.store.ensure_user(&new_owner).await?;

        let token_id = e.token_id.to_string();
        let rows = self
            .store
            .update_ticket_owner(self.chain_id, &token_id, &new_owner)
            .await?;

        if rows == 0 {
            let mint_parked = self
                .store
                .has_dead_letter(self.chain_id, MINT_KIND, &token_id)
                .await?;
            if mint_parked {
                warn!(token_id = %token_id, "Transfer of a ticket whose mint is deferred");
                return Ok(Projection::MissingTicket { token_id });
            }
            debug!(token_id = %token_id, "Transfer for unknown ticket");
        } else {
            info!(
                token_id = %e.token_id,
                from = %address_key(&e.from),
                to = %new_owner,
                "Transferred ticket"
            );
        }

        Ok(Projection::Updated(rows))
    }

    async fn order_created(&self, e: &OrderCreated) -> Result<Projection, StoreError> {
        let buyer = address_key(&e.buyer);
        self.store.ensure_user(&buyer).await?;

        let event_id = e.event_id.to_string();
        let Some(event) = self.store.find_event(self.chain_id, &event_id).await? else {
            warn!(
                order_id = %e.order_id,
                event_id = %event_id,
                "Order references unknown event, deferring"
            );
            return Ok(Projection::MissingEvent { event_id });
        };

        let transaction_hash = e.transaction_hash.to_string();
        let order_id = e.order_id.to_string();

        if let Some(existing) = self
            .store
            .find_order(self.chain_id, &transaction_hash)
            .await?
        {
            if existing.order_id != order_id {
                warn!(
                    tx_hash = %transaction_hash,
                    stored_order_id = %existing.order_id,
                    order_id = %order_id,
                    "Transaction already holds a different order"
                );
            }
            return Ok(Projection::AlreadyApplied);
        }

        let created = self
            .store
            .create_order_if_absent(&NewOrder {
                chain_id: self.chain_id,
                transaction_hash: transaction_hash.clone(),
                order_id: order_id.clone(),
                order_type: OrderType::Primary,
                status: OrderStatus::Confirmed,
                price: to_decimal(&e.price)?,
                payment_token: NATIVE_PAYMENT_TOKEN.to_string(),
                buyer_address: buyer,
                event_id: event.id,
            })
            .await?;

        if !created {
            return Ok(Projection::AlreadyApplied);
        }

        info!(order_id = %order_id, event_id = %event_id, tx_hash = %transaction_hash, "Created order");
        Ok(Projection::Created)
    }
}

fn to_decimal(value: &U256) -> Result<BigDecimal, StoreError> {
    BigDecimal::from_str(&value.to_string())
        .map_err(|e| StoreError::InvalidData(format!("amount {value}: {e}")))
}
