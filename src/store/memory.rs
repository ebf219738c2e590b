use crate::{
    decoders::DomainEvent,
    store::{
        DeadLetter, EventRecord, NewEvent, NewOrder, NewTicket, OrderRecord, StoreError,
        SyncCursor, SyncStore, TicketRecord,
    },
    types::normalize_address,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    users: HashSet<String>,
    events: HashMap<(i64, String), EventRecord>,
    tickets: HashMap<(i64, String), TicketRecord>,
    orders: HashMap<(i64, String), OrderRecord>,
    cursors: HashMap<String, SyncCursor>,
    dead_letters: BTreeMap<i64, (DeadLetter, String)>,
    next_dead_letter: i64,
}

/// Process-local [`SyncStore`] with the same keying and idempotency rules as
/// the PostgreSQL store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    pub async fn has_user(&self, address: &str) -> bool {
        self.tables
            .lock()
            .await
            .users
            .contains(&normalize_address(address))
    }

    pub async fn event_count(&self) -> usize {
        self.tables.lock().await.events.len()
    }

    pub async fn ticket_count(&self) -> usize {
        self.tables.lock().await.tickets.len()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    pub async fn dead_letter_count(&self) -> usize {
        self.tables.lock().await.dead_letters.len()
    }
}

fn dead_letter_identity(chain_id: i64, event_kind: &str, dedup_key: &str) -> String {
    format!("{chain_id}:{event_kind}:{dedup_key}")
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_cursor(&self, contract_address: &str) -> Result<Option<SyncCursor>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .cursors
            .get(&normalize_address(contract_address))
            .cloned())
    }

    async fn upsert_cursor(
        &self,
        contract_address: &str,
        last_block_number: u64,
        synced_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = normalize_address(contract_address);
        let mut tables = self.tables.lock().await;
        let cursor = tables.cursors.entry(key.clone()).or_insert(SyncCursor {
            contract_address: key,
            last_block_number,
            synced_at,
        });
        cursor.last_block_number = cursor.last_block_number.max(last_block_number);
        cursor.synced_at = synced_at;
        Ok(())
    }

    async fn ensure_user(&self, address: &str) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .users
            .insert(normalize_address(address));
        Ok(())
    }

    async fn find_event(
        &self,
        chain_id: i64,
        contract_id: &str,
    ) -> Result<Option<EventRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .events
            .get(&(chain_id, contract_id.to_string()))
            .cloned())
    }

    async fn create_event_if_absent(&self, event: &NewEvent) -> Result<bool, StoreError> {
        let organizer = normalize_address(&event.organizer_address);
        let mut tables = self.tables.lock().await;
        if !tables.users.contains(&organizer) {
            return Err(StoreError::InvalidData(format!(
                "organizer {organizer} does not exist"
            )));
        }

        let key = (event.chain_id, event.contract_id.clone());
        if tables.events.contains_key(&key) {
            return Ok(false);
        }

        let record = EventRecord {
            id: Uuid::new_v4(),
            chain_id: event.chain_id,
            contract_id: event.contract_id.clone(),
            name: event.name.clone(),
            organizer_address: organizer,
        };
        tables.events.insert(key, record);
        Ok(true)
    }

    async fn find_ticket(
        &self,
        chain_id: i64,
        token_id: &str,
    ) -> Result<Option<TicketRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .get(&(chain_id, token_id.to_string()))
            .cloned())
    }

    async fn create_ticket_if_absent(&self, ticket: &NewTicket) -> Result<bool, StoreError> {
        let owner = normalize_address(&ticket.owner_address);
        let mut tables = self.tables.lock().await;
        if !tables.users.contains(&owner) {
            return Err(StoreError::InvalidData(format!(
                "owner {owner} does not exist"
            )));
        }

        let key = (ticket.chain_id, ticket.token_id.clone());
        if tables.tickets.contains_key(&key) {
            return Ok(false);
        }

        tables.tickets.insert(
            key,
            TicketRecord {
                id: Uuid::new_v4(),
                chain_id: ticket.chain_id,
                token_id: ticket.token_id.clone(),
                event_id: ticket.event_id,
                owner_address: owner,
            },
        );
        Ok(true)
    }

    async fn update_ticket_owner(
        &self,
        chain_id: i64,
        token_id: &str,
        owner_address: &str,
    ) -> Result<u64, StoreError> {
        let owner = normalize_address(owner_address);
        let mut tables = self.tables.lock().await;
        match tables.tickets.get_mut(&(chain_id, token_id.to_string())) {
            Some(ticket) => {
                ticket.owner_address = owner;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_order(
        &self,
        chain_id: i64,
        transaction_hash: &str,
    ) -> Result<Option<OrderRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .get(&(chain_id, transaction_hash.to_string()))
            .cloned())
    }

    async fn create_order_if_absent(&self, order: &NewOrder) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let key = (order.chain_id, order.transaction_hash.clone());
        if tables.orders.contains_key(&key) {
            return Ok(false);
        }

        tables.orders.insert(
            key,
            OrderRecord {
                id: Uuid::new_v4(),
                chain_id: order.chain_id,
                transaction_hash: order.transaction_hash.clone(),
                order_id: order.order_id.clone(),
                event_id: order.event_id,
            },
        );
        Ok(true)
    }

    async fn park_dead_letter(
        &self,
        chain_id: i64,
        contract_address: &str,
        event: &DomainEvent,
    ) -> Result<(), StoreError> {
        let identity = dead_letter_identity(chain_id, event.kind(), &event.dedup_key());
        let mut tables = self.tables.lock().await;
        if tables
            .dead_letters
            .values()
            .any(|(_, existing)| *existing == identity)
        {
            return Ok(());
        }

        tables.next_dead_letter += 1;
        let id = tables.next_dead_letter;
        tables.dead_letters.insert(
            id,
            (
                DeadLetter {
                    id,
                    chain_id,
                    contract_address: normalize_address(contract_address),
                    event: event.clone(),
                    attempts: 0,
                },
                identity,
            ),
        );
        Ok(())
    }

    async fn has_dead_letter(
        &self,
        chain_id: i64,
        event_kind: &str,
        dedup_key: &str,
    ) -> Result<bool, StoreError> {
        let identity = dead_letter_identity(chain_id, event_kind, dedup_key);
        let tables = self.tables.lock().await;
        Ok(tables
            .dead_letters
            .values()
            .any(|(_, existing)| *existing == identity))
    }

    async fn dead_letters(&self, chain_id: i64) -> Result<Vec<DeadLetter>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .dead_letters
            .values()
            .filter(|(letter, _)| letter.chain_id == chain_id)
            .map(|(letter, _)| letter.clone())
            .collect())
    }

    async fn resolve_dead_letter(&self, id: i64) -> Result<(), StoreError> {
        self.tables.lock().await.dead_letters.remove(&id);
        Ok(())
    }

    async fn bump_dead_letter(&self, id: i64) -> Result<(), StoreError> {
        if let Some((letter, _)) = self.tables.lock().await.dead_letters.get_mut(&id) {
            letter.attempts += 1;
        }
        Ok(())
    }
}
