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
use sqlx::{Pool, Postgres, postgres::PgPoolOptions};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        address VARCHAR(42) PRIMARY KEY,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id UUID PRIMARY KEY,
        chain_id BIGINT NOT NULL,
        contract_id VARCHAR(78) NOT NULL,
        name TEXT NOT NULL,
        organizer_address VARCHAR(42) NOT NULL REFERENCES users(address),
        max_tickets BIGINT NOT NULL,
        ticket_price NUMERIC(78, 0) NOT NULL,
        start_time TIMESTAMP WITH TIME ZONE NOT NULL,
        end_time TIMESTAMP WITH TIME ZONE NOT NULL,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        UNIQUE (chain_id, contract_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tickets (
        id UUID PRIMARY KEY,
        chain_id BIGINT NOT NULL,
        token_id VARCHAR(78) NOT NULL,
        event_id UUID NOT NULL REFERENCES events(id),
        seat_number TEXT NOT NULL,
        owner_address VARCHAR(42) NOT NULL REFERENCES users(address),
        is_used BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        UNIQUE (chain_id, token_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        chain_id BIGINT NOT NULL,
        transaction_hash VARCHAR(66) NOT NULL,
        order_id VARCHAR(66) NOT NULL,
        order_type VARCHAR(16) NOT NULL,
        status VARCHAR(16) NOT NULL,
        price NUMERIC(78, 0) NOT NULL,
        payment_token VARCHAR(42) NOT NULL,
        buyer_address VARCHAR(42) NOT NULL REFERENCES users(address),
        event_id UUID NOT NULL REFERENCES events(id),
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        UNIQUE (chain_id, transaction_hash)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS blockchain_sync (
        contract_address VARCHAR(42) PRIMARY KEY,
        last_block_number BIGINT NOT NULL,
        synced_at TIMESTAMP WITH TIME ZONE NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sync_dead_letters (
        id BIGSERIAL PRIMARY KEY,
        chain_id BIGINT NOT NULL,
        contract_address VARCHAR(42) NOT NULL,
        event_kind VARCHAR(32) NOT NULL,
        dedup_key TEXT NOT NULL,
        payload JSONB NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        first_seen_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        last_attempt_at TIMESTAMP WITH TIME ZONE,
        UNIQUE (chain_id, event_kind, dedup_key)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tickets_owner ON tickets(owner_address)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_event ON tickets(event_id)",
    "CREATE INDEX IF NOT EXISTS idx_orders_buyer ON orders(buyer_address)",
    "CREATE INDEX IF NOT EXISTS idx_orders_event ON orders(event_id)",
];

/// PostgreSQL-backed [`SyncStore`].
#[derive(Clone, Debug)]
pub struct PgStore {
    pub pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        PgStore { pool }
    }

    pub async fn from_db_url(db_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Creates the synced tables and their indexes if missing.
    pub async fn create_tables(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn to_i64(value: u64, field: &str) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{field} {value} exceeds BIGINT")))
}

#[async_trait]
impl SyncStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_cursor(&self, contract_address: &str) -> Result<Option<SyncCursor>, StoreError> {
        let row = sqlx::query_as::<_, (String, i64, DateTime<Utc>)>(
            "SELECT contract_address, last_block_number, synced_at \
             FROM blockchain_sync WHERE contract_address = $1",
        )
        .bind(normalize_address(contract_address))
        .fetch_optional(&self.pool)
        .await?;

        let Some((contract_address, last_block_number, synced_at)) = row else {
            return Ok(None);
        };
        let last_block_number = u64::try_from(last_block_number).map_err(|_| {
            StoreError::InvalidData(format!(
                "negative cursor {last_block_number} for {contract_address}"
            ))
        })?;

        Ok(Some(SyncCursor {
            contract_address,
            last_block_number,
            synced_at,
        }))
    }

    async fn upsert_cursor(
        &self,
        contract_address: &str,
        last_block_number: u64,
        synced_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO blockchain_sync (contract_address, last_block_number, synced_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (contract_address) DO UPDATE
            SET last_block_number = GREATEST(blockchain_sync.last_block_number, EXCLUDED.last_block_number),
                synced_at = EXCLUDED.synced_at
            "#,
        )
        .bind(normalize_address(contract_address))
        .bind(to_i64(last_block_number, "last_block_number")?)
        .bind(synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ensure_user(&self, address: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (address) VALUES ($1) ON CONFLICT (address) DO NOTHING")
            .bind(normalize_address(address))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_event(
        &self,
        chain_id: i64,
        contract_id: &str,
    ) -> Result<Option<EventRecord>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, i64, String, String, String)>(
            "SELECT id, chain_id, contract_id, name, organizer_address \
             FROM events WHERE chain_id = $1 AND contract_id = $2",
        )
        .bind(chain_id)
        .bind(contract_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, chain_id, contract_id, name, organizer_address)| EventRecord {
                id,
                chain_id,
                contract_id,
                name,
                organizer_address,
            },
        ))
    }

    async fn create_event_if_absent(&self, event: &NewEvent) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO events
                (id, chain_id, contract_id, name, organizer_address, max_tickets, ticket_price, start_time, end_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (chain_id, contract_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.chain_id)
        .bind(&event.contract_id)
        .bind(&event.name)
        .bind(normalize_address(&event.organizer_address))
        .bind(event.max_tickets)
        .bind(&event.ticket_price)
        .bind(event.start_time)
        .bind(event.end_time)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_ticket(
        &self,
        chain_id: i64,
        token_id: &str,
    ) -> Result<Option<TicketRecord>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, i64, String, Uuid, String)>(
            "SELECT id, chain_id, token_id, event_id, owner_address \
             FROM tickets WHERE chain_id = $1 AND token_id = $2",
        )
        .bind(chain_id)
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, chain_id, token_id, event_id, owner_address)| TicketRecord {
                id,
                chain_id,
                token_id,
                event_id,
                owner_address,
            },
        ))
    }

    async fn create_ticket_if_absent(&self, ticket: &NewTicket) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO tickets (id, chain_id, token_id, event_id, seat_number, owner_address)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (chain_id, token_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ticket.chain_id)
        .bind(&ticket.token_id)
        .bind(ticket.event_id)
        .bind(&ticket.seat_number)
        .bind(normalize_address(&ticket.owner_address))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_ticket_owner(
        &self,
        chain_id: i64,
        token_id: &str,
        owner_address: &str,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET owner_address = $1, updated_at = NOW()
            WHERE chain_id = $2 AND token_id = $3
            "#,
        )
        .bind(normalize_address(owner_address))
        .bind(chain_id)
        .bind(token_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_order(
        &self,
        chain_id: i64,
        transaction_hash: &str,
    ) -> Result<Option<OrderRecord>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, i64, String, String, Uuid)>(
            "SELECT id, chain_id, transaction_hash, order_id, event_id \
             FROM orders WHERE chain_id = $1 AND transaction_hash = $2",
        )
        .bind(chain_id)
        .bind(transaction_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, chain_id, transaction_hash, order_id, event_id)| OrderRecord {
                id,
                chain_id,
                transaction_hash,
                order_id,
                event_id,
            },
        ))
    }

    async fn create_order_if_absent(&self, order: &NewOrder) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders
                (id, chain_id, transaction_hash, order_id, order_type, status, price, payment_token, buyer_address, event_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (chain_id, transaction_hash) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order.chain_id)
        .bind(&order.transaction_hash)
        .bind(&order.order_id)
        .bind(order.order_type.as_str())
        .bind(order.status.as_str())
        .bind(&order.price)
        .bind(&order.payment_token)
        .bind(normalize_address(&order.buyer_address))
        .bind(order.event_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn park_dead_letter(
        &self,
        chain_id: i64,
        contract_address: &str,
        event: &DomainEvent,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_value(event)?;

        let result = sqlx::query(
            r#"
            INSERT INTO sync_dead_letters (chain_id, contract_address, event_kind, dedup_key, payload)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (chain_id, event_kind, dedup_key) DO NOTHING
            "#,
        )
        .bind(chain_id)
        .bind(normalize_address(contract_address))
        .bind(event.kind())
        .bind(event.dedup_key())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(
                kind = event.kind(),
                key = %event.dedup_key(),
                "Dead letter already parked"
            );
        }

        Ok(())
    }

    async fn has_dead_letter(
        &self,
        chain_id: i64,
        event_kind: &str,
        dedup_key: &str,
    ) -> Result<bool, StoreError> {
        let parked: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM sync_dead_letters \
             WHERE chain_id = $1 AND event_kind = $2 AND dedup_key = $3)",
        )
        .bind(chain_id)
        .bind(event_kind)
        .bind(dedup_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(parked)
    }

    async fn dead_letters(&self, chain_id: i64) -> Result<Vec<DeadLetter>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, i64, String, serde_json::Value, i32)>(
            "SELECT id, chain_id, contract_address, payload, attempts \
             FROM sync_dead_letters WHERE chain_id = $1 ORDER BY id",
        )
        .bind(chain_id)
        .fetch_all(&self.pool)
        .await?;

        let mut letters = Vec::with_capacity(rows.len());
        for (id, chain_id, contract_address, payload, attempts) in rows {
            letters.push(DeadLetter {
                id,
                chain_id,
                contract_address,
                event: serde_json::from_value(payload)?,
                attempts,
            });
        }

        Ok(letters)
    }

    async fn resolve_dead_letter(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sync_dead_letters WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn bump_dead_letter(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE sync_dead_letters SET attempts = attempts + 1, last_attempt_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderStatus, OrderType};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    const CHAIN_ID: i64 = 31337;

    async fn connect() -> anyhow::Result<PgStore> {
        let db_url = std::env::var("DATABASE_URL")?;
        let store = PgStore::from_db_url(&db_url, 2).await?;
        for table in [
            "sync_dead_letters",
            "blockchain_sync",
            "orders",
            "tickets",
            "events",
            "users",
        ] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&store.pool)
                .await?;
        }
        store.create_tables().await?;
        Ok(store)
    }

    fn new_event(contract_id: &str) -> NewEvent {
        let now = Utc::now();
        NewEvent {
            chain_id: CHAIN_ID,
            contract_id: contract_id.to_string(),
            name: "Launch Party".to_string(),
            organizer_address: "0xABC0000000000000000000000000000000000001".to_string(),
            max_tickets: 1000,
            ticket_price: BigDecimal::from_str("10000000000000000").unwrap(),
            start_time: now,
            end_time: now + chrono::Duration::days(7),
        }
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a scratch PostgreSQL database"]
    async fn test_postgres_idempotent_writes() -> anyhow::Result<()> {
        let store = connect().await?;
        let event = new_event("1");

        store.ensure_user(&event.organizer_address).await?;
        store
            .ensure_user("0xabc0000000000000000000000000000000000001")
            .await?;
        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&store.pool)
            .await?;
        assert_eq!(users, 1);

        assert!(store.create_event_if_absent(&event).await?);
        assert!(!store.create_event_if_absent(&event).await?);
        let stored = store.find_event(CHAIN_ID, "1").await?.unwrap();
        assert_eq!(
            stored.organizer_address,
            "0xabc0000000000000000000000000000000000001"
        );

        let ticket = NewTicket {
            chain_id: CHAIN_ID,
            token_id: "12".to_string(),
            event_id: stored.id,
            seat_number: "A-1".to_string(),
            owner_address: stored.organizer_address.clone(),
        };
        assert!(store.create_ticket_if_absent(&ticket).await?);
        assert!(!store.create_ticket_if_absent(&ticket).await?);
        assert_eq!(
            store
                .update_ticket_owner(CHAIN_ID, "999", &stored.organizer_address)
                .await?,
            0
        );

        let order = NewOrder {
            chain_id: CHAIN_ID,
            transaction_hash: format!("0x{}", "ab".repeat(32)),
            order_id: format!("0x{}", "0d".repeat(32)),
            order_type: OrderType::Primary,
            status: OrderStatus::Confirmed,
            price: BigDecimal::from(25),
            payment_token: crate::types::NATIVE_PAYMENT_TOKEN.to_string(),
            buyer_address: stored.organizer_address.clone(),
            event_id: stored.id,
        };
        assert!(store.create_order_if_absent(&order).await?);
        assert!(!store.create_order_if_absent(&order).await?);

        store.close().await;
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a scratch PostgreSQL database"]
    async fn test_postgres_cursor_never_moves_backwards() -> anyhow::Result<()> {
        let store = connect().await?;
        let contract = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

        store.upsert_cursor(contract, 100, Utc::now()).await?;
        store.upsert_cursor(contract, 40, Utc::now()).await?;

        let cursor = store.get_cursor(contract).await?.unwrap();
        assert_eq!(cursor.last_block_number, 100);
        assert_eq!(
            cursor.contract_address,
            "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        );

        store.close().await;
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a scratch PostgreSQL database"]
    async fn test_postgres_dead_letters_replay_in_park_order() -> anyhow::Result<()> {
        use crate::decoders::{LogRef, TicketMinted, TicketTransferred};
        use alloy::primitives::{Address, B256, U256};

        let store = connect().await?;
        store.ping().await?;

        let mint = DomainEvent::TicketMinted(TicketMinted {
            token_id: U256::from(12),
            event_id: U256::from(7),
            owner: Address::repeat_byte(0xaa),
            seat_number: "A-1".to_string(),
            log: LogRef::default(),
        });
        let transfer = DomainEvent::TicketTransferred(TicketTransferred {
            token_id: U256::from(12),
            from: Address::repeat_byte(0xaa),
            to: Address::repeat_byte(0xbb),
            log: LogRef {
                transaction_hash: Some(B256::repeat_byte(6)),
                ..Default::default()
            },
        });
        let contract = "0xE7f1725E7734CE288F8367e1Bb143E90bb3F0512";

        store.park_dead_letter(CHAIN_ID, contract, &mint).await?;
        store.park_dead_letter(CHAIN_ID, contract, &mint).await?;
        store.park_dead_letter(CHAIN_ID, contract, &transfer).await?;

        assert!(store.has_dead_letter(CHAIN_ID, "TicketMinted", "12").await?);
        assert!(!store.has_dead_letter(CHAIN_ID, "TicketMinted", "13").await?);

        let letters = store.dead_letters(CHAIN_ID).await?;
        assert_eq!(letters.len(), 2);
        assert_eq!(letters[0].event, mint);
        assert_eq!(letters[1].event, transfer);

        store.bump_dead_letter(letters[1].id).await?;
        store.resolve_dead_letter(letters[0].id).await?;
        let letters = store.dead_letters(CHAIN_ID).await?;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].attempts, 1);
        assert!(!store.has_dead_letter(CHAIN_ID, "TicketMinted", "12").await?);

        store.close().await;
        Ok(())
    }
}
