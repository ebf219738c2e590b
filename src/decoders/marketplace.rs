use crate::{
    chains::traits::RawLog,
    decoders::{DecodeError, DomainEvent, LogRef, OrderCreated, abi, expect_topic},
};
use alloy::{primitives::B256, sol_types::SolEvent};

pub const SIGNATURES: &[B256] = &[abi::OrderCreated::SIGNATURE_HASH];

/// Decodes an `OrderCreated` log. The transaction hash is required because it
/// identifies the order row.
pub fn decode(log: &RawLog) -> Result<Option<DomainEvent>, DecodeError> {
    expect_topic(log, SIGNATURES)?;
    let transaction_hash = log
        .transaction_hash
        .ok_or(DecodeError::MissingField("transaction_hash"))?;
    let event = abi::OrderCreated::decode_log_data(log.data())?;

    Ok(Some(DomainEvent::OrderCreated(OrderCreated {
        order_id: event.orderId,
        buyer: event.buyer,
        event_id: event.eventId,
        price: event.price,
        transaction_hash,
        log: LogRef::of(log),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::mock::rpc_log;
    use alloy::primitives::{Address, U256, address};

    const MARKET: Address = address!("0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0");

    fn order() -> abi::OrderCreated {
        abi::OrderCreated {
            orderId: B256::repeat_byte(0x0d),
            buyer: address!("0x00000000000000000000000000000000000000Bb"),
            eventId: U256::from(7),
            price: U256::from(25u64),
        }
    }

    #[test]
    fn test_decode_order_created() {
        let tx = B256::repeat_byte(0x7a);
        let log = rpc_log(MARKET, order().encode_log_data(), 9, 0, tx);

        let Some(DomainEvent::OrderCreated(event)) = decode(&log).unwrap() else {
            panic!("expected OrderCreated");
        };
        assert_eq!(event.transaction_hash, tx);
        assert_eq!(event.order_id, B256::repeat_byte(0x0d));
        assert_eq!(event.event_id, U256::from(7));
        assert_eq!(event.price, U256::from(25u64));
    }

    #[test]
    fn test_missing_transaction_hash() {
        let mut log = rpc_log(MARKET, order().encode_log_data(), 9, 0, B256::ZERO);
        log.transaction_hash = None;

        assert!(matches!(
            decode(&log),
            Err(DecodeError::MissingField("transaction_hash"))
        ));
    }
}
