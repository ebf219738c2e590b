use crate::{
    chains::traits::RawLog,
    decoders::{
        DecodeError, DomainEvent, LogRef, TicketMinted, TicketTransferred, abi, expect_topic,
    },
};
use alloy::{
    primitives::{Address, B256},
    sol_types::SolEvent,
};

pub const MINTED_SIGNATURE: B256 = abi::TicketMinted::SIGNATURE_HASH;
pub const TRANSFER_SIGNATURE: B256 = abi::Transfer::SIGNATURE_HASH;

/// Mints first, then transfers: the order the two streams are projected in.
pub const SIGNATURES: &[B256] = &[MINTED_SIGNATURE, TRANSFER_SIGNATURE];

/// Decodes `TicketMinted` and `Transfer` logs from the ticket contract.
///
/// Transfers from the zero address are the ERC-721 side of a mint. The mint
/// log already created the ticket, so they decode to `None`.
pub fn decode(log: &RawLog) -> Result<Option<DomainEvent>, DecodeError> {
    let topic = expect_topic(log, SIGNATURES)?;

    if topic == MINTED_SIGNATURE {
        let event = abi::TicketMinted::decode_log_data(log.data())?;
        return Ok(Some(DomainEvent::TicketMinted(TicketMinted {
            token_id: event.tokenId,
            event_id: event.eventId,
            owner: event.to,
            seat_number: event.seatNumber,
            log: LogRef::of(log),
        })));
    }

    let event = abi::Transfer::decode_log_data(log.data())?;
    if event.from == Address::ZERO {
        return Ok(None);
    }

    Ok(Some(DomainEvent::TicketTransferred(TicketTransferred {
        token_id: event.tokenId,
        from: event.from,
        to: event.to,
        log: LogRef::of(log),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::mock::rpc_log;
    use alloy::primitives::{U256, address};

    const TICKETS: Address = address!("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512");

    #[test]
    fn test_decode_ticket_minted() {
        let minted = abi::TicketMinted {
            tokenId: U256::from(12),
            eventId: U256::from(7),
            to: address!("0x00000000000000000000000000000000000000Aa"),
            seatNumber: "B-4".to_string(),
        };
        let log = rpc_log(TICKETS, minted.encode_log_data(), 3, 1, B256::repeat_byte(1));

        let Some(DomainEvent::TicketMinted(event)) = decode(&log).unwrap() else {
            panic!("expected TicketMinted");
        };
        assert_eq!(event.token_id, U256::from(12));
        assert_eq!(event.event_id, U256::from(7));
        assert_eq!(event.seat_number, "B-4");
        assert_eq!(event.log.log_index, Some(1));
    }

    #[test]
    fn test_decode_transfer() {
        let transfer = abi::Transfer {
            from: address!("0x0000000000000000000000000000000000000001"),
            to: address!("0x0000000000000000000000000000000000000002"),
            tokenId: U256::from(12),
        };
        let log = rpc_log(TICKETS, transfer.encode_log_data(), 5, 0, B256::repeat_byte(2));

        let Some(DomainEvent::TicketTransferred(event)) = decode(&log).unwrap() else {
            panic!("expected TicketTransferred");
        };
        assert_eq!(event.token_id, U256::from(12));
        assert_eq!(
            event.to,
            address!("0x0000000000000000000000000000000000000002")
        );
    }

    #[test]
    fn test_mint_side_transfer_is_skipped() {
        let transfer = abi::Transfer {
            from: Address::ZERO,
            to: address!("0x0000000000000000000000000000000000000002"),
            tokenId: U256::from(12),
        };
        let log = rpc_log(TICKETS, transfer.encode_log_data(), 3, 2, B256::repeat_byte(1));

        assert_eq!(decode(&log).unwrap(), None);
    }

    #[test]
    fn test_truncated_data_is_decode_error() {
        let minted = abi::TicketMinted {
            tokenId: U256::from(1),
            eventId: U256::from(1),
            to: address!("0x0000000000000000000000000000000000000002"),
            seatNumber: "C-1".to_string(),
        };
        let mut data = minted.encode_log_data();
        let topics = data.topics().to_vec();
        data = alloy::primitives::LogData::new_unchecked(topics, data.data.slice(..8));
        let log = rpc_log(TICKETS, data, 3, 0, B256::ZERO);

        assert!(matches!(decode(&log), Err(DecodeError::Abi(_))));
    }
}
