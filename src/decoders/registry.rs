use crate::{
    chains::traits::RawLog,
    decoders::{DecodeError, DomainEvent, EventCreated, LogRef, abi, expect_topic, to_u64},
};
use alloy::{primitives::B256, sol_types::SolEvent};

pub const SIGNATURES: &[B256] = &[abi::EventCreated::SIGNATURE_HASH];

/// Decodes an `EventCreated` log from the event registry contract.
pub fn decode(log: &RawLog) -> Result<Option<DomainEvent>, DecodeError> {
    expect_topic(log, SIGNATURES)?;
    let event = abi::EventCreated::decode_log_data(log.data())?;

    Ok(Some(DomainEvent::EventCreated(EventCreated {
        event_id: event.eventId,
        organizer: event.organizer,
        name: event.name,
        max_tickets: to_u64(event.maxTickets, "maxTickets")?,
        ticket_price: event.ticketPrice,
        log: LogRef::of(log),
    })))
}
