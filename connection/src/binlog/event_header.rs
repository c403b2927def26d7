use common::CdcResult;

use crate::packet::Reader;

/// Event types this crate decodes from the binlog stream. Row-based
/// events only, per the wire-protocol contract (§6): GTID, XID, format
/// description and rotate are recognized to keep the stream in sync but
/// otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    RotateEvent,
    FormatDescriptionEvent,
    TableMapEvent,
    WriteRowsEventV2,
    UpdateRowsEventV2,
    DeleteRowsEventV2,
    XidEvent,
    Other(u8),
}

impl From<u8> for EventType {
    fn from(code: u8) -> Self {
        match code {
            0x04 => EventType::RotateEvent,
            0x0f => EventType::FormatDescriptionEvent,
            0x13 => EventType::TableMapEvent,
            0x1e => EventType::WriteRowsEventV2,
            0x1f => EventType::UpdateRowsEventV2,
            0x20 => EventType::DeleteRowsEventV2,
            0x10 => EventType::XidEvent,
            other => EventType::Other(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventHeader {
    pub timestamp: u32,
    pub event_type: EventType,
    pub server_id: u32,
    pub event_size: u32,
    pub log_pos: u32,
    pub flags: u16,
}

pub const EVENT_HEADER_LEN: usize = 19;

impl EventHeader {
    pub fn parse(payload: &[u8]) -> CdcResult<Self> {
        let mut r = Reader::new(payload);
        let timestamp = r.read_u32_le()?;
        let event_type = EventType::from(r.read_u8()?);
        let server_id = r.read_u32_le()?;
        let event_size = r.read_u32_le()?;
        let log_pos = r.read_u32_le()?;
        let flags = r.read_u16_le()?;
        Ok(EventHeader { timestamp, event_type, server_id, event_size, log_pos, flags })
    }
}
