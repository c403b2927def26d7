//! Generic response (OK/ERR) and text-protocol resultset decoding.

use common::row::Row;
use common::value::Value;
use common::{CdcError, CdcResult};

use crate::declar::StatusFlags;
use crate::packet::{ERR_PACKET_MARKER, OK_PACKET_MARKER};
use crate::packet::Reader;

#[derive(Debug, Clone, Default)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: StatusFlags,
    pub warnings: u16,
}

#[derive(Debug, Clone)]
pub struct ErrPacket {
    pub code: u16,
    pub message: String,
}

impl ErrPacket {
    /// MySQL error 2014, "Command Out of Sync", is raised by the client
    /// library rather than carried in a server ERR packet, so callers
    /// check transport-layer misuse separately; this only decodes what the
    /// server itself sends.
    pub fn parse(payload: &[u8]) -> CdcResult<Self> {
        let mut r = Reader::new(payload);
        let marker = r.read_u8()?;
        if marker != ERR_PACKET_MARKER {
            return Err(CdcError::Transport("not an ERR packet".into()));
        }
        let code = r.read_u16_le()?;
        if r.peek_u8() == Some(b'#') {
            let _ = r.read_bytes(6)?;
        }
        let message = String::from_utf8_lossy(r.read_rest()).into_owned();
        Ok(ErrPacket { code, message })
    }
}

impl OkPacket {
    pub fn parse(payload: &[u8]) -> CdcResult<Self> {
        let mut r = Reader::new(payload);
        let marker = r.read_u8()?;
        if marker != OK_PACKET_MARKER {
            return Err(CdcError::Transport("not an OK packet".into()));
        }
        let affected_rows = r.read_lenenc_int()?;
        let last_insert_id = r.read_lenenc_int()?;
        let status_flags = StatusFlags::from_bits_truncate(r.read_u16_le()?);
        let warnings = r.read_u16_le()?;
        Ok(OkPacket { affected_rows, last_insert_id, status_flags, warnings })
    }
}

/// Either a server response to a non-resultset command, or the decoded
/// rows from a `SELECT`-shaped `COM_QUERY`.
pub enum QueryResponse {
    Ok(OkPacket),
    Rows(Vec<Row>),
}

struct ColumnDef {
    name: String,
}

fn parse_column_def(payload: &[u8]) -> CdcResult<ColumnDef> {
    let mut r = Reader::new(payload);
    let _catalog = r.read_lenenc_string()?;
    let _schema = r.read_lenenc_string()?;
    let _table = r.read_lenenc_string()?;
    let _org_table = r.read_lenenc_string()?;
    let name = String::from_utf8_lossy(r.read_lenenc_string()?).into_owned();
    Ok(ColumnDef { name })
}

fn parse_text_row(payload: &[u8], columns: &[ColumnDef]) -> CdcResult<Row> {
    let mut r = Reader::new(payload);
    let mut row = Row::new();
    for col in columns {
        match r.read_lenenc_string_or_null()? {
            None => row.insert(col.name.clone(), Value::Null),
            Some(bytes) => row.insert(col.name.clone(), Value::Text(String::from_utf8_lossy(bytes).into_owned())),
        }
    }
    Ok(row)
}

/// Decodes one full `COM_QUERY` response: the caller supplies a closure
/// reading the next raw packet so this stays transport-agnostic (used both
/// against a live `PacketChannel` and against canned test fixtures).
pub fn read_query_response(mut next_packet: impl FnMut() -> CdcResult<Vec<u8>>) -> CdcResult<QueryResponse> {
    let first = next_packet()?;
    match first.first().copied() {
        Some(ERR_PACKET_MARKER) => Err(translate_err(ErrPacket::parse(&first)?)),
        Some(OK_PACKET_MARKER) => Ok(QueryResponse::Ok(OkPacket::parse(&first)?)),
        _ => {
            let mut r = Reader::new(&first);
            let column_count = r.read_lenenc_int()? as usize;
            let mut columns = Vec::with_capacity(column_count);
            for _ in 0..column_count {
                columns.push(parse_column_def(&next_packet()?)?);
            }
            // Pre-DEPRECATE_EOF servers send an EOF packet here; accept
            // and skip it if present, otherwise treat as the first row.
            let mut pending = next_packet()?;
            if pending.first().copied() == Some(crate::packet::EOF_PACKET_MARKER) && pending.len() < 9 {
                pending = next_packet()?;
            }

            let mut rows = Vec::new();
            let mut packet = pending;
            loop {
                match packet.first().copied() {
                    Some(crate::packet::EOF_PACKET_MARKER) if packet.len() < 9 => break,
                    Some(OK_PACKET_MARKER) => break,
                    Some(ERR_PACKET_MARKER) => return Err(translate_err(ErrPacket::parse(&packet)?)),
                    _ => {
                        rows.push(parse_text_row(&packet, &columns)?);
                        packet = next_packet()?;
                    }
                }
            }
            Ok(QueryResponse::Rows(rows))
        }
    }
}

fn translate_err(err: ErrPacket) -> CdcError {
    if err.code == 2014 {
        CdcError::OutOfSync
    } else {
        CdcError::Transport(format!("MySQL error {}: {}", err.code, err.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::write_lenenc_string;

    fn ok_packet(affected: u64) -> Vec<u8> {
        let mut out = vec![0x00];
        crate::packet::write_lenenc_int(&mut out, affected);
        crate::packet::write_lenenc_int(&mut out, 0);
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    fn err_packet(code: u16, message: &str) -> Vec<u8> {
        let mut out = vec![0xff];
        out.extend_from_slice(&code.to_le_bytes());
        out.push(b'#');
        out.extend_from_slice(b"HY000");
        out.extend_from_slice(message.as_bytes());
        out
    }

    #[test]
    fn parses_ok_packet() {
        let ok = OkPacket::parse(&ok_packet(3)).unwrap();
        assert_eq!(ok.affected_rows, 3);
    }

    #[test]
    fn err_2014_maps_to_out_of_sync() {
        let packets = vec![err_packet(2014, "Commands out of sync")];
        let mut iter = packets.into_iter();
        let result = read_query_response(|| iter.next().ok_or(CdcError::Transport("eof".into())));
        assert!(matches!(result, Err(CdcError::OutOfSync)));
    }

    #[test]
    fn decodes_a_simple_select_resultset() {
        let mut col_count = Vec::new();
        crate::packet::write_lenenc_int(&mut col_count, 2);

        let mut col_id = Vec::new();
        write_lenenc_string(&mut col_id, b"def");
        write_lenenc_string(&mut col_id, b"db");
        write_lenenc_string(&mut col_id, b"users");
        write_lenenc_string(&mut col_id, b"users");
        write_lenenc_string(&mut col_id, b"id");

        let mut col_name = Vec::new();
        write_lenenc_string(&mut col_name, b"def");
        write_lenenc_string(&mut col_name, b"db");
        write_lenenc_string(&mut col_name, b"users");
        write_lenenc_string(&mut col_name, b"users");
        write_lenenc_string(&mut col_name, b"name");

        let eof = vec![0xfe, 0x00, 0x00, 0x00, 0x00];

        let mut row = Vec::new();
        write_lenenc_string(&mut row, b"1");
        write_lenenc_string(&mut row, b"Ada");

        let final_eof = vec![0xfe, 0x00, 0x00, 0x00, 0x00];

        let packets = vec![col_count, col_id, col_name, eof, row, final_eof];
        let mut iter = packets.into_iter();
        let result = read_query_response(|| iter.next().ok_or(CdcError::Transport("eof".into()))).unwrap();
        match result {
            QueryResponse::Rows(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].get("id"), Value::Text("1".into()));
                assert_eq!(rows[0].get("name"), Value::Text("Ada".into()));
            }
            QueryResponse::Ok(_) => panic!("expected rows"),
        }
    }
}
