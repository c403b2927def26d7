use std::collections::HashMap;

use common::CdcResult;

use crate::declar::ColumnType;
use crate::packet::Reader;

#[derive(Debug, Clone)]
pub struct TableMapEvent {
    pub table_id: u64,
    pub schema: String,
    pub table: String,
    pub column_types: Vec<ColumnType>,
}

impl TableMapEvent {
    pub fn parse(payload: &[u8]) -> CdcResult<Self> {
        let mut r = Reader::new(payload);
        let table_id = r.read_u48_le()?;
        let _reserved = r.read_u16_le()?;

        let schema_len = r.read_u8()? as usize;
        let schema = String::from_utf8_lossy(r.read_bytes(schema_len)?).into_owned();
        let _nul = r.read_u8()?;

        let table_len = r.read_u8()? as usize;
        let table = String::from_utf8_lossy(r.read_bytes(table_len)?).into_owned();
        let _nul = r.read_u8()?;

        let column_count = r.read_lenenc_int()? as usize;
        let raw_types = r.read_bytes(column_count)?;
        let column_types = raw_types
            .iter()
            .map(|byte| ColumnType::try_from(*byte).unwrap_or(ColumnType::VarString))
            .collect();

        // Metadata block and nullability bitmap follow; neither is needed
        // to decode the common scalar shapes this crate supports (no
        // VARCHAR display-width, no DECIMAL precision/scale), so they are
        // consumed but not interpreted.
        let _metadata = r.read_lenenc_string()?;

        Ok(TableMapEvent { table_id, schema, table, column_types })
    }
}

/// Keyed by `table_id` as assigned by the server for the lifetime of a
/// single connection's stream.
pub type TableMapRegistry = HashMap<u64, TableMapEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&[1, 0, 0, 0, 0, 0]); // table_id = 1
        p.extend_from_slice(&[0, 0]); // reserved
        p.push(2);
        p.extend_from_slice(b"db\0");
        p.push(5);
        p.extend_from_slice(b"users\0");
        p.push(2); // column count (lenenc, small)
        p.push(ColumnType::Long as u8);
        p.push(ColumnType::VarString as u8);
        crate::packet::write_lenenc_string(&mut p, &[0x0f, 0xff]); // metadata block
        p
    }

    #[test]
    fn parses_schema_table_and_column_types() {
        let event = TableMapEvent::parse(&sample()).unwrap();
        assert_eq!(event.table_id, 1);
        assert_eq!(event.schema, "db");
        assert_eq!(event.table, "users");
        assert_eq!(event.column_types, vec![ColumnType::Long, ColumnType::VarString]);
    }
}
