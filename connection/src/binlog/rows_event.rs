use common::row::Row;
use common::value::Value;
use common::CdcResult;

use crate::binlog::table_map::TableMapEvent;
use crate::binlog::value_decode;
use crate::packet::Reader;

pub struct RowsEventHeader {
    pub table_id: u64,
}

/// Shared prefix of WRITE/UPDATE/DELETE_ROWS_EVENT_V2: table id, reserved
/// flags, a v2 extra-data block, and the columns-present bitmap(s).
struct RowsEventPrelude<'a> {
    table_id: u64,
    columns_present: Vec<bool>,
    columns_present_after: Option<Vec<bool>>,
    rest: &'a [u8],
}

fn parse_prelude<'a>(payload: &'a [u8]) -> CdcResult<RowsEventPrelude<'a>> {
    let mut r = Reader::new(payload);
    let table_id = r.read_u48_le()?;
    let _flags = r.read_u16_le()?;
    let extra_len = r.read_u16_le()? as usize;
    let _extra = r.read_bytes(extra_len.saturating_sub(2))?;

    let column_count = r.read_lenenc_int()? as usize;
    let columns_present = read_bitmap(&mut r, column_count)?;
    Ok(RowsEventPrelude { table_id, columns_present, columns_present_after: None, rest: r.read_rest() })
}

fn parse_update_prelude<'a>(payload: &'a [u8]) -> CdcResult<RowsEventPrelude<'a>> {
    let mut r = Reader::new(payload);
    let table_id = r.read_u48_le()?;
    let _flags = r.read_u16_le()?;
    let extra_len = r.read_u16_le()? as usize;
    let _extra = r.read_bytes(extra_len.saturating_sub(2))?;

    let column_count = r.read_lenenc_int()? as usize;
    let columns_present = read_bitmap(&mut r, column_count)?;
    let columns_present_after = read_bitmap(&mut r, column_count)?;
    Ok(RowsEventPrelude { table_id, columns_present, columns_present_after: Some(columns_present_after), rest: r.read_rest() })
}

fn read_bitmap(r: &mut Reader, n: usize) -> CdcResult<Vec<bool>> {
    let byte_len = n.div_ceil(8);
    let bytes = r.read_bytes(byte_len)?;
    let mut bits = Vec::with_capacity(n);
    for i in 0..n {
        let byte = bytes[i / 8];
        bits.push(byte & (1 << (i % 8)) != 0);
    }
    Ok(bits)
}

fn decode_row(r: &mut Reader, table: &TableMapEvent, present: &[bool]) -> CdcResult<Row> {
    let present_count = present.iter().filter(|b| **b).count();
    let null_bitmap = read_bitmap(r, present_count)?;

    let mut row = Row::new();
    let mut null_idx = 0;
    for (col_idx, is_present) in present.iter().enumerate() {
        if !is_present {
            continue;
        }
        let column_type = table.column_types.get(col_idx).copied().unwrap_or(crate::declar::ColumnType::VarString);
        let column_name = format!("column_{col_idx}");
        let is_null = null_bitmap.get(null_idx).copied().unwrap_or(false);
        null_idx += 1;
        let value = if is_null { Value::Null } else { value_decode::decode(r, column_type)? };
        row.insert(column_name, value);
    }
    Ok(row)
}

pub fn decode_write_rows(payload: &[u8], table: &TableMapEvent) -> CdcResult<Vec<Row>> {
    let prelude = parse_prelude(payload)?;
    debug_assert_eq!(prelude.table_id, table.table_id);
    let mut r = Reader::new(prelude.rest);
    let mut rows = Vec::new();
    while !r.is_empty() {
        rows.push(decode_row(&mut r, table, &prelude.columns_present)?);
    }
    Ok(rows)
}

pub fn decode_delete_rows(payload: &[u8], table: &TableMapEvent) -> CdcResult<Vec<Row>> {
    decode_write_rows(payload, table)
}

pub fn decode_update_rows(payload: &[u8], table: &TableMapEvent) -> CdcResult<Vec<(Row, Row)>> {
    let prelude = parse_update_prelude(payload)?;
    let after_bitmap = prelude.columns_present_after.unwrap();
    let mut r = Reader::new(prelude.rest);
    let mut pairs = Vec::new();
    while !r.is_empty() {
        let before = decode_row(&mut r, table, &prelude.columns_present)?;
        let after = decode_row(&mut r, table, &after_bitmap)?;
        pairs.push((before, after));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declar::ColumnType;

    fn table() -> TableMapEvent {
        TableMapEvent { table_id: 1, schema: "db".into(), table: "users".into(), column_types: vec![ColumnType::Long, ColumnType::VarString] }
    }

    fn write_payload() -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&[1, 0, 0, 0, 0, 0]); // table_id
        p.extend_from_slice(&[0, 0]); // flags
        p.extend_from_slice(&2u16.to_le_bytes()); // extra_len = 2 (none)
        crate::packet::write_lenenc_int(&mut p, 2); // column count
        p.push(0b0000_0011); // columns present bitmap (both columns)
        p.push(0b0000_0000); // null bitmap (neither null)
        p.extend_from_slice(&7i32.to_le_bytes()); // column 0 = 7
        p.push(3);
        p.extend_from_slice(b"Ada"); // column 1 = "Ada"
        p
    }

    #[test]
    fn decodes_a_single_inserted_row() {
        let rows = decode_write_rows(&write_payload(), &table()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("column_0"), Value::Int(7));
        assert_eq!(rows[0].get("column_1"), Value::Text("Ada".into()));
    }
}
