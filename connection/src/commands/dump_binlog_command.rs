use byteorder::{LittleEndian, WriteBytesExt};

use super::COM_BINLOG_DUMP;

pub const BINLOG_DUMP_NON_BLOCK: u16 = 0x01;

/// Builds a `COM_BINLOG_DUMP` payload requesting the stream starting at
/// `(log_file, log_pos)` registered under `server_id`. `blocking=false`
/// sets `BINLOG_DUMP_NON_BLOCK`, matching the non-blocking replication
/// option in `ReplicationConfig`.
pub fn build(log_file: &str, log_pos: u32, server_id: u32, blocking: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(11 + log_file.len());
    out.push(COM_BINLOG_DUMP);
    out.write_u32::<LittleEndian>(log_pos).unwrap();
    let flags: u16 = if blocking { 0 } else { BINLOG_DUMP_NON_BLOCK };
    out.write_u16::<LittleEndian>(flags).unwrap();
    out.write_u32::<LittleEndian>(server_id).unwrap();
    out.extend_from_slice(log_file.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_log_pos_and_server_id() {
        let payload = build("binlog.000001", 4, 7, true);
        assert_eq!(payload[0], COM_BINLOG_DUMP);
        assert_eq!(u32::from_le_bytes(payload[1..5].try_into().unwrap()), 4);
        assert_eq!(u16::from_le_bytes(payload[5..7].try_into().unwrap()), 0);
        assert_eq!(u32::from_le_bytes(payload[7..11].try_into().unwrap()), 7);
        assert_eq!(&payload[11..], b"binlog.000001");
    }

    #[test]
    fn non_blocking_sets_flag() {
        let payload = build("binlog.000001", 4, 7, false);
        assert_eq!(u16::from_le_bytes(payload[5..7].try_into().unwrap()), BINLOG_DUMP_NON_BLOCK);
    }
}
