use super::COM_QUERY;

/// Builds a `COM_QUERY` payload. Values are not protocol-bound parameters
/// here — the caller (the `conn` layer) inlines them into `sql` via the
/// `sql` crate's statement text before calling this, matching MySQL's text
/// protocol (no prepared-statement placeholders over the wire).
pub fn build(sql: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(sql.len() + 1);
    out.push(COM_QUERY);
    out.extend_from_slice(sql.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_command_byte() {
        let payload = build("SELECT 1");
        assert_eq!(payload[0], COM_QUERY);
        assert_eq!(&payload[1..], b"SELECT 1");
    }
}
