//! Initial handshake packet parsing and the `mysql_native_password`
//! handshake response builder.

use byteorder::{LittleEndian, WriteBytesExt};

use common::{CdcError, CdcResult};

use crate::auth;
use crate::declar::CapabilityFlags;
use crate::packet::{write_lenenc_string, Reader};

#[derive(Debug, Clone)]
pub struct HandshakePacket {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub auth_plugin_data: Vec<u8>,
    pub server_capabilities: CapabilityFlags,
    pub auth_plugin_name: String,
}

impl HandshakePacket {
    pub fn parse(payload: &[u8]) -> CdcResult<Self> {
        let mut r = Reader::new(payload);
        let protocol_version = r.read_u8()?;
        let server_version = String::from_utf8_lossy(r.read_null_terminated()?).into_owned();
        let connection_id = r.read_u32_le()?;

        let mut auth_plugin_data = r.read_bytes(8)?.to_vec();
        let _filler = r.read_u8()?;

        let capabilities_low = r.read_u16_le()? as u32;
        let _charset = r.read_u8()?;
        let _status_flags = r.read_u16_le()?;
        let capabilities_high = r.read_u16_le()? as u32;
        let server_capabilities = CapabilityFlags::from_bits_truncate(capabilities_low | (capabilities_high << 16));

        let auth_data_len = r.read_u8()?;
        let _reserved = r.read_bytes(10)?;

        if server_capabilities.contains(CapabilityFlags::CLIENT_SECURE_CONNECTION) {
            let remaining_len = (auth_data_len as usize).saturating_sub(8).max(13);
            let rest = r.read_bytes(remaining_len)?;
            // Drop the trailing NUL the protocol pads the second part with.
            auth_plugin_data.extend_from_slice(&rest[..rest.len().saturating_sub(1)]);
        }

        let auth_plugin_name = if server_capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) {
            String::from_utf8_lossy(r.read_null_terminated().unwrap_or(b"mysql_native_password")).into_owned()
        } else {
            "mysql_native_password".to_string()
        };

        Ok(HandshakePacket {
            protocol_version,
            server_version,
            connection_id,
            auth_plugin_data,
            server_capabilities,
            auth_plugin_name,
        })
    }
}

/// Builds the `HandshakeResponse41` payload authenticating with
/// `mysql_native_password`. Fails with `Connect` if the server announced a
/// different auth plugin, since this crate speaks only that one.
pub fn build_response(
    handshake: &HandshakePacket,
    user: &str,
    password: &str,
    database: &str,
    charset: u8,
) -> CdcResult<Vec<u8>> {
    if handshake.auth_plugin_name != "mysql_native_password" {
        return Err(CdcError::Connect(format!(
            "unsupported auth plugin '{}': only mysql_native_password is implemented",
            handshake.auth_plugin_name
        )));
    }

    let mut capabilities = CapabilityFlags::client_default();
    if !database.is_empty() {
        capabilities |= CapabilityFlags::CLIENT_CONNECT_WITH_DB;
    }

    let auth_response = auth::scramble(&handshake.auth_plugin_data, password);

    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(capabilities.bits()).unwrap();
    out.write_u32::<LittleEndian>(16 * 1024 * 1024).unwrap();
    out.push(charset);
    out.extend_from_slice(&[0u8; 23]);

    out.extend_from_slice(user.as_bytes());
    out.push(0);

    out.push(auth_response.len() as u8);
    out.extend_from_slice(&auth_response);

    if !database.is_empty() {
        out.extend_from_slice(database.as_bytes());
        out.push(0);
    }

    write_lenenc_string(&mut out, b"mysql_native_password");

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_handshake() -> Vec<u8> {
        let mut p = Vec::new();
        p.push(10); // protocol version
        p.extend_from_slice(b"8.0.30\0");
        p.extend_from_slice(&42u32.to_le_bytes());
        p.extend_from_slice(b"12345678"); // auth-plugin-data-part-1
        p.push(0); // filler
        p.extend_from_slice(&(CapabilityFlags::client_default().bits() as u16).to_le_bytes());
        p.push(0x21); // charset
        p.extend_from_slice(&2u16.to_le_bytes()); // status flags
        p.extend_from_slice(&((CapabilityFlags::client_default().bits() >> 16) as u16).to_le_bytes());
        p.push(21); // auth data len
        p.extend_from_slice(&[0u8; 10]);
        p.extend_from_slice(b"123456789012\0"); // auth-plugin-data-part-2 (12 + nul)
        p.extend_from_slice(b"mysql_native_password\0");
        p
    }

    #[test]
    fn parses_protocol_version_and_server_version() {
        let h = HandshakePacket::parse(&sample_handshake()).unwrap();
        assert_eq!(h.protocol_version, 10);
        assert_eq!(h.server_version, "8.0.30");
        assert_eq!(h.connection_id, 42);
        assert_eq!(h.auth_plugin_name, "mysql_native_password");
        assert_eq!(h.auth_plugin_data.len(), 20);
    }

    #[test]
    fn build_response_rejects_unsupported_plugin() {
        let mut h = HandshakePacket::parse(&sample_handshake()).unwrap();
        h.auth_plugin_name = "caching_sha2_password".to_string();
        assert!(build_response(&h, "root", "pw", "", 0x21).is_err());
    }

    #[test]
    fn build_response_includes_username_and_scrambled_password() {
        let h = HandshakePacket::parse(&sample_handshake()).unwrap();
        let resp = build_response(&h, "root", "secret", "mydb", 0x21).unwrap();
        let needle = b"root\0";
        assert!(resp.windows(needle.len()).any(|w| w == needle));
    }
}
