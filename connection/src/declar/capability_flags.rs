use bitflags::bitflags;

bitflags! {
    /// Client/server capability negotiation flags (protocol::CapabilityFlags).
    /// Only the subset this crate actually negotiates is named; the rest of
    /// the bit space is preserved on round-trip but never inspected.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapabilityFlags: u32 {
        const CLIENT_LONG_PASSWORD = 0x0000_0001;
        const CLIENT_FOUND_ROWS = 0x0000_0002;
        const CLIENT_LONG_FLAG = 0x0000_0004;
        const CLIENT_CONNECT_WITH_DB = 0x0000_0008;
        const CLIENT_PROTOCOL_41 = 0x0000_0200;
        const CLIENT_SSL = 0x0000_0800;
        const CLIENT_TRANSACTIONS = 0x0000_2000;
        const CLIENT_SECURE_CONNECTION = 0x0000_8000;
        const CLIENT_MULTI_STATEMENTS = 0x0001_0000;
        const CLIENT_MULTI_RESULTS = 0x0002_0000;
        const CLIENT_PLUGIN_AUTH = 0x0008_0000;
        const CLIENT_CONNECT_ATTRS = 0x0010_0000;
        const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA = 0x0020_0000;
        const CLIENT_DEPRECATE_EOF = 0x0100_0000;
    }
}

impl CapabilityFlags {
    /// The flag set this crate presents during the handshake response.
    /// No SSL, no compression, no connect attributes: the pool speaks
    /// mysql_native_password over a plain TCP connection only.
    pub fn client_default() -> Self {
        CapabilityFlags::CLIENT_LONG_PASSWORD
            | CapabilityFlags::CLIENT_PROTOCOL_41
            | CapabilityFlags::CLIENT_TRANSACTIONS
            | CapabilityFlags::CLIENT_SECURE_CONNECTION
            | CapabilityFlags::CLIENT_MULTI_RESULTS
            | CapabilityFlags::CLIENT_PLUGIN_AUTH
            | CapabilityFlags::CLIENT_DEPRECATE_EOF
    }
}
