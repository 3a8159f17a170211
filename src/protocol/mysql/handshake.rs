//! Initial handshake (server greeting)

use rand::Rng;

use super::packet::put_nul_str;
use super::types::charset;

/// Capability flags
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 0x00000001;
    pub const CLIENT_FOUND_ROWS: u32 = 0x00000002;
    pub const CLIENT_LONG_FLAG: u32 = 0x00000004;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 0x00000008;
    pub const CLIENT_PROTOCOL_41: u32 = 0x00000200;
    pub const CLIENT_SSL: u32 = 0x00000800;
    pub const CLIENT_TRANSACTIONS: u32 = 0x00002000;
    pub const CLIENT_SECURE_CONNECTION: u32 = 0x00008000;
    pub const CLIENT_MULTI_STATEMENTS: u32 = 0x00010000;
    pub const CLIENT_MULTI_RESULTS: u32 = 0x00020000;
    pub const CLIENT_PLUGIN_AUTH: u32 = 0x00080000;
    pub const CLIENT_CONNECT_ATTRS: u32 = 0x00100000;
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 0x00200000;
    pub const CLIENT_DEPRECATE_EOF: u32 = 0x01000000;
}

/// Server status flags
pub mod status_flags {
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;
}

/// Authentication plugin name
pub const AUTH_PLUGIN_NAME: &str = "mysql_native_password";

/// Capabilities the server advertises.
///
/// DEPRECATE_EOF and SSL are left out: result sets always end with EOF
/// packets and the socket is local.
pub const SERVER_CAPABILITIES: u32 = capabilities::CLIENT_LONG_PASSWORD
    | capabilities::CLIENT_FOUND_ROWS
    | capabilities::CLIENT_LONG_FLAG
    | capabilities::CLIENT_CONNECT_WITH_DB
    | capabilities::CLIENT_PROTOCOL_41
    | capabilities::CLIENT_TRANSACTIONS
    | capabilities::CLIENT_SECURE_CONNECTION
    | capabilities::CLIENT_MULTI_STATEMENTS
    | capabilities::CLIENT_MULTI_RESULTS
    | capabilities::CLIENT_PLUGIN_AUTH
    | capabilities::CLIENT_CONNECT_ATTRS
    | capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA;

const PROTOCOL_VERSION: u8 = 10;
const SCRAMBLE_LEN: usize = 20;

/// Server greeting (Protocol::HandshakeV10)
pub struct Greeting {
    pub server_version: String,
    pub connection_id: u32,
    /// Nonce the client scrambles its password with
    pub scramble: [u8; SCRAMBLE_LEN],
}

impl Greeting {
    pub fn new(connection_id: u32, server_version: &str) -> Self {
        // Clients read the second scramble part up to a NUL, so no zeros
        let mut rng = rand::thread_rng();
        let scramble = std::array::from_fn(|_| rng.gen_range(1..=127u8));
        Greeting {
            server_version: server_version.to_string(),
            connection_id,
            scramble,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let caps = SERVER_CAPABILITIES.to_le_bytes();
        let (head, tail) = self.scramble.split_at(8);

        let mut buf = Vec::with_capacity(96 + self.server_version.len());
        buf.push(PROTOCOL_VERSION);
        put_nul_str(&mut buf, &self.server_version);
        buf.extend_from_slice(&self.connection_id.to_le_bytes());
        buf.extend_from_slice(head);
        buf.push(0);
        buf.extend_from_slice(&caps[..2]);
        buf.push(charset::UTF8MB4_BIN);
        buf.extend_from_slice(&status_flags::SERVER_STATUS_AUTOCOMMIT.to_le_bytes());
        buf.extend_from_slice(&caps[2..]);
        buf.push(SCRAMBLE_LEN as u8 + 1);
        buf.extend_from_slice(&[0; 10]);
        buf.extend_from_slice(tail);
        buf.push(0);
        put_nul_str(&mut buf, AUTH_PLUGIN_NAME);
        buf
    }
}

/// AuthSwitchRequest moving a client onto mysql_native_password
pub fn encode_auth_switch(scramble: &[u8]) -> Vec<u8> {
    let mut buf = vec![0xfe];
    put_nul_str(&mut buf, AUTH_PLUGIN_NAME);
    buf.extend_from_slice(scramble);
    buf.push(0);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mysql::packet::PayloadReader;

    #[test]
    fn test_greeting_layout() {
        let greeting = Greeting::new(42, "8.0.11-memdb");
        assert!(greeting.scramble.iter().all(|&b| b != 0));

        let encoded = greeting.encode();
        let mut r = PayloadReader::new(&encoded);
        assert_eq!(r.u8("version").unwrap(), 10);
        assert_eq!(r.nul_str("server version").unwrap(), "8.0.11-memdb");
        assert_eq!(r.u32_le("connection id").unwrap(), 42);
        assert_eq!(r.bytes(8, "scramble").unwrap(), &greeting.scramble[..8]);
        r.skip(1, "filler").unwrap();
        let lo = r.bytes(2, "caps").unwrap().to_vec();
        assert_eq!(r.u8("charset").unwrap(), charset::UTF8MB4_BIN);
        r.skip(2, "status").unwrap();
        let hi = r.bytes(2, "caps").unwrap();
        let caps = u32::from_le_bytes([lo[0], lo[1], hi[0], hi[1]]);
        assert_eq!(caps, SERVER_CAPABILITIES);
        assert_eq!(r.u8("scramble len").unwrap(), 21);
        r.skip(10, "reserved").unwrap();
        assert_eq!(r.nul_bytes("scramble").unwrap(), &greeting.scramble[8..]);
        assert_eq!(r.nul_str("plugin").unwrap(), AUTH_PLUGIN_NAME);
        assert!(r.is_empty());
    }

    #[test]
    fn test_capabilities() {
        let caps = SERVER_CAPABILITIES;
        assert!(caps & capabilities::CLIENT_PROTOCOL_41 != 0);
        assert!(caps & capabilities::CLIENT_MULTI_STATEMENTS != 0);
        assert!(caps & capabilities::CLIENT_MULTI_RESULTS != 0);
        assert!(caps & capabilities::CLIENT_PLUGIN_AUTH != 0);
        assert!(caps & capabilities::CLIENT_DEPRECATE_EOF == 0);
        assert!(caps & capabilities::CLIENT_SSL == 0);
    }

    #[test]
    fn test_auth_switch() {
        let packet = encode_auth_switch(&[7; 20]);
        assert_eq!(packet[0], 0xfe);
        assert!(packet[1..].starts_with(b"mysql_native_password\0"));
        assert_eq!(packet.len(), 1 + 22 + 20 + 1);
    }
}
