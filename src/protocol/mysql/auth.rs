//! MySQL authentication
//!
//! Implements mysql_native_password. Accounts store the MySQL-style hash
//! `*HEX(SHA1(SHA1(password)))`, or an empty string for no password.

use sha1::{Digest, Sha1};

use super::error::{ProtocolError, ProtocolResult};
use super::handshake::capabilities;
use super::packet::PayloadReader;

/// Handshake response from client (Protocol 4.1)
#[derive(Debug)]
pub struct HandshakeResponse41 {
    pub capability_flags: u32,
    pub max_packet_size: u32,
    pub character_set: u8,
    pub username: String,
    /// Scrambled password, raw bytes
    pub auth_response: Vec<u8>,
    /// Database name (if CLIENT_CONNECT_WITH_DB)
    pub database: Option<String>,
    /// Auth plugin name (if CLIENT_PLUGIN_AUTH)
    pub auth_plugin_name: Option<String>,
}

impl HandshakeResponse41 {
    pub fn parse(data: &[u8]) -> ProtocolResult<Self> {
        let mut r = PayloadReader::new(data);

        let capability_flags = r.u32_le("capability flags")?;
        if capability_flags & capabilities::CLIENT_PROTOCOL_41 == 0 {
            return Err(ProtocolError::Unsupported(
                "pre-4.1 client protocol".to_string(),
            ));
        }
        let max_packet_size = r.u32_le("max packet size")?;
        let character_set = r.u8("character set")?;
        r.skip(23, "reserved filler")?;

        let username = r.nul_str("username")?;
        let has = |cap: u32| capability_flags & cap != 0;

        let auth_response = if has(capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA) {
            r.lenenc_bytes("auth response")?
        } else if has(capabilities::CLIENT_SECURE_CONNECTION) {
            if r.is_empty() {
                &[][..]
            } else {
                let len = r.u8("auth response length")? as usize;
                r.bytes(len, "auth response")?
            }
        } else {
            r.nul_bytes("auth response")?
        }
        .to_vec();

        let database = if has(capabilities::CLIENT_CONNECT_WITH_DB) && !r.is_empty() {
            Some(r.nul_str("database")?).filter(|db| !db.is_empty())
        } else {
            None
        };

        let auth_plugin_name = if has(capabilities::CLIENT_PLUGIN_AUTH) && !r.is_empty() {
            Some(r.nul_str("auth plugin")?).filter(|name| !name.is_empty())
        } else {
            None
        };

        // connection attributes are ignored
        Ok(HandshakeResponse41 {
            capability_flags,
            max_packet_size,
            character_set,
            username,
            auth_response,
            database,
            auth_plugin_name,
        })
    }

    /// Check if client requested a specific capability
    pub fn has_capability(&self, cap: u32) -> bool {
        self.capability_flags & cap != 0
    }
}

fn sha1(parts: &[&[u8]]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Stored form of a password: `*` + uppercase hex of SHA1(SHA1(password))
pub fn compute_password_hash(password: &str) -> String {
    if password.is_empty() {
        return String::new();
    }
    let stage2 = sha1(&[&sha1(&[password.as_bytes()])]);
    let mut out = String::with_capacity(41);
    out.push('*');
    for b in stage2 {
        out.push_str(&format!("{:02X}", b));
    }
    out
}

fn decode_password_hash(hash: &str) -> Option<[u8; 20]> {
    let hex = hash.strip_prefix('*')?;
    if hex.len() != 40 {
        return None;
    }
    let mut out = [0u8; 20];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok()?;
    }
    Some(out)
}

/// Verify a mysql_native_password response against a stored hash.
///
/// The client sends `SHA1(pw) XOR SHA1(scramble || SHA1(SHA1(pw)))`.
/// XOR with `SHA1(scramble || stored)` recovers `SHA1(pw)`, whose SHA1 must
/// equal the stored stage-2 hash.
pub fn verify_native_password_hash(scramble: &[u8], stored_hash: &str, auth_response: &[u8]) -> bool {
    if stored_hash.is_empty() {
        return auth_response.is_empty();
    }
    if auth_response.len() != 20 {
        return false;
    }
    let Some(stage2) = decode_password_hash(stored_hash) else {
        return false;
    };

    let mask = sha1(&[scramble, &stage2]);
    let mut stage1 = [0u8; 20];
    for (i, b) in stage1.iter_mut().enumerate() {
        *b = auth_response[i] ^ mask[i];
    }

    sha1(&[&stage1]) == stage2
}

/// Client-side mysql_native_password response
pub fn scramble_password(scramble: &[u8], password: &str) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let stage1 = sha1(&[password.as_bytes()]);
    let stage2 = sha1(&[&stage1]);
    let mask = sha1(&[scramble, &stage2]);
    stage1.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect()
}
