//! Connection-level protocol errors
//!
//! SQL failures never surface here; the connection turns them into ERR
//! packets and keeps serving. Every variant ends the connection.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum ProtocolError {
    Io(io::Error),
    /// Malformed or out-of-sequence packet
    InvalidPacket(String),
    /// Credentials rejected; the ERR packet was already written
    AuthFailed(String),
    Unsupported(String),
    /// Peer went away between packets
    ConnectionClosed,
}

impl ProtocolError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ProtocolError::InvalidPacket(msg.into())
    }

    /// Whether the error only means the client is gone
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::ConnectionClosed => true,
            ProtocolError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Io(e) => write!(f, "socket error: {}", e),
            ProtocolError::InvalidPacket(msg) => write!(f, "malformed packet: {}", msg),
            ProtocolError::AuthFailed(msg) => write!(f, "access denied: {}", msg),
            ProtocolError::Unsupported(msg) => write!(f, "not supported: {}", msg),
            ProtocolError::ConnectionClosed => f.write_str("client closed the connection"),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        ProtocolError::Io(e)
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_classification() {
        assert!(ProtocolError::ConnectionClosed.is_disconnect());
        assert!(ProtocolError::from(io::Error::from(io::ErrorKind::BrokenPipe)).is_disconnect());
        assert!(!ProtocolError::from(io::Error::from(io::ErrorKind::PermissionDenied)).is_disconnect());
        assert!(!ProtocolError::invalid("bad").is_disconnect());
    }
}
