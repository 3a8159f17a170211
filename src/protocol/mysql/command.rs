//! Command-phase packet decoding
//!
//! Only the commands a test client sends are decoded. Any other command
//! byte comes back as `Unsupported` and is answered with an error.

use super::error::{ProtocolError, ProtocolResult};

const COM_QUIT: u8 = 0x01;
const COM_INIT_DB: u8 = 0x02;
const COM_QUERY: u8 = 0x03;
const COM_PING: u8 = 0x0e;
const COM_STMT_PREPARE: u8 = 0x16;
const COM_STMT_CLOSE: u8 = 0x19;
const COM_RESET_CONNECTION: u8 = 0x1f;

#[derive(Debug)]
pub enum ParsedCommand {
    Quit,
    InitDb(String),
    Query(String),
    Ping,
    /// Prepared statements are rejected
    StmtPrepare,
    /// Gets no reply
    StmtClose,
    ResetConnection,
    Unsupported(u8),
}

pub fn parse_command(packet: &[u8]) -> ProtocolResult<ParsedCommand> {
    let (&code, payload) = packet
        .split_first()
        .ok_or_else(|| ProtocolError::invalid("empty command packet"))?;

    Ok(match code {
        COM_QUIT => ParsedCommand::Quit,
        COM_INIT_DB => ParsedCommand::InitDb(text(payload, "database name")?),
        COM_QUERY => ParsedCommand::Query(text(payload, "query")?),
        COM_PING => ParsedCommand::Ping,
        COM_STMT_PREPARE => ParsedCommand::StmtPrepare,
        COM_STMT_CLOSE => ParsedCommand::StmtClose,
        COM_RESET_CONNECTION => ParsedCommand::ResetConnection,
        other => ParsedCommand::Unsupported(other),
    })
}

fn text(payload: &[u8], what: &str) -> ProtocolResult<String> {
    std::str::from_utf8(payload)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::invalid(format!("{} is not UTF-8", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_commands() {
        match parse_command(b"\x03SELECT 1").unwrap() {
            ParsedCommand::Query(sql) => assert_eq!(sql, "SELECT 1"),
            other => panic!("expected Query, got {:?}", other),
        }
        match parse_command(b"\x02school").unwrap() {
            ParsedCommand::InitDb(db) => assert_eq!(db, "school"),
            other => panic!("expected InitDb, got {:?}", other),
        }
        assert!(parse_command(b"\x03\xff\xfe").is_err());
    }

    #[test]
    fn test_bare_commands() {
        assert!(matches!(parse_command(&[0x01]).unwrap(), ParsedCommand::Quit));
        assert!(matches!(parse_command(&[0x0e]).unwrap(), ParsedCommand::Ping));
        assert!(matches!(
            parse_command(&[0x19, 1, 0, 0, 0]).unwrap(),
            ParsedCommand::StmtClose
        ));
    }

    #[test]
    fn test_unknown_commands() {
        assert!(matches!(
            parse_command(&[0x11]).unwrap(),
            ParsedCommand::Unsupported(0x11)
        ));
        assert!(matches!(
            parse_command(&[0xff]).unwrap(),
            ParsedCommand::Unsupported(0xff)
        ));
        assert!(parse_command(&[]).is_err());
    }
}
