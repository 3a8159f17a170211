//! Response packets: OK, ERR, EOF and text result sets
//!
//! Result sets always end with an EOF packet; DEPRECATE_EOF is never
//! negotiated.

use std::iter;

use crate::executor::{OutputColumn, Row};

use super::handshake::status_flags;
use super::packet::{put_lenenc_int, put_lenenc_str};
use super::types::{
    datatype_charset, datatype_column_length, datatype_flags, datatype_to_protocol,
    put_text_cell, ColumnType,
};

const OK_HEADER: u8 = 0x00;
const EOF_HEADER: u8 = 0xfe;
const ERR_HEADER: u8 = 0xff;

/// Column definition (Protocol::ColumnDefinition41).
///
/// Columns are never aliased at the storage level, so the original table
/// and column names repeat the visible ones.
#[derive(Debug)]
pub struct ColumnDefinition41 {
    /// Database; empty for computed columns
    pub schema: String,
    pub table: String,
    pub name: String,
    pub character_set: u16,
    pub column_length: u32,
    pub column_type: ColumnType,
    pub flags: u16,
    pub decimals: u8,
}

impl ColumnDefinition41 {
    pub fn from_output_column(col: &OutputColumn, schema: &str) -> Self {
        ColumnDefinition41 {
            schema: if col.table.is_empty() {
                String::new()
            } else {
                schema.to_string()
            },
            table: col.table.clone(),
            name: col.name.clone(),
            character_set: datatype_charset(&col.data_type),
            column_length: datatype_column_length(&col.data_type),
            column_type: datatype_to_protocol(&col.data_type),
            flags: datatype_flags(&col.data_type, col.nullable),
            decimals: 0,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + 2 * (self.table.len() + self.name.len()));
        for part in [
            "def",
            &self.schema,
            &self.table,
            &self.table,
            &self.name,
            &self.name,
        ] {
            put_lenenc_str(&mut buf, part);
        }

        // fixed-length block: charset, length, type, flags, decimals, filler
        buf.push(0x0c);
        buf.extend_from_slice(&self.character_set.to_le_bytes());
        buf.extend_from_slice(&self.column_length.to_le_bytes());
        buf.push(self.column_type as u8);
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.push(self.decimals);
        buf.extend_from_slice(&[0, 0]);
        buf
    }
}

pub fn encode_ok_packet(affected_rows: u64, last_insert_id: u64, status: u16, warnings: u16) -> Vec<u8> {
    let mut buf = vec![OK_HEADER];
    put_lenenc_int(&mut buf, affected_rows);
    put_lenenc_int(&mut buf, last_insert_id);
    buf.extend_from_slice(&status.to_le_bytes());
    buf.extend_from_slice(&warnings.to_le_bytes());
    buf
}

/// ERR packet; the SQL state is cut or zero-padded to five characters
pub fn encode_err_packet(error_code: u16, sql_state: &str, message: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9 + message.len());
    buf.push(ERR_HEADER);
    buf.extend_from_slice(&error_code.to_le_bytes());
    buf.push(b'#');
    buf.extend(sql_state.bytes().chain(iter::repeat(b'0')).take(5));
    buf.extend_from_slice(message.as_bytes());
    buf
}

pub fn encode_eof_packet(warnings: u16, status: u16) -> Vec<u8> {
    let mut buf = vec![EOF_HEADER];
    buf.extend_from_slice(&warnings.to_le_bytes());
    buf.extend_from_slice(&status.to_le_bytes());
    buf
}

/// One text-protocol row
pub fn encode_text_row(row: &Row, columns: &[OutputColumn]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (datum, col) in row.iter().zip(columns) {
        put_text_cell(&mut buf, datum, &col.data_type);
    }
    buf
}

pub fn encode_column_count(count: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1);
    put_lenenc_int(&mut buf, count);
    buf
}

/// Status flags for a response; `more` marks a result that another one from
/// the same batch follows
pub fn server_status(more: bool) -> u16 {
    let status = status_flags::SERVER_STATUS_AUTOCOMMIT;
    if more {
        status | status_flags::SERVER_MORE_RESULTS_EXISTS
    } else {
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataType;
    use crate::executor::Datum;

    fn column(name: &str, data_type: DataType) -> OutputColumn {
        OutputColumn {
            name: name.to_string(),
            table: "students".to_string(),
            data_type,
            nullable: true,
        }
    }

    #[test]
    fn test_column_definition_encode() {
        let col = OutputColumn {
            nullable: false,
            ..column("id", DataType::Int)
        };

        let def = ColumnDefinition41::from_output_column(&col, "test");
        assert_eq!(def.table, "students");
        assert_eq!(def.schema, "test");
        let encoded = def.encode();

        assert!(encoded.starts_with(&[3, b'd', b'e', b'f', 4, b't', b'e', b's', b't']));
        // fixed block follows the six names
        let fixed = &encoded[encoded.len() - 13..];
        assert_eq!(fixed[0], 0x0c);
        assert_eq!(fixed[7], ColumnType::Long as u8);

        let computed = OutputColumn {
            table: String::new(),
            ..column("1", DataType::BigInt)
        };
        assert_eq!(ColumnDefinition41::from_output_column(&computed, "test").schema, "");
    }

    #[test]
    fn test_more_results_flag() {
        assert_eq!(server_status(false) & status_flags::SERVER_MORE_RESULTS_EXISTS, 0);
        assert_ne!(server_status(true) & status_flags::SERVER_MORE_RESULTS_EXISTS, 0);
    }

    #[test]
    fn test_ok_packet() {
        let packet = encode_ok_packet(5, 10, status_flags::SERVER_STATUS_AUTOCOMMIT, 0);

        assert_eq!(packet[0], 0x00); // OK header
        assert_eq!(packet[1], 5); // affected_rows
        assert_eq!(packet[2], 10); // last_insert_id
    }

    #[test]
    fn test_err_packet() {
        let packet = encode_err_packet(1064, "42000", "Syntax error");

        assert_eq!(packet[0], 0xff); // ERR header
        assert_eq!(u16::from_le_bytes([packet[1], packet[2]]), 1064);
        assert_eq!(packet[3], b'#'); // sql_state_marker
        assert_eq!(&packet[4..9], b"42000");
        assert_eq!(&packet[9..], b"Syntax error");

        let short = encode_err_packet(1105, "HY", "x");
        assert_eq!(&short[4..9], b"HY000");
    }

    #[test]
    fn test_eof_packet() {
        let packet = encode_eof_packet(0, status_flags::SERVER_STATUS_AUTOCOMMIT);

        assert_eq!(packet[0], 0xfe); // EOF header
        assert_eq!(packet.len(), 5);
    }

    #[test]
    fn test_text_row() {
        let row = vec![
            Datum::Int(42),
            Datum::String("hello".to_string()),
            Datum::Null,
        ];
        let columns = vec![
            column("a", DataType::Int),
            column("b", DataType::Text),
            column("c", DataType::Int),
        ];

        let encoded = encode_text_row(&row, &columns);
        assert_eq!(
            encoded,
            vec![2, b'4', b'2', 5, b'h', b'e', b'l', b'l', b'o', 0xfb]
        );
    }
}
