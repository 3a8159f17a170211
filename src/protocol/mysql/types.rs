//! Protocol type mapping
//!
//! Maps catalog data types and datums to wire protocol types.

use super::packet::{put_lenenc_str, put_null};
use crate::catalog::DataType;
use crate::executor::Datum;

/// Protocol column types (wire protocol codes)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Tiny = 0x01,
    Long = 0x03,
    Double = 0x05,
    Null = 0x06,
    Timestamp = 0x07,
    LongLong = 0x08,
    Date = 0x0a,
    Datetime = 0x0c,
    Blob = 0xfc,
    VarString = 0xfd,
}

/// Column flags (bitmask)
pub mod column_flags {
    pub const NOT_NULL: u16 = 0x0001;
    pub const BLOB: u16 = 0x0010;
    pub const BINARY: u16 = 0x0080;
    pub const TIMESTAMP: u16 = 0x0400;
    pub const NUM: u16 = 0x8000;
}

/// Character set constants
pub mod charset {
    pub const UTF8MB4_BIN: u8 = 46;
    pub const BINARY: u8 = 63;
}

pub fn datatype_to_protocol(dt: &DataType) -> ColumnType {
    match dt {
        DataType::Boolean => ColumnType::Tiny,
        DataType::Int => ColumnType::Long,
        DataType::BigInt => ColumnType::LongLong,
        DataType::Double => ColumnType::Double,
        DataType::Varchar(_) => ColumnType::VarString,
        DataType::Text => ColumnType::Blob,
        DataType::Date => ColumnType::Date,
        DataType::Datetime => ColumnType::Datetime,
        DataType::Timestamp => ColumnType::Timestamp,
    }
}

/// Display width in characters
pub fn datatype_column_length(dt: &DataType) -> u32 {
    match dt {
        DataType::Boolean => 1,
        DataType::Int => 11,
        DataType::BigInt => 20,
        DataType::Double => 22,
        // utf8mb4 reserves four bytes per character
        DataType::Varchar(n) => n.saturating_mul(4),
        DataType::Text => 65535,
        DataType::Date => 10,
        DataType::Datetime | DataType::Timestamp => 19,
    }
}

pub fn datatype_flags(dt: &DataType, nullable: bool) -> u16 {
    let mut flags = 0u16;

    if !nullable {
        flags |= column_flags::NOT_NULL;
    }

    match dt {
        DataType::Boolean | DataType::Int | DataType::BigInt | DataType::Double => {
            flags |= column_flags::NUM;
        }
        DataType::Text => {
            flags |= column_flags::BLOB;
        }
        DataType::Timestamp => {
            flags |= column_flags::TIMESTAMP | column_flags::BINARY;
        }
        DataType::Date | DataType::Datetime => {
            flags |= column_flags::BINARY;
        }
        DataType::Varchar(_) => {}
    }

    flags
}

/// Charset sent in a column definition: numbers and dates are binary
pub fn datatype_charset(dt: &DataType) -> u16 {
    if dt.is_string() {
        charset::UTF8MB4_BIN as u16
    } else {
        charset::BINARY as u16
    }
}

/// Append a datum as one text-protocol row cell
pub fn put_text_cell(buf: &mut Vec<u8>, datum: &Datum, data_type: &DataType) {
    match datum.to_text(Some(data_type)) {
        None => put_null(buf),
        Some(text) => put_lenenc_str(buf, &text),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_datatype_to_protocol() {
        assert_eq!(datatype_to_protocol(&DataType::Boolean), ColumnType::Tiny);
        assert_eq!(datatype_to_protocol(&DataType::Int), ColumnType::Long);
        assert_eq!(
            datatype_to_protocol(&DataType::BigInt),
            ColumnType::LongLong
        );
        assert_eq!(
            datatype_to_protocol(&DataType::Varchar(255)),
            ColumnType::VarString
        );
        assert_eq!(
            datatype_to_protocol(&DataType::Timestamp),
            ColumnType::Timestamp
        );
    }

    fn cell(datum: &Datum, data_type: &DataType) -> Vec<u8> {
        let mut buf = Vec::new();
        put_text_cell(&mut buf, datum, data_type);
        buf
    }

    #[test]
    fn test_text_cells() {
        assert_eq!(cell(&Datum::Null, &DataType::Int), vec![0xfb]);
        assert_eq!(cell(&Datum::Int(42), &DataType::Int), vec![2, b'4', b'2']);
        assert_eq!(
            cell(&Datum::String("hello".to_string()), &DataType::Text),
            vec![5, b'h', b'e', b'l', b'l', b'o']
        );

        // the column type decides how a datetime renders
        let dt = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 30, 45)
            .unwrap();
        assert_eq!(&cell(&Datum::DateTime(dt), &DataType::Date)[1..], b"2024-01-15");
        assert_eq!(
            &cell(&Datum::DateTime(dt), &DataType::Timestamp)[1..],
            b"2024-01-15 12:30:45"
        );
    }

    #[test]
    fn test_column_flags() {
        let flags = datatype_flags(&DataType::Int, false);
        assert!(flags & column_flags::NOT_NULL != 0);
        assert!(flags & column_flags::NUM != 0);

        let nullable_flags = datatype_flags(&DataType::Int, true);
        assert!(nullable_flags & column_flags::NOT_NULL == 0);
    }
}
