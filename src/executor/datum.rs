//! Datum type - runtime values in the executor

use std::cmp::Ordering;

use chrono::NaiveDateTime;

use super::time::{format_date, format_datetime, parse_datetime};
use crate::catalog::DataType;
use crate::sql::Literal;

/// A single value in a row
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Datum {
    #[default]
    Null,
    /// Integer value (covers BOOLEAN, INT, BIGINT)
    Int(i64),
    Double(f64),
    String(String),
    /// Date and time without zone; TIMESTAMP columns store UTC
    DateTime(NaiveDateTime),
}

/// Why a value could not be stored in a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoerceError {
    /// Not convertible to the column's type
    Incorrect { type_name: &'static str, value: String },
    /// Longer than the column allows
    TooLong,
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Create a Datum from a Literal
    pub fn from_literal(lit: &Literal) -> Self {
        match lit {
            Literal::Null => Datum::Null,
            Literal::Boolean(b) => Datum::Int(i64::from(*b)),
            Literal::Integer(i) => Datum::Int(*i),
            Literal::Float(f) => Datum::Double(*f),
            Literal::String(s) => Datum::String(s.clone()),
        }
    }

    /// Numeric view, MySQL style: strings parse their leading number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Null => None,
            Datum::Int(i) => Some(*i as f64),
            Datum::Double(f) => Some(*f),
            Datum::String(s) => Some(leading_number(s)),
            Datum::DateTime(dt) => format_compact(dt).parse().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int(i) => Some(*i),
            other => other.as_f64().map(|f| f.round() as i64),
        }
    }

    /// SQL truth value; NULL is unknown
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Datum::Null => None,
            Datum::Int(i) => Some(*i != 0),
            other => other.as_f64().map(|f| f != 0.0),
        }
    }

    pub fn from_bool(b: Option<bool>) -> Self {
        match b {
            Some(b) => Datum::Int(i64::from(b)),
            None => Datum::Null,
        }
    }

    /// Text form as sent to clients; `None` for NULL
    pub fn to_text(&self, data_type: Option<&DataType>) -> Option<String> {
        match self {
            Datum::Null => None,
            Datum::Int(i) => Some(i.to_string()),
            Datum::Double(f) => Some(format_double(*f)),
            Datum::String(s) => Some(s.clone()),
            Datum::DateTime(dt) => match data_type {
                Some(DataType::Date) => Some(format_date(dt)),
                _ => Some(format_datetime(dt)),
            },
        }
    }

    /// Value as it appears in error messages
    pub fn display(&self) -> String {
        self.to_text(None).unwrap_or_else(|| "NULL".to_string())
    }

    /// SQL comparison; `None` when either side is NULL
    pub fn sql_cmp(&self, other: &Datum) -> Option<Ordering> {
        match (self, other) {
            (Datum::Null, _) | (_, Datum::Null) => None,
            (Datum::Int(a), Datum::Int(b)) => Some(a.cmp(b)),
            (Datum::String(a), Datum::String(b)) => Some(a.cmp(b)),
            (Datum::DateTime(a), Datum::DateTime(b)) => Some(a.cmp(b)),
            (Datum::DateTime(a), Datum::String(s)) => {
                parse_datetime(s).map(|b| a.cmp(&b))
            }
            (Datum::String(s), Datum::DateTime(b)) => {
                parse_datetime(s).map(|a| a.cmp(b))
            }
            (a, b) => Some(a.as_f64()?.total_cmp(&b.as_f64()?)),
        }
    }

    /// Ordering for ORDER BY; NULLs sort first
    pub fn sort_cmp(&self, other: &Datum) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.sql_cmp(other).unwrap_or(Ordering::Equal),
        }
    }

    /// Check if string matches pattern (SQL LIKE)
    pub fn like(&self, pattern: &Datum) -> Option<bool> {
        if self.is_null() || pattern.is_null() {
            return None;
        }
        let s = self.display();
        let p = pattern.display();
        let s_chars: Vec<char> = s.chars().collect();
        let p_chars: Vec<char> = p.chars().collect();
        Some(like_match(&s_chars, &p_chars))
    }

    /// Convert to the storage form of a column type
    pub fn coerce(self, data_type: &DataType) -> Result<Datum, CoerceError> {
        if self.is_null() {
            return Ok(Datum::Null);
        }
        match data_type {
            DataType::Boolean | DataType::Int | DataType::BigInt => match self {
                Datum::Int(i) => Ok(Datum::Int(i)),
                Datum::Double(f) => Ok(Datum::Int(f.round() as i64)),
                Datum::String(s) => match s.trim().parse::<f64>() {
                    Ok(f) => Ok(Datum::Int(f.round() as i64)),
                    Err(_) => Err(CoerceError::Incorrect {
                        type_name: "integer",
                        value: s,
                    }),
                },
                other => Err(CoerceError::Incorrect {
                    type_name: "integer",
                    value: other.display(),
                }),
            },
            DataType::Double => match self {
                Datum::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Datum::Double)
                    .map_err(|_| CoerceError::Incorrect {
                        type_name: "decimal",
                        value: s,
                    }),
                other => other
                    .as_f64()
                    .map(Datum::Double)
                    .ok_or(CoerceError::Incorrect {
                        type_name: "decimal",
                        value: String::new(),
                    }),
            },
            DataType::Varchar(max) => {
                let s = self.display();
                if s.chars().count() > *max as usize {
                    return Err(CoerceError::TooLong);
                }
                Ok(Datum::String(s))
            }
            DataType::Text => Ok(Datum::String(self.display())),
            DataType::Date | DataType::Datetime | DataType::Timestamp => {
                let dt = match self {
                    Datum::DateTime(dt) => Some(dt),
                    Datum::String(ref s) => parse_datetime(s),
                    _ => None,
                };
                match dt {
                    Some(dt) if *data_type == DataType::Date => {
                        Ok(Datum::DateTime(dt.date().and_time(chrono::NaiveTime::MIN)))
                    }
                    Some(dt) => Ok(Datum::DateTime(dt)),
                    None => Err(CoerceError::Incorrect {
                        type_name: if *data_type == DataType::Date {
                            "date"
                        } else {
                            "datetime"
                        },
                        value: self.display(),
                    }),
                }
            }
        }
    }

    /// Result column type for a computed value
    pub fn inferred_type(&self) -> DataType {
        match self {
            Datum::Int(_) => DataType::BigInt,
            Datum::Double(_) => DataType::Double,
            Datum::DateTime(_) => DataType::Datetime,
            Datum::Null | Datum::String(_) => DataType::Varchar(255),
        }
    }
}

fn format_double(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

fn format_compact(dt: &NaiveDateTime) -> String {
    dt.format("%Y%m%d%H%M%S").to_string()
}

/// Leading numeric prefix of a string, 0 if none
fn leading_number(s: &str) -> f64 {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        if c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')) {
            end = i + c.len_utf8();
        } else if c == '.' && !seen_dot {
            seen_dot = true;
            end = i + 1;
        } else {
            break;
        }
    }
    s[..end].parse().unwrap_or(0.0)
}

/// SQL LIKE: % matches any sequence, _ matches one character
fn like_match(s: &[char], p: &[char]) -> bool {
    if p.is_empty() {
        return s.is_empty();
    }

    match p[0] {
        '%' => (0..=s.len()).any(|i| like_match(&s[i..], &p[1..])),
        '_' => !s.is_empty() && like_match(&s[1..], &p[1..]),
        '\\' if p.len() > 1 => !s.is_empty() && s[0] == p[1] && like_match(&s[1..], &p[2..]),
        c => !s.is_empty() && s[0] == c && like_match(&s[1..], &p[1..]),
    }
}
