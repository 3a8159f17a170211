//! Token stream for the parser
//!
//! Wraps the sqlparser tokenizer, drops whitespace and comments, and folds
//! `@name` / `@@name` into variable tokens.

use std::any::TypeId;

use sqlparser::dialect::{Dialect, MySqlDialect};
use sqlparser::tokenizer::{Token as RawToken, Tokenizer};

use super::error::SqlResult;

/// MySQL tokenization, except that '@' never starts an identifier.
///
/// Keeps `'user'@'host'` as three tokens; variables are rebuilt below.
#[derive(Debug)]
struct MemDbDialect;

impl Dialect for MemDbDialect {
    fn dialect(&self) -> TypeId {
        TypeId::of::<MySqlDialect>()
    }

    fn is_identifier_start(&self, ch: char) -> bool {
        ch != '@' && MySqlDialect {}.is_identifier_start(ch)
    }

    fn is_identifier_part(&self, ch: char) -> bool {
        ch != '@' && MySqlDialect {}.is_identifier_part(ch)
    }

    fn is_delimited_identifier_start(&self, ch: char) -> bool {
        ch == '`'
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier or keyword; `quoted` for backtick identifiers
    Word { value: String, quoted: bool },
    /// Numeric literal text
    Number(String),
    /// String literal (quotes removed, escapes resolved)
    String(String),
    /// `@@name` (system) or `@name` (user)
    Variable { system: bool, name: String },
    /// Operator or punctuation, as written
    Punct(String),
}

impl Token {
    /// Unquoted word matching a keyword (case-insensitive)
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word { value, quoted: false } if value.eq_ignore_ascii_case(keyword))
    }

    pub fn is_punct(&self, p: &str) -> bool {
        matches!(self, Token::Punct(s) if s == p)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Word {
                value,
                quoted: true,
            } => write!(f, "`{}`", value),
            Token::Word { value, .. } => write!(f, "{}", value),
            Token::Number(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "'{}'", s),
            Token::Variable { system: true, name } => write!(f, "@@{}", name),
            Token::Variable { system: false, name } => write!(f, "@{}", name),
            Token::Punct(p) => write!(f, "{}", p),
        }
    }
}

/// Tokenize SQL text
pub fn tokenize(sql: &str) -> SqlResult<Vec<Token>> {
    let dialect = MemDbDialect;
    let raw = Tokenizer::new(&dialect, sql).tokenize()?;

    let mut tokens = Vec::with_capacity(raw.len());
    let mut iter = raw.into_iter().peekable();

    while let Some(tok) = iter.next() {
        match tok {
            RawToken::Whitespace(_) | RawToken::EOF => {}
            RawToken::Word(w) if w.quote_style.is_none() && w.value.starts_with('@') => {
                tokens.push(at_word(&w.value));
            }
            RawToken::Word(w) => tokens.push(Token::Word {
                value: w.value,
                quoted: w.quote_style.is_some(),
            }),
            RawToken::Number(n, _) => tokens.push(Token::Number(n)),
            RawToken::SingleQuotedString(s) | RawToken::DoubleQuotedString(s) => {
                tokens.push(Token::String(s))
            }
            other => {
                let text = other.to_string();
                if text == "@" || text == "@@" {
                    // Standalone '@' followed by a word forms a variable
                    let mut prefix = text;
                    while matches!(iter.peek(), Some(t) if t.to_string() == "@") {
                        iter.next();
                        prefix.push('@');
                    }
                    match iter.peek() {
                        Some(RawToken::Word(w)) if w.quote_style.is_none() => {
                            let joined = format!("{}{}", prefix, w.value);
                            iter.next();
                            tokens.push(at_word(&joined));
                        }
                        _ => tokens.push(Token::Punct(prefix)),
                    }
                } else {
                    tokens.push(Token::Punct(text));
                }
            }
        }
    }

    Ok(tokens)
}

/// Classify a word that begins with '@'
fn at_word(value: &str) -> Token {
    let name = value.trim_start_matches('@');
    let ats = value.len() - name.len();
    if name.is_empty() {
        return Token::Punct(value.to_string());
    }
    Token::Variable {
        system: ats >= 2,
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokens() {
        let tokens = tokenize("SELECT a, 'x' FROM `t` WHERE b >= 10").unwrap();
        assert!(tokens[0].is_keyword("select"));
        assert_eq!(tokens[3], Token::String("x".to_string()));
        assert_eq!(
            tokens[5],
            Token::Word {
                value: "t".to_string(),
                quoted: true
            }
        );
        assert!(!tokens[5].is_keyword("t"));
        assert!(tokens[8].is_punct(">="));
        assert_eq!(tokens[9], Token::Number("10".to_string()));
    }

    #[test]
    fn test_variables() {
        let tokens = tokenize("SELECT @@time_zone, @x").unwrap();
        assert_eq!(
            tokens[1],
            Token::Variable {
                system: true,
                name: "time_zone".to_string()
            }
        );
        assert_eq!(
            tokens[3],
            Token::Variable {
                system: false,
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn test_scoped_variable() {
        let tokens = tokenize("SELECT @@global.time_zone").unwrap();
        assert_eq!(
            tokens[1],
            Token::Variable {
                system: true,
                name: "global".to_string()
            }
        );
        assert!(tokens[2].is_punct("."));
        assert!(tokens[3].is_keyword("time_zone"));
    }

    #[test]
    fn test_account_name() {
        let tokens = tokenize("CREATE USER 'readonly'@'%'").unwrap();
        assert_eq!(tokens[2], Token::String("readonly".to_string()));
        assert!(tokens[3].is_punct("@"));
        assert_eq!(tokens[4], Token::String("%".to_string()));
    }

    #[test]
    fn test_comments_are_dropped() {
        let tokens = tokenize("-- heading\nSELECT 1 /* inline */ ;").unwrap();
        assert_eq!(tokens.len(), 3);
        assert!(tokens[2].is_punct(";"));
    }
}
