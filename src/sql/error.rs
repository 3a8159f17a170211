//! SQL front-end errors

use sqlparser::tokenizer::TokenizerError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SqlError {
    /// Malformed input; carries the text where parsing stopped
    #[error("syntax error near '{0}'")]
    Parse(String),

    /// Well-formed, but outside the dialect this server executes
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<TokenizerError> for SqlError {
    fn from(err: TokenizerError) -> Self {
        SqlError::Parse(err.message)
    }
}

pub type SqlResult<T> = Result<T, SqlError>;
