//! SQL layer - tokenizing and parsing
//!
//! - `lexer`: normalizes the sqlparser tokenizer output for MySQL text
//! - `Parser`: recursive-descent parser producing the internal AST

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use error::{SqlError, SqlResult};
pub use parser::Parser;
