//! Query execution engine
//!
//! Evaluates parsed statements against the catalog and the mock store.
//! Every statement runs to completion while holding short-lived locks;
//! there is no transaction machinery.

pub mod datum;
pub mod engine;
pub mod error;
pub mod eval;
pub mod session;
pub mod time;
pub mod variables;

pub use datum::Datum;
pub use engine::{Engine, EngineOptions, OutputColumn, QueryResult};
pub use error::{EngineError, EngineResult};
pub use session::Session;
pub use time::TimeZoneSpec;

/// A stored or produced row
pub type Row = Vec<Datum>;
