//! ledgerline-core library.
//!
//! A headless budgeting table engine. A scope's entities become an ordered
//! row sequence ([`rows`]), edits are described as [`event::ChangeEvent`]s
//! and applied by the pure [`reducer::reduce`], which keeps derived totals
//! current through [`recalc`]. Column access rules and API payloads live in
//! [`fields`].
//!
//! # Conventions
//!
//! - **Errors**: module errors are `thiserror` enums mapping to
//!   [`error::ErrorCode`]; config loading returns `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod config;
pub mod error;
pub mod event;
pub mod fields;
pub mod invariants;
pub mod model;
pub mod order;
pub mod recalc;
pub mod reducer;
pub mod replay;
pub mod rows;
pub mod snapshot;
pub mod state;

pub use event::ChangeEvent;
pub use reducer::{ReduceError, reduce};
pub use state::TableState;
