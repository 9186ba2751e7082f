//! ledgerline-sync library.
//!
//! Keeps a table's local state and the budget API in step. The editing
//! surface applies user events to a [`store::Store`] and submits them to a
//! [`task::TableSync`], which sends bulk requests through an injected
//! [`api::BudgetApi`] and queues the server's answers back into the store.
//!
//! # Conventions
//!
//! - **Threads**: API calls block; run them on worker threads. Only the
//!   store's owner mutates state, by draining the queue.
//! - **Errors**: request failures become [`notify::Notification`]s;
//!   [`error::SyncError`] is reserved for contract errors.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod api;
pub mod cancel;
pub mod error;
pub mod http;
pub mod identify;
pub mod memory;
pub mod notify;
pub mod store;
pub mod task;
pub mod tracker;

pub use api::{ApiError, BudgetApi};
pub use error::SyncError;
pub use store::{Dispatcher, Store};
pub use task::{Outcome, TableSync};
