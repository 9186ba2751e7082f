//! Event log replay and state digests.

use serde::Serialize;
use tracing::{info, warn};

use crate::event::ChangeEvent;
use crate::reducer::{ReduceError, reduce};
use crate::state::TableState;

/// A replay that stopped at a rejected event.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("event {index} ({kind}) rejected: {source}")]
pub struct ReplayError {
    pub index: usize,
    pub kind: &'static str,
    #[source]
    pub source: ReduceError,
}

/// Result of a replay that skips rejected events.
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    pub state: TableState,
    pub applied: usize,
    pub rejected: Vec<ReplayError>,
}

/// Fold `events` over `initial`, stopping at the first rejected event.
///
/// # Errors
///
/// Returns the index and cause of the first event the reducer rejects.
pub fn replay(initial: &TableState, events: &[ChangeEvent]) -> Result<TableState, ReplayError> {
    let mut state = initial.clone();
    for (index, event) in events.iter().enumerate() {
        state = reduce(&state, event).map_err(|source| ReplayError {
            index,
            kind: event.kind(),
            source,
        })?;
    }
    info!(events = events.len(), rows = state.rows.len(), "replay complete");
    Ok(state)
}

/// Fold `events` over `initial`, skipping events the reducer rejects.
#[must_use]
pub fn replay_lenient(initial: &TableState, events: &[ChangeEvent]) -> Replay {
    let mut state = initial.clone();
    let mut rejected = Vec::new();
    for (index, event) in events.iter().enumerate() {
        match reduce(&state, event) {
            Ok(next) => state = next,
            Err(source) => {
                warn!(index, event = event.kind(), error = %source, "skipping rejected event");
                rejected.push(ReplayError {
                    index,
                    kind: event.kind(),
                    source,
                });
            }
        }
    }
    Replay {
        applied: events.len() - rejected.len(),
        state,
        rejected,
    }
}

#[derive(Serialize)]
struct DigestView<'a> {
    rows: &'a [crate::rows::Row],
    totals: &'a crate::model::Totals,
}

/// Content hash of the row sequence and scope totals, `blake3:<hex>`.
///
/// # Errors
///
/// Returns an error if the state cannot be serialized.
pub fn digest(state: &TableState) -> Result<String, serde_json::Error> {
    let mut hasher = blake3::Hasher::new();
    serde_json::to_writer(
        &mut hasher,
        &DigestView {
            rows: &state.rows,
            totals: &state.totals,
        },
    )?;
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}
