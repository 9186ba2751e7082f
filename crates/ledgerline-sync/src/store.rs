//! The single writer of a table's state.
//!
//! Sync tasks on any thread hold a [`Dispatcher`] and queue commands; the
//! owner of the [`Store`] applies them in arrival order with
//! [`Store::drain`]. Recalculation happens inside each reduce step, so the
//! state after every applied command is fully consistent.

use crossbeam_channel::{Receiver, Sender, unbounded};
use ledgerline_core::event::ChangeEvent;
use ledgerline_core::reducer::{ReduceError, reduce};
use ledgerline_core::state::TableState;
use tracing::{debug, warn};

use crate::error::SyncError;

#[derive(Debug)]
pub enum Command {
    Event(ChangeEvent),
    /// Replace the whole state with a fresh fetch.
    Reset(Box<TableState>),
}

/// Queue handle for sync tasks. Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct Dispatcher(Sender<Command>);

impl Dispatcher {
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] once the store is gone.
    pub fn emit(&self, event: ChangeEvent) -> Result<(), SyncError> {
        debug!(event = event.kind(), "queueing event");
        self.0.send(Command::Event(event)).map_err(|_| SyncError::Closed)
    }

    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] once the store is gone.
    pub fn reset(&self, state: TableState) -> Result<(), SyncError> {
        self.0
            .send(Command::Reset(Box::new(state)))
            .map_err(|_| SyncError::Closed)
    }
}

/// An event the reducer refused while draining.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub kind: &'static str,
    pub error: ReduceError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Drained {
    pub applied: usize,
    pub resets: usize,
    pub rejected: Vec<Rejected>,
}

#[derive(Debug)]
pub struct Store {
    state: TableState,
    tx: Sender<Command>,
    rx: Receiver<Command>,
}

impl Store {
    #[must_use]
    pub fn new(state: TableState) -> Self {
        let (tx, rx) = unbounded();
        Self { state, tx, rx }
    }

    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher(self.tx.clone())
    }

    #[must_use]
    pub const fn state(&self) -> &TableState {
        &self.state
    }

    #[must_use]
    pub fn into_state(self) -> TableState {
        self.state
    }

    /// Apply a user action now, after anything already queued.
    ///
    /// # Errors
    ///
    /// Returns the reducer's error; the state is left unchanged.
    pub fn dispatch(&mut self, event: &ChangeEvent) -> Result<&TableState, ReduceError> {
        self.drain();
        self.state = reduce(&self.state, event)?;
        Ok(&self.state)
    }

    /// Apply every queued command in order.
    pub fn drain(&mut self) -> Drained {
        let mut report = Drained::default();
        while let Ok(command) = self.rx.try_recv() {
            match command {
                Command::Event(event) => match reduce(&self.state, &event) {
                    Ok(next) => {
                        self.state = next;
                        report.applied += 1;
                    }
                    Err(error) => {
                        warn!(event = event.kind(), code = %error.code(), "dropping queued event: {error}");
                        report.rejected.push(Rejected {
                            kind: event.kind(),
                            error,
                        });
                    }
                },
                Command::Reset(state) => {
                    self.state = *state;
                    report.resets += 1;
                }
            }
        }
        if report.applied + report.resets > 0 {
            debug!(applied = report.applied, resets = report.resets, "drained queue");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerline_core::event::NewRow;
    use ledgerline_core::model::{RowId, Scope, ScopeKind};
    use ledgerline_core::rows::RowOptions;

    fn empty() -> TableState {
        TableState::empty(Scope::new(ScopeKind::Account, 1), RowOptions::default())
    }

    #[test]
    fn queued_events_apply_in_order() {
        let mut store = Store::new(empty());
        let dispatcher = store.dispatcher();
        dispatcher
            .emit(ChangeEvent::RowAdd {
                rows: vec![NewRow::default(), NewRow::default()],
            })
            .expect("emit");
        dispatcher
            .emit(ChangeEvent::RowDelete {
                ids: vec!["placeholder-1".parse::<RowId>().expect("row id")],
            })
            .expect("emit");

        let report = store.drain();
        assert_eq!(report.applied, 2);
        assert_eq!(store.state().rows.len(), 1);
    }

    #[test]
    fn rejected_events_are_reported_and_skipped() {
        let mut store = Store::new(empty());
        store
            .dispatcher()
            .emit(ChangeEvent::RowInsert {
                previous: RowId::model(99),
                row: NewRow::default(),
            })
            .expect("emit");
        let report = store.drain();
        assert_eq!(report.applied, 0);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].kind, "row_insert");
        assert_eq!(store.state(), &empty());
    }

    #[test]
    fn dispatch_runs_after_queued_commands() {
        let mut store = Store::new(empty());
        store
            .dispatcher()
            .emit(ChangeEvent::RowAdd {
                rows: vec![NewRow::default()],
            })
            .expect("emit");
        let state = store
            .dispatch(&ChangeEvent::RowInsert {
                previous: "placeholder-1".parse().expect("row id"),
                row: NewRow::default(),
            })
            .expect("insert after queued row");
        assert_eq!(state.rows.len(), 2);
    }

    #[test]
    fn reset_replaces_state() {
        let mut store = Store::new(empty());
        let mut fresh = empty();
        fresh.scope = Scope::new(ScopeKind::Account, 2);
        store.dispatcher().reset(fresh.clone()).expect("reset");
        assert_eq!(store.drain().resets, 1);
        assert_eq!(store.state(), &fresh);
    }

    #[test]
    fn closed_store_rejects_dispatch() {
        let dispatcher = Store::new(empty()).dispatcher();
        assert!(matches!(
            dispatcher.emit(ChangeEvent::RowDelete { ids: vec![] }),
            Err(SyncError::Closed)
        ));
    }
}
