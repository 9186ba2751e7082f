//! `ldg sync`: drive an event log through the sync tasks.
//!
//! Each user event is applied locally, submitted, and the server's answer is
//! drained back into the table before the next event, the way an editing
//! surface with one outstanding request behaves. Offline runs use an
//! in-process server seeded from the snapshot; `--remote` talks to the
//! configured API.

use anyhow::{Context, Result};
use clap::Args;
use ledgerline_core::config::EngineConfig;
use ledgerline_core::replay;
use ledgerline_sync::api::BudgetApi;
use ledgerline_sync::http::HttpApi;
use ledgerline_sync::memory::MemoryApi;
use ledgerline_sync::notify::{Notification, Notifier};
use ledgerline_sync::{Outcome, Store, TableSync};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::{RowLine, TotalsView, load_events, read_snapshot, write_rows_pretty, write_rows_text};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Snapshot JSON; seeds the offline server, or names the scope with `--remote`.
    pub snapshot: PathBuf,

    /// JSON array of user events.
    pub events: PathBuf,

    /// Use the API at `[sync].base_url` instead of an in-process server.
    #[arg(long)]
    pub remote: bool,
}

#[derive(Debug, Serialize)]
struct Step {
    index: usize,
    event: &'static str,
    #[serde(flatten)]
    outcome: Outcome,
}

#[derive(Debug, Serialize)]
struct SyncReport {
    scope: String,
    steps: Vec<Step>,
    notifications: Vec<Notification>,
    totals: TotalsView,
    digest: String,
    rows: Vec<RowLine>,
}

pub fn run_sync(args: &SyncArgs, config: &EngineConfig, output: OutputMode) -> Result<()> {
    let snapshot = read_snapshot(&args.snapshot)?;
    let scope = snapshot.scope;
    let events = load_events(&args.events)?;

    let api: Arc<dyn BudgetApi> = if args.remote {
        Arc::new(HttpApi::from_config(&config.sync).context("remote sync needs [sync].base_url")?)
    } else {
        Arc::new(MemoryApi::new().with_snapshot(&snapshot))
    };

    let mut store = Store::new(snapshot.into_state(config.rows.options())?);
    let (notifier, notifications) = Notifier::channel();
    let sync = TableSync::new(api, scope, store.dispatcher(), notifier).with_config(config);

    if args.remote {
        let outcome = sync.refresh()?;
        let drained = store.drain();
        info!(?outcome, resets = drained.resets, "loaded remote scope");
    }

    let mut steps = Vec::with_capacity(events.len());
    for (index, event) in events.iter().enumerate() {
        if event.is_control() {
            warn!(index, event = event.kind(), "skipping control event in a user log");
            continue;
        }
        store.dispatch(event)?;
        let outcome = sync.submit(event, store.state())?;
        let drained = store.drain();
        for rejected in &drained.rejected {
            warn!(index, event = rejected.kind, error = %rejected.error, "server answer rejected");
        }
        steps.push(Step {
            index,
            event: event.kind(),
            outcome,
        });
    }

    let state = store.into_state();
    let report = SyncReport {
        scope: scope.to_string(),
        steps,
        notifications: notifications.try_iter().collect(),
        totals: TotalsView::from(&state.totals),
        digest: replay::digest(&state)?,
        rows: state.rows.iter().map(RowLine::of).collect(),
    };
    render_mode(output, &report, write_text, write_pretty)
}

fn outcome_label(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Skipped => "skipped".into(),
        Outcome::Deferred => "deferred until create returns".into(),
        Outcome::Confirmed { kind, rows } => format!("{kind} confirmed ({rows} rows)"),
        Outcome::Cancelled => "cancelled".into(),
        Outcome::Failed { kind, code } => format!("{kind} failed [{}]", code.code()),
    }
}

fn write_text(report: &SyncReport, w: &mut dyn Write) -> io::Result<()> {
    for step in &report.steps {
        writeln!(w, "step\t{}\t{}\t{}", step.index, step.event, outcome_label(&step.outcome))?;
    }
    for note in &report.notifications {
        writeln!(w, "notice\t{note}")?;
    }
    writeln!(w, "digest\t{}", report.digest)?;
    write_rows_text(&report.rows, w)
}

fn write_pretty(report: &SyncReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Sync of {}", report.scope))?;
    for step in &report.steps {
        writeln!(w, "  #{:<4} {:<24} {}", step.index, step.event, outcome_label(&step.outcome))?;
    }
    for note in &report.notifications {
        writeln!(w, "  ! {note}")?;
    }
    pretty_kv(w, "estimated", format!("{:.2}", report.totals.estimated))?;
    pretty_kv(w, "digest", &report.digest)?;
    writeln!(w)?;
    write_rows_pretty(&report.rows, w)
}
