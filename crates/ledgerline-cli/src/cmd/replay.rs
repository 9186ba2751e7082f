//! `ldg replay`: fold an event log over a snapshot.

use anyhow::Result;
use clap::Args;
use ledgerline_core::config::EngineConfig;
use ledgerline_core::error::ErrorCode;
use ledgerline_core::invariants::{self, Violation};
use ledgerline_core::replay::{self, ReplayError};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;

use super::{RowLine, TotalsView, load_events, load_state, write_rows_pretty, write_rows_text};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Snapshot JSON the log starts from.
    pub snapshot: PathBuf,

    /// JSON array of change events.
    pub events: PathBuf,

    /// Skip events the reducer rejects instead of stopping at the first.
    #[arg(long)]
    pub lenient: bool,

    /// Fail when the final state violates a table invariant.
    #[arg(long)]
    pub check: bool,
}

#[derive(Debug, Serialize)]
struct Rejection {
    index: usize,
    kind: &'static str,
    code: ErrorCode,
    message: String,
}

impl From<&ReplayError> for Rejection {
    fn from(err: &ReplayError) -> Self {
        Self {
            index: err.index,
            kind: err.kind,
            code: err.source.code(),
            message: err.source.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    scope: String,
    events: usize,
    applied: usize,
    rejected: Vec<Rejection>,
    totals: TotalsView,
    digest: String,
    violations: Vec<Violation>,
    rows: Vec<RowLine>,
}

pub fn run_replay(args: &ReplayArgs, config: &EngineConfig, output: OutputMode) -> Result<()> {
    let initial = load_state(&args.snapshot, config.rows.options())?;
    let events = load_events(&args.events)?;

    let (state, applied, rejected) = if args.lenient {
        let run = replay::replay_lenient(&initial, &events);
        let rejected = run.rejected.iter().map(Rejection::from).collect();
        (run.state, run.applied, rejected)
    } else {
        (replay::replay(&initial, &events)?, events.len(), Vec::new())
    };

    let violations = invariants::check(&state, config.recalc.epsilon);
    let report = ReplayReport {
        scope: state.scope.to_string(),
        events: events.len(),
        applied,
        rejected,
        totals: TotalsView::from(&state.totals),
        digest: replay::digest(&state)?,
        violations,
        rows: state.rows.iter().map(RowLine::of).collect(),
    };
    info!(applied = report.applied, digest = %report.digest, "replayed event log");

    render_mode(output, &report, write_text, write_pretty)?;

    if args.check && !report.violations.is_empty() {
        anyhow::bail!("{} invariant violation(s) after replay", report.violations.len());
    }
    Ok(())
}

fn write_text(report: &ReplayReport, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "digest\t{}", report.digest)?;
    writeln!(w, "estimated\t{}", report.totals.estimated)?;
    for rejection in &report.rejected {
        writeln!(
            w,
            "rejected\t{}\t{}\t{}",
            rejection.index,
            rejection.kind,
            rejection.code.code()
        )?;
    }
    write_rows_text(&report.rows, w)
}

fn write_pretty(report: &ReplayReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Replay of {}", report.scope))?;
    pretty_kv(w, "events", format!("{} applied of {}", report.applied, report.events))?;
    pretty_kv(w, "nominal", format!("{:.2}", report.totals.nominal_value))?;
    pretty_kv(w, "estimated", format!("{:.2}", report.totals.estimated))?;
    pretty_kv(w, "variance", format!("{:.2}", report.totals.variance))?;
    pretty_kv(w, "digest", &report.digest)?;
    for rejection in &report.rejected {
        writeln!(
            w,
            "  skipped #{} {} [{}] {}",
            rejection.index,
            rejection.kind,
            rejection.code.code(),
            rejection.message
        )?;
    }
    for violation in &report.violations {
        writeln!(w, "  violation: {violation}")?;
    }
    writeln!(w)?;
    write_rows_pretty(&report.rows, w)
}
