//! `ldg check`: validate a snapshot and the table built from it.

use anyhow::Result;
use clap::Args;
use ledgerline_core::config::EngineConfig;
use ledgerline_core::invariants::{self, Violation};
use ledgerline_core::replay;
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

use super::{load_events, load_state};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Snapshot JSON to check.
    pub snapshot: PathBuf,

    /// Replay this event log first and check the result.
    #[arg(long)]
    pub events: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    scope: String,
    rows: usize,
    ok: bool,
    violations: Vec<Violation>,
}

pub fn run_check(args: &CheckArgs, config: &EngineConfig, output: OutputMode) -> Result<()> {
    let mut state = load_state(&args.snapshot, config.rows.options())?;
    if let Some(path) = &args.events {
        state = replay::replay(&state, &load_events(path)?)?;
    }

    let violations = invariants::check(&state, config.recalc.epsilon);
    let report = CheckReport {
        scope: state.scope.to_string(),
        rows: state.rows.len(),
        ok: violations.is_empty(),
        violations,
    };
    render_mode(output, &report, write_text, write_pretty)?;

    if !report.ok {
        anyhow::bail!("{} invariant violation(s)", report.violations.len());
    }
    Ok(())
}

fn write_text(report: &CheckReport, w: &mut dyn Write) -> io::Result<()> {
    if report.ok {
        return writeln!(w, "ok\t{}\t{}", report.scope, report.rows);
    }
    for violation in &report.violations {
        writeln!(w, "{violation}")?;
    }
    Ok(())
}

fn write_pretty(report: &CheckReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Check of {}", report.scope))?;
    pretty_kv(w, "rows", report.rows.to_string())?;
    pretty_kv(w, "status", if report.ok { "ok" } else { "FAILED" })?;
    for violation in &report.violations {
        writeln!(w, "  - {violation}")?;
    }
    Ok(())
}
