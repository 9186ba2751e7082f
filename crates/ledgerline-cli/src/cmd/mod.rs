pub mod check;
pub mod completions;
pub mod key;
pub mod replay;
pub mod sync;

use anyhow::{Context, Result};
use ledgerline_core::ChangeEvent;
use ledgerline_core::error::ErrorCode;
use ledgerline_core::model::Totals;
use ledgerline_core::order::OrderKeyError;
use ledgerline_core::replay::ReplayError;
use ledgerline_core::rows::{Row, RowOptions};
use ledgerline_core::snapshot::{Snapshot, SnapshotError};
use ledgerline_core::state::TableState;
use ledgerline_sync::{ApiError, SyncError};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

use crate::output::pretty_rule;

pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    Ok(Snapshot::from_json(&raw)?)
}

pub fn load_state(path: &Path, options: RowOptions) -> Result<TableState> {
    Ok(read_snapshot(path)?.into_state(options)?)
}

pub fn load_events(path: &Path) -> Result<Vec<ChangeEvent>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read event log {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of events", path.display()))
}

/// The stable code behind a command failure, when there is one.
pub fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<SnapshotError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<ReplayError>() {
            Some(e.source.code())
        } else if let Some(e) = cause.downcast_ref::<OrderKeyError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<ApiError>() {
            Some(e.code())
        } else {
            cause.downcast_ref::<SyncError>().map(SyncError::code)
        }
    })
}

/// One row as shown by `ldg`.
#[derive(Debug, Serialize)]
pub struct RowLine {
    pub id: String,
    pub label: String,
    pub nominal: f64,
    pub estimated: f64,
}

impl RowLine {
    pub fn of(row: &Row) -> Self {
        match row {
            Row::Model(_) | Row::Placeholder(_) => {
                let (label, nominal, estimated) = row.line().map_or_else(
                    || (String::new(), 0.0, 0.0),
                    |data| {
                        let label = data
                            .identifier
                            .clone()
                            .or_else(|| data.description.clone())
                            .unwrap_or_default();
                        (label, data.nominal_value, data.estimated())
                    },
                );
                Self {
                    id: row.id().to_string(),
                    label,
                    nominal,
                    estimated,
                }
            }
            Row::Group(group) => Self {
                id: row.id().to_string(),
                label: group.name.clone(),
                nominal: group.totals.nominal_value,
                estimated: group.totals.estimated(),
            },
            Row::Markup(markup) => Self {
                id: row.id().to_string(),
                label: markup
                    .identifier
                    .clone()
                    .or_else(|| markup.description.clone())
                    .unwrap_or_default(),
                nominal: 0.0,
                estimated: markup.contribution,
            },
        }
    }
}

/// Scope totals as shown by `ldg`.
#[derive(Debug, Serialize)]
pub struct TotalsView {
    pub nominal_value: f64,
    pub fringes: f64,
    pub markups: f64,
    pub estimated: f64,
    pub actual: f64,
    pub variance: f64,
}

impl From<&Totals> for TotalsView {
    fn from(totals: &Totals) -> Self {
        Self {
            nominal_value: totals.nominal_value,
            fringes: totals.accumulated_fringe_contribution,
            markups: totals.accumulated_markup_contribution + totals.markup_contribution,
            estimated: totals.estimated(),
            actual: totals.actual,
            variance: totals.variance(),
        }
    }
}

pub fn write_rows_text(rows: &[RowLine], w: &mut dyn Write) -> io::Result<()> {
    for row in rows {
        writeln!(w, "{}\t{}\t{}\t{}", row.id, row.label, row.nominal, row.estimated)?;
    }
    Ok(())
}

pub fn write_rows_pretty(rows: &[RowLine], w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:<16} {:<24} {:>14} {:>14}", "ROW", "LABEL", "NOMINAL", "ESTIMATED")?;
    pretty_rule(w)?;
    for row in rows {
        writeln!(
            w,
            "{:<16} {:<24} {:>14.2} {:>14.2}",
            row.id, row.label, row.nominal, row.estimated
        )?;
    }
    Ok(())
}
