//! `ldg key`: generate order keys.

use anyhow::Result;
use clap::{Args, Subcommand};
use ledgerline_core::order::OrderKey;
use serde::Serialize;
use std::io::{self, Write};

use crate::output::{OutputMode, render_mode};

#[derive(Args, Debug)]
pub struct KeyArgs {
    #[command(subcommand)]
    pub command: KeyCommand,
}

#[derive(Subcommand, Debug)]
pub enum KeyCommand {
    /// A key that sorts strictly between two keys.
    Between {
        /// Lower bound; omit for the start of the table.
        #[arg(long)]
        after: Option<String>,
        /// Upper bound; omit for the end of the table.
        #[arg(long)]
        before: Option<String>,
    },
    /// Evenly spaced ascending keys for renumbering a table.
    Spread {
        count: usize,
    },
}

#[derive(Debug, Serialize)]
struct Keys {
    keys: Vec<String>,
}

fn parse(raw: Option<&str>) -> Result<Option<OrderKey>> {
    Ok(raw.map(OrderKey::parse).transpose()?)
}

fn generate(command: &KeyCommand) -> Result<Vec<OrderKey>> {
    match command {
        KeyCommand::Between { after, before } => {
            let lo = parse(after.as_deref())?;
            let hi = parse(before.as_deref())?;
            Ok(vec![OrderKey::between(lo.as_ref(), hi.as_ref())?])
        }
        KeyCommand::Spread { count } => Ok(OrderKey::spread(*count)),
    }
}

pub fn run_key(args: &KeyArgs, output: OutputMode) -> Result<()> {
    let keys = Keys {
        keys: generate(&args.command)?
            .iter()
            .map(|k| k.as_str().to_string())
            .collect(),
    };
    render_mode(output, &keys, write_keys, write_keys)
}

fn write_keys(keys: &Keys, w: &mut dyn Write) -> io::Result<()> {
    for key in &keys.keys {
        writeln!(w, "{key}")?;
    }
    Ok(())
}
