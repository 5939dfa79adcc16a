// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of GasWatch.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gaswatch")]
#[command(version, about = "Gas usage acquisition and degree-day modelling")]
#[command(
    long_about = "Logs in to the gas utility portal, downloads daily usage, keeps a 90-day\n\
    history and fits a degree-day model to it.\n\
    \nExamples:\n  \
    gaswatch run                          # Daemon: one cycle now, then daily\n  \
    gaswatch once                         # Single cycle, report as JSON\n  \
    gaswatch verify                       # Check credentials only\n  \
    gaswatch inspect download.xls         # Parse a saved download offline"
)]
pub struct Cli {
    /// Config file (TOML, or JSON by extension)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run acquisition cycles on the daily schedule until interrupted
    Run,

    /// Run one acquisition cycle and print the report
    Once,

    /// Log in and out again without fetching data
    Verify,

    /// Parse a saved usage download and print what was found
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Payload saved from the download endpoint
    pub file: PathBuf,

    /// Include every parsed record in the output
    #[arg(long, default_value_t = false)]
    pub records: bool,
}
