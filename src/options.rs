//! Options for the relaxation procedure.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::logic::Rational;

/// Options controlling one relaxation run.
#[derive(Debug, Clone)]
pub struct RelaxationOptions {
    /// Bound on the number of transitions of the enumerated traces.
    pub depth: usize,
    /// Offset by which strict inequalities are weakened in the optimizer:
    /// `a·x < b` becomes `a·x <= b - epsilon`.
    pub epsilon: Rational,
    /// Number of samples per Pareto-front edge, endpoints included.
    pub grid_points: usize,
}

impl Default for RelaxationOptions {
    fn default() -> Self {
        Self {
            depth: 5,
            epsilon: Rational::new(1.into(), 10.into()),
            grid_points: 2,
        }
    }
}

/// The verbosity of log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceLevel {
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<u8> for TraceLevel {
    fn from(verbosity: u8) -> Self {
        match verbosity {
            0 => Self::Warn,
            1 => Self::Info,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl From<TraceLevel> for log::LevelFilter {
    fn from(level: TraceLevel) -> Self {
        match level {
            TraceLevel::Warn => Self::Warn,
            TraceLevel::Info => Self::Info,
            TraceLevel::Debug => Self::Debug,
            TraceLevel::Trace => Self::Trace,
        }
    }
}

/// Command line options of the laxity binary.
///
/// A run is driven either by a configuration file or by a single model
/// with a depth; the two are mutually exclusive.
#[derive(Debug, Parser)]
#[command(
    name = "laxity",
    about = "Computes maximal clock-constraint relaxations of timed automata",
    version
)]
#[command(group(ArgGroup::new("input").required(true).args(["config", "model"])))]
pub struct CliOptions {
    /// JSON configuration file describing one or more runs.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON model file for a single run.
    #[arg(short, long, value_name = "FILE", requires = "depth")]
    pub model: Option<PathBuf>,

    /// Trace depth bound for a single run.
    #[arg(short, long, value_name = "N")]
    pub depth: Option<usize>,

    /// Write solutions to this JSON file instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Append run statistics to this JSON file.
    #[arg(short, long, value_name = "FILE")]
    pub stats: Option<PathBuf>,

    /// Write intermediate artifacts below this directory.
    #[arg(long, value_name = "DIR")]
    pub dump: Option<PathBuf>,

    /// Number of grid points sampled per Pareto-front edge.
    #[arg(long, value_name = "G", default_value_t = 2)]
    pub grid_points: usize,

    /// Epsilon for strict inequalities, as a rational like 1/10.
    #[arg(long, value_name = "Q", default_value = "1/10")]
    pub epsilon: String,

    /// Increase verbosity (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}
