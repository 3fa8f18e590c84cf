//! Laxity library crate for computing maximal relaxations of clock
//! constraints in timed automata.
//!
//! Given a system with constraints annotated by relaxation variables, a
//! depth bound and a safety property, [`relax`] enumerates all symbolic
//! traces up to the bound, encodes them into linear real arithmetic,
//! eliminates the universally quantified delay variables, simplifies the
//! result, and maximizes the relaxation variables over the remaining
//! polyhedra. The result is the set of Pareto-optimal relaxation vectors.

pub mod automaton;
pub mod explorer;
pub mod io;
pub mod logic;
pub mod optimizer;
pub mod options;

use std::collections::BTreeSet;
use std::fmt;

use log::{debug, info};
use serde_json::json;
use thiserror::Error;

use automaton::{Operator, TaSystem};
use explorer::TraceExplorer;
use io::DumpHandler;
use logic::elimination::{Eliminator, PipelineStats};
use logic::quantifier::{FourierMotzkin, QuantifierEliminator};
use optimizer::pareto::Point;
use optimizer::{OptimizationStats, Optimizer};
use options::RelaxationOptions;

pub use logic::Rational;

/// The error type for all fallible operations of this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A textual form could not be parsed.
    #[error("cannot parse {kind} from {input:?}")]
    Parse { kind: &'static str, input: String },
    /// An operator that cannot be encoded into linear real arithmetic.
    #[error("operator {0} not supported for clock constraint encoding")]
    UnsupportedOperator(Operator),
    /// A formula outside the supported linear real arithmetic fragment.
    #[error("formula not LRA")]
    NotLra,
    /// The elimination backend returned an unusable formula.
    #[error("quantifier elimination failed: {0}")]
    QuantifierElimination(String),
    /// A dump location name was created twice.
    #[error("location {0} already exists")]
    DuplicateDumpLocation(String),
    /// A system model that cannot be loaded.
    #[error("invalid model: {0}")]
    Model(String),
    /// A configuration file that cannot be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn parse(kind: &'static str, input: &str) -> Self {
        Self::Parse {
            kind,
            input: input.to_owned(),
        }
    }
}

/// Statistics of one relaxation run.
#[derive(Debug, Clone)]
pub struct RelaxationStats {
    pipeline: PipelineStats,
    optimization: OptimizationStats,
    relaxations: usize,
    trace_method: &'static str,
    elimination_method: &'static str,
    optimization_method: &'static str,
}

impl RelaxationStats {
    pub fn pipeline(&self) -> &PipelineStats {
        &self.pipeline
    }

    pub fn optimization(&self) -> &OptimizationStats {
        &self.optimization
    }

    pub fn relaxations(&self) -> usize {
        self.relaxations
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "trace_generation_method": self.trace_method,
            "quantifier_elimination_method": self.elimination_method,
            "optimization_method": self.optimization_method,
            "number_of_traces": self.pipeline.traces(),
            "num_relaxations": self.relaxations,
            "num_terms": self.optimization.terms(),
            "num_solutions": self.optimization.solutions(),
            "trace_generation_runtime_s": self.pipeline.trace_generation().as_secs_f64(),
            "quantifier_elimination_runtime_s": self.pipeline.quantifier_elimination().as_secs_f64(),
            "processing_runtime_s": self.pipeline.processing().as_secs_f64(),
            "optimization_runtime_s": self.optimization.time().as_secs_f64(),
        })
    }
}

impl fmt::Display for RelaxationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "|R| = {}, {}; {}",
            self.relaxations, self.pipeline, self.optimization
        )
    }
}

/// The result of a relaxation run.
pub struct RelaxationResult {
    solutions: BTreeSet<Point>,
    supported: bool,
    stats: RelaxationStats,
}

impl RelaxationResult {
    /// The Pareto-optimal relaxation vectors.
    pub fn solutions(&self) -> &BTreeSet<Point> {
        &self.solutions
    }

    /// Whether all solutions are supported, which is the case exactly
    /// when the quantifier-free constraints are purely conjunctive.
    pub fn supported(&self) -> bool {
        self.supported
    }

    pub fn stats(&self) -> &RelaxationStats {
        &self.stats
    }
}

/// Compute the maximal relaxations of `system` for traces up to
/// `options.depth`, using the built-in Fourier–Motzkin elimination
/// backend.
///
/// # Errors
///
/// Returns an error if the system uses an unsupported operator in a clock
/// constraint, if quantifier elimination fails, or if writing a dump
/// fails.
pub fn relax<S: TaSystem>(
    system: &S,
    options: &RelaxationOptions,
    dump: &mut DumpHandler,
) -> Result<RelaxationResult, Error> {
    relax_with_oracle(system, FourierMotzkin::new(), options, dump)
}

/// Compute the maximal relaxations of `system` with the given
/// quantifier-elimination backend.
pub fn relax_with_oracle<S: TaSystem, Q: QuantifierEliminator>(
    system: &S,
    oracle: Q,
    options: &RelaxationOptions,
    dump: &mut DumpHandler,
) -> Result<RelaxationResult, Error> {
    let explorer = TraceExplorer::new(system, options.depth)?;
    let objectives = explorer.relaxation_variables().to_vec();
    let trace_method = explorer.method();

    info!(
        "enumerating traces up to depth {} over {} relaxation variables",
        options.depth,
        objectives.len()
    );
    let mut eliminator = Eliminator::new(oracle, dump)?;
    let constraints = eliminator.process(explorer)?;
    debug!(
        "quantifier-free constraints have {} disjuncts",
        constraints.terms.len()
    );

    let mut optimizer = Optimizer::new(options.grid_points, dump)?;
    let (solutions, supported) =
        optimizer.maximize(&objectives, &constraints, &options.epsilon)?;

    let stats = RelaxationStats {
        pipeline: eliminator.stats().clone(),
        optimization: optimizer.stats().clone(),
        relaxations: objectives.len(),
        trace_method,
        elimination_method: eliminator.method(),
        optimization_method: optimizer.method(),
    };
    info!(
        "found {} Pareto-optimal solutions ({}); {}",
        solutions.len(),
        if supported { "supported" } else { "unsupported" },
        stats
    );

    Ok(RelaxationResult {
        solutions,
        supported,
        stats,
    })
}
