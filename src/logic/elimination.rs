//! The quantifier-elimination driver.
//!
//! Pulls trace constraint bundles from the explorer, builds the
//! universally quantified implication per trace, runs the elimination
//! backend, simplifies the quantifier-free result, and accumulates
//! everything into one global DNF for the optimizer.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info};
use num_traits::Zero;

use super::interval;
use super::normalform::Transformer;
use super::quantifier::QuantifierEliminator;
use super::{DNFFormula, Formula, Inequality, InequalitySymbol, Rational, Sum, Variable};
use crate::automaton::TaSystem;
use crate::explorer::{TraceConstraints, TraceExplorer};
use crate::io::{DumpHandler, DumpLocation};
use crate::Error;

/// Cumulative wall times of the pipeline phases.
#[derive(Debug, Default, Clone)]
pub struct PipelineStats {
    traces: usize,
    trace_generation: Duration,
    quantifier_elimination: Duration,
    processing: Duration,
}

impl PipelineStats {
    pub fn traces(&self) -> usize {
        self.traces
    }

    pub fn trace_generation(&self) -> Duration {
        self.trace_generation
    }

    pub fn quantifier_elimination(&self) -> Duration {
        self.quantifier_elimination
    }

    pub fn processing(&self) -> Duration {
        self.processing
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "|T| = {}, trace generation time: {:.2}, qe time: {:.2}, processing time: {:.2}",
            self.traces(),
            self.trace_generation().as_secs_f32(),
            self.quantifier_elimination().as_secs_f32(),
            self.processing().as_secs_f32(),
        )
    }
}

/// Builds the global quantifier-free DNF from a trace bundle stream.
pub struct Eliminator<Q> {
    oracle: Q,
    stats: PipelineStats,
    trace_dump: DumpLocation,
    trace_formula_dump: DumpLocation,
    qe_input_dump: DumpLocation,
    qe_output_dump: DumpLocation,
    rip_input_dump: DumpLocation,
    rip_output_dump: DumpLocation,
    qf_cnf_dump: DumpLocation,
    qf_dnf_dump: DumpLocation,
}

impl<Q: QuantifierEliminator> Eliminator<Q> {
    pub fn new(oracle: Q, dump: &mut DumpHandler) -> Result<Self, Error> {
        Ok(Self {
            oracle,
            stats: PipelineStats::default(),
            trace_dump: dump.create_location("trace")?,
            trace_formula_dump: dump.create_location("trace_formula")?,
            qe_input_dump: dump.create_location("qe_input")?,
            qe_output_dump: dump.create_location("qe_output")?,
            rip_input_dump: dump.create_location("rip_input")?,
            rip_output_dump: dump.create_location("rip_output")?,
            qf_cnf_dump: dump.create_location("qf_cnf_formula")?,
            qf_dnf_dump: dump.create_location("qf_dnf_formula")?,
        })
    }

    pub fn method(&self) -> &'static str {
        self.oracle.name()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Process all bundles of the explorer into the global DNF.
    pub fn process<S: TaSystem>(
        &mut self,
        mut explorer: TraceExplorer<'_, S>,
    ) -> Result<DNFFormula, Error> {
        let mut accumulated: BTreeSet<Formula> = BTreeSet::new();
        let mut w = 0;
        loop {
            let start = Instant::now();
            let bundle = match explorer.next() {
                None => break,
                Some(bundle) => {
                    self.stats.trace_generation += start.elapsed();
                    bundle?
                }
            };

            let start = Instant::now();
            self.trace_dump
                .write(&format!("{}.json", w), &bundle.to_json().to_string())?;
            let (deltas, body, sentence) = translate(&bundle);
            self.trace_formula_dump
                .write(&format!("{}.smt2", w), &sentence)?;
            self.qe_input_dump.write(&format!("{}.smt2", w), &sentence)?;
            self.stats.processing += start.elapsed();

            let start = Instant::now();
            let core = self.oracle.eliminate_universal(&deltas, &body)?;
            self.stats.quantifier_elimination += start.elapsed();

            let start = Instant::now();
            check_quantifier_free(&core, bundle.relaxation_vars())?;
            let qf = with_relaxation_bounds(core, bundle.relaxation_vars());
            self.qe_output_dump
                .write(&format!("{}.smt2", w), &qf.to_smtlib())?;
            let simplified = self.post_process(w, &qf)?;
            debug!("trace {} reduced to {}", w, simplified);
            accumulated.insert(simplified);
            self.stats.processing += start.elapsed();

            w += 1;
            self.stats.traces = w;
        }

        let start = Instant::now();
        let dnf = self.finalize(accumulated)?;
        self.stats.processing += start.elapsed();
        info!(
            "eliminated {} traces into {} disjuncts",
            self.stats.traces,
            dnf.terms.len()
        );
        Ok(dnf)
    }

    /// Per-trace simplification: CNF, interval propagation, CNF again to
    /// re-absorb clauses.
    fn post_process(&mut self, w: usize, qf: &Formula) -> Result<Formula, Error> {
        let cnf = Transformer::cnf().transform(qf);
        self.rip_input_dump
            .write(&format!("{}.smt2", w), &cnf.to_smtlib())?;
        let propagated = interval::propagate(&cnf)?;
        self.rip_output_dump
            .write(&format!("{}.smt2", w), &propagated.to_smtlib())?;
        Ok(Transformer::cnf().transform(&propagated))
    }

    /// Conjoin all per-trace results, simplify once more, and transform
    /// into the final DNF.
    fn finalize(&mut self, accumulated: BTreeSet<Formula>) -> Result<DNFFormula, Error> {
        let conjunction = Formula::and(accumulated);
        let cnf = Transformer::cnf().transform(&conjunction);
        let propagated = interval::propagate(&cnf)?;
        let reabsorbed = Transformer::cnf().transform(&propagated);
        self.qf_cnf_dump
            .write("result_cnf.smt2", &reabsorbed.to_smtlib())?;

        let dnf_formula = Transformer::dnf().transform(&reabsorbed);
        let dnf = DNFFormula::from_formula(&dnf_formula);
        self.qf_dnf_dump
            .write("qf_free_dnf_formula.txt", &format!("{}\n", dnf))?;
        Ok(dnf)
    }
}

/// The quantified sentence of one bundle: the delay block, the
/// implication body, and its SMT-LIB rendering for the dumps.
fn translate(bundle: &TraceConstraints) -> (Vec<Variable>, Formula, String) {
    let deltas = bundle.delta_variables().to_vec();

    let trace_formula = Formula::and(
        bundle
            .all_inequalities()
            .into_iter()
            .map(Formula::atom)
            .chain(deltas.iter().map(|&delta| {
                Formula::atom(Inequality::new(
                    Sum::variable(delta),
                    InequalitySymbol::GreaterEqual,
                    Rational::zero(),
                ))
            })),
    );
    let properties_formula = Formula::and(bundle.all_property_formulas());

    let sentence = quantified_smtlib(
        &deltas,
        &trace_formula,
        &properties_formula,
        bundle.relaxation_vars(),
    );
    let body = Formula::implies(trace_formula, properties_formula);
    (deltas, body, sentence)
}

/// `(and (forall ((delta_j Real) ...) (=> trace props)) (>= relax_i 0) ...)`
fn quantified_smtlib(
    deltas: &[Variable],
    trace_formula: &Formula,
    properties_formula: &Formula,
    relaxations: &BTreeSet<Variable>,
) -> String {
    let bindings: Vec<String> = deltas
        .iter()
        .map(|delta| format!("({} Real)", delta))
        .collect();
    let mut out = format!(
        "(and (forall ({}) (=> {} {}))",
        bindings.join(" "),
        trace_formula.to_smtlib(),
        properties_formula.to_smtlib(),
    );
    for relaxation in relaxations {
        out.push_str(&format!(" (>= {} 0)", relaxation));
    }
    out.push(')');
    out
}

/// The oracle must return a formula over the relaxation variables only;
/// a leftover delay variable means elimination failed.
fn check_quantifier_free(formula: &Formula, relaxations: &BTreeSet<Variable>) -> Result<(), Error> {
    for variable in formula.variables() {
        if !relaxations.contains(&variable) {
            return Err(Error::QuantifierElimination(format!(
                "eliminated formula still mentions {}",
                variable
            )));
        }
    }
    Ok(())
}

/// Conjoin the non-negativity of every relaxation variable.
fn with_relaxation_bounds(core: Formula, relaxations: &BTreeSet<Variable>) -> Formula {
    Formula::and(std::iter::once(core).chain(relaxations.iter().map(|&relaxation| {
        Formula::atom(Inequality::new(
            Sum::variable(relaxation),
            InequalitySymbol::GreaterEqual,
            Rational::zero(),
        ))
    })))
}
