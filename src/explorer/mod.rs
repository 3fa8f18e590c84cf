//! Depth-first enumeration of symbolic traces and their constraints.
//!
//! The explorer walks all transition sequences of a system up to a depth
//! bound and encodes guards, invariants, urgency and safety properties
//! into linear real arithmetic over delay and relaxation variables. One
//! constraint bundle is produced per visited trace; the mutable encoding
//! state is truncated and reused across backtracking.

use std::collections::{BTreeMap, BTreeSet};

use num_traits::{One, Zero};
use serde_json::json;
use tinyvec::TinyVec;

use crate::automaton::{
    Clock, ClockConstraint, Edge, Expression, Operator, SymbolicState, SystemState,
    SystemTransition, TaSystem,
};
use crate::logic::{Formula, Inequality, InequalitySymbol, Rational, Sum, Summand, Variable};
use crate::Error;

/// Immutable snapshot of the constraints of one symbolic trace.
///
/// All per-depth sequences have the same length as the trace itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConstraints {
    symbolic_trace: Vec<SymbolicState>,
    relaxation_vars: BTreeSet<Variable>,
    delta_variables: Vec<Variable>,
    inequalities: Vec<BTreeSet<Inequality>>,
    property_formulas: Vec<BTreeSet<Formula>>,
}

impl TraceConstraints {
    pub fn symbolic_trace(&self) -> &[SymbolicState] {
        &self.symbolic_trace
    }

    pub fn relaxation_vars(&self) -> &BTreeSet<Variable> {
        &self.relaxation_vars
    }

    pub fn delta_variables(&self) -> &[Variable] {
        &self.delta_variables
    }

    pub fn inequalities(&self) -> &[BTreeSet<Inequality>] {
        &self.inequalities
    }

    pub fn property_formulas(&self) -> &[BTreeSet<Formula>] {
        &self.property_formulas
    }

    /// Union of the inequalities over all depths.
    pub fn all_inequalities(&self) -> BTreeSet<Inequality> {
        self.inequalities.iter().flatten().cloned().collect()
    }

    /// Union of the property obligations over all depths.
    pub fn all_property_formulas(&self) -> BTreeSet<Formula> {
        self.property_formulas.iter().flatten().cloned().collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "trace": self
                .symbolic_trace
                .iter()
                .map(|state| state.to_string())
                .collect::<Vec<_>>(),
            "inequalities": self
                .all_inequalities()
                .iter()
                .map(|inequality| inequality.to_string())
                .collect::<Vec<_>>(),
            "property_formulas": self
                .all_property_formulas()
                .iter()
                .map(|formula| formula.to_string())
                .collect::<Vec<_>>(),
        })
    }
}

/// DFS trace enumerator over a [`TaSystem`].
///
/// Implements [`Iterator`]; each item is the constraint bundle of one
/// trace of length at most `depth + 1` states.
pub struct TraceExplorer<'a, S> {
    system: &'a S,
    depth: usize,
    relaxations: Vec<Variable>,
    deltas: Vec<Variable>,
    symbolic_trace: Vec<SymbolicState>,
    // reset depths per clock, ascending; truncated on backtrack
    clock_resets: BTreeMap<Clock, TinyVec<[usize; 8]>>,
    trace_inequalities: Vec<BTreeSet<Inequality>>,
    property_formulas: Vec<BTreeSet<Formula>>,
    stack: Vec<(usize, SystemTransition)>,
}

impl<'a, S: TaSystem> TraceExplorer<'a, S> {
    pub fn new(system: &'a S, depth: usize) -> Result<Self, Error> {
        let mut explorer = Self {
            system,
            depth,
            relaxations: (0..system.num_relaxations())
                .map(Variable::Relaxation)
                .collect(),
            deltas: (0..=depth).map(Variable::Delta).collect(),
            symbolic_trace: Vec::new(),
            clock_resets: BTreeMap::new(),
            trace_inequalities: Vec::new(),
            property_formulas: Vec::new(),
            stack: Vec::with_capacity(64),
        };

        let initial = system.initial_state();
        explorer.trace_inequalities.push(BTreeSet::new());
        explorer.property_formulas.push(BTreeSet::new());
        explorer.encode_state(0, &initial)?;
        explorer.symbolic_trace.push(initial.symbolic.clone());

        if depth >= 1 {
            for transition in system.outgoing_transitions(&initial) {
                explorer.stack.push((1, transition));
            }
        }
        Ok(explorer)
    }

    /// The relaxation variables of the system; identical for all bundles.
    pub fn relaxation_variables(&self) -> &[Variable] {
        &self.relaxations
    }

    pub fn method(&self) -> &'static str {
        "DFS"
    }

    fn advance(
        &mut self,
        depth: usize,
        transition: SystemTransition,
    ) -> Result<TraceConstraints, Error> {
        self.truncate(depth);
        self.trace_inequalities.push(BTreeSet::new());
        self.property_formulas.push(BTreeSet::new());
        self.encode_transition(depth, &transition)?;
        self.encode_state(depth, &transition.target)?;
        self.symbolic_trace.push(transition.target.symbolic.clone());

        if depth + 1 <= self.depth {
            for next in self.system.outgoing_transitions(&transition.target) {
                self.stack.push((depth + 1, next));
            }
        }

        Ok(TraceConstraints {
            symbolic_trace: self.symbolic_trace.clone(),
            relaxation_vars: self.relaxations.iter().copied().collect(),
            delta_variables: self.deltas[..=depth].to_vec(),
            inequalities: self.trace_inequalities.clone(),
            property_formulas: self.property_formulas.clone(),
        })
    }

    /// Drop all encoding state at depths `>= depth`, keeping the shared
    /// prefix of the previous trace.
    fn truncate(&mut self, depth: usize) {
        self.trace_inequalities.truncate(depth);
        self.property_formulas.truncate(depth);
        self.symbolic_trace.truncate(depth);
        for resets in self.clock_resets.values_mut() {
            let keep = resets
                .iter()
                .position(|&reset| reset >= depth)
                .unwrap_or(resets.len());
            resets.truncate(keep);
        }
    }

    fn encode_transition(
        &mut self,
        depth: usize,
        transition: &SystemTransition,
    ) -> Result<(), Error> {
        self.encode_guards(depth, &transition.edges)?;
        self.encode_resets(depth, &transition.edges);
        Ok(())
    }

    fn encode_state(&mut self, depth: usize, state: &SystemState) -> Result<(), Error> {
        self.encode_safety_properties(depth, state)?;
        self.encode_locations(depth, &state.symbolic)
    }

    fn encode_locations(&mut self, depth: usize, state: &SymbolicState) -> Result<(), Error> {
        for location in &state.locations {
            for invariant in &location.invariants {
                // clock value on entering the state
                let mut summands = self.substitute_clock(depth, &invariant.clock);
                if let Some(relaxation) = relaxation_summand(invariant) {
                    summands.push(relaxation);
                }
                self.encode_clock_constraint(depth, invariant, summands.clone())?;

                // and after the delay spent in it
                summands.push(Summand::new(Rational::one(), self.deltas[depth]));
                self.encode_clock_constraint(depth, invariant, summands)?;
            }

            if location.urgent {
                self.encode_urgent(depth);
            }
        }
        Ok(())
    }

    fn encode_guards(&mut self, depth: usize, edges: &BTreeSet<Edge>) -> Result<(), Error> {
        for edge in edges {
            for guard in &edge.guards {
                // clock value at the source state plus the delay before firing
                let mut summands = self.substitute_clock(depth - 1, &guard.clock);
                summands.push(Summand::new(Rational::one(), self.deltas[depth - 1]));
                if let Some(relaxation) = relaxation_summand(guard) {
                    summands.push(relaxation);
                }
                self.encode_clock_constraint(depth, guard, summands)?;
            }
        }
        Ok(())
    }

    fn encode_resets(&mut self, depth: usize, edges: &BTreeSet<Edge>) {
        for edge in edges {
            for reset in &edge.resets {
                self.clock_resets
                    .entry(reset.clone())
                    .or_default()
                    .push(depth);
            }
        }
    }

    fn encode_safety_properties(&mut self, depth: usize, state: &SystemState) -> Result<(), Error> {
        for property in self.system.safety_properties(state) {
            // the property must hold on entering the state and at the end
            // of the delay spent in it
            let on_entry = self.encoded_property(&property, depth, &state.symbolic, &[])?;
            let after_delay =
                self.encoded_property(&property, depth, &state.symbolic, &[self.deltas[depth]])?;
            let slot = &mut self.property_formulas[depth];
            slot.insert(on_entry);
            slot.insert(after_delay);
        }
        Ok(())
    }

    fn encode_urgent(&mut self, depth: usize) {
        let delta_sum = Sum::variable(self.deltas[depth]);
        self.trace_inequalities[depth].insert(Inequality::new(
            delta_sum.clone(),
            InequalitySymbol::LessEqual,
            Rational::zero(),
        ));
        self.trace_inequalities[depth].insert(Inequality::new(
            delta_sum,
            InequalitySymbol::GreaterEqual,
            Rational::zero(),
        ));
    }

    fn encode_clock_constraint(
        &mut self,
        depth: usize,
        constraint: &ClockConstraint,
        summands: Vec<Summand>,
    ) -> Result<(), Error> {
        let encoded = encoded_clock_constraint(constraint, summands)?;
        self.trace_inequalities[depth].extend(encoded);
        Ok(())
    }

    fn encoded_property(
        &self,
        property: &Expression,
        depth: usize,
        state: &SymbolicState,
        deltas_to_add: &[Variable],
    ) -> Result<Formula, Error> {
        match property {
            Expression::Or { left, right } => Ok(Formula::or([
                self.encoded_property(left, depth, state, deltas_to_add)?,
                self.encoded_property(right, depth, state, deltas_to_add)?,
            ])),
            Expression::And { left, right } => Ok(Formula::and([
                self.encoded_property(left, depth, state, deltas_to_add)?,
                self.encoded_property(right, depth, state, deltas_to_add)?,
            ])),
            Expression::Not { argument } => Ok(Formula::not(self.encoded_property(
                argument,
                depth,
                state,
                deltas_to_add,
            )?)),
            Expression::Location { id } => {
                if state.locations.iter().any(|location| &location.id == id) {
                    Ok(Formula::TRUE)
                } else {
                    Ok(Formula::FALSE)
                }
            }
            Expression::Constraint(constraint) => {
                let mut summands = self.substitute_clock(depth, &constraint.clock);
                summands.extend(
                    deltas_to_add
                        .iter()
                        .map(|&delta| Summand::new(Rational::one(), delta)),
                );
                let inequalities = encoded_clock_constraint(constraint, summands)?;
                Ok(Formula::and(inequalities.into_iter().map(Formula::atom)))
            }
        }
    }

    /// The clock value at the given depth as a sum of the delays since the
    /// greatest reset at or before that depth. Every clock is implicitly
    /// reset at the initial state.
    fn substitute_clock(&self, depth: usize, clock: &Clock) -> Vec<Summand> {
        let mut last_reset = 0;
        if let Some(resets) = self.clock_resets.get(clock) {
            for &reset in resets.iter() {
                if reset > depth {
                    break;
                }
                last_reset = reset;
            }
        }
        (last_reset..depth)
            .map(|j| Summand::new(Rational::one(), self.deltas[j]))
            .collect()
    }
}

impl<S: TaSystem> Iterator for TraceExplorer<'_, S> {
    type Item = Result<TraceConstraints, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, transition) = self.stack.pop()?;
        Some(self.advance(depth, transition))
    }
}

/// The coefficient of the relaxation variable of a relaxed constraint:
/// `a ~ b + ρ` for upper bounds becomes `a - ρ ~ b`, and `a ~ b - ρ` for
/// lower bounds becomes `a + ρ ~ b`.
fn relaxation_summand(constraint: &ClockConstraint) -> Option<Summand> {
    let idx = constraint.relaxation?;
    let coefficient = match constraint.operator {
        Operator::GreaterThan | Operator::GreaterEqual => Rational::one(),
        _ => -Rational::one(),
    };
    Some(Summand::new(coefficient, Variable::Relaxation(idx)))
}

fn encoded_clock_constraint(
    constraint: &ClockConstraint,
    summands: Vec<Summand>,
) -> Result<Vec<Inequality>, Error> {
    let sum = Sum::new(summands);
    let limit = Rational::from_integer(constraint.limit.into());
    let encoded = match constraint.operator {
        Operator::Equal => vec![
            Inequality::new(sum.clone(), InequalitySymbol::GreaterEqual, limit.clone()),
            Inequality::new(sum, InequalitySymbol::LessEqual, limit),
        ],
        Operator::GreaterThan => vec![Inequality::new(
            sum,
            InequalitySymbol::GreaterThan,
            limit,
        )],
        Operator::GreaterEqual => vec![Inequality::new(
            sum,
            InequalitySymbol::GreaterEqual,
            limit,
        )],
        Operator::LessThan => vec![Inequality::new(sum, InequalitySymbol::LessThan, limit)],
        Operator::LessEqual => vec![Inequality::new(sum, InequalitySymbol::LessEqual, limit)],
        Operator::NotEqual => return Err(Error::UnsupportedOperator(constraint.operator)),
    };
    Ok(encoded)
}
