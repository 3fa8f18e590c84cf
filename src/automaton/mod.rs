//! The timed automaton data model and the system adapter contract.
//!
//! The relaxation core does not parse models itself; it consumes any type
//! implementing [`TaSystem`]. A reference in-memory adapter is provided in
//! [`system`].

pub mod system;

use std::fmt;

use serde::Deserialize;

/// A clock of a timed automaton. Clocks without a process are global;
/// equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub struct Clock {
    pub name: String,
    #[serde(default)]
    pub process: Option<String>,
}

impl Clock {
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            process: None,
        }
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(process) = &self.process {
            write!(f, "{}.", process)?;
        }
        write!(f, "{}", self.name)
    }
}

/// Comparison operator of a clock constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterEqual,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterEqual => ">=",
            Self::LessEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        };
        write!(f, "{}", symbol)
    }
}

/// A constraint `clock ~ limit`, optionally annotated with the index of a
/// relaxation variable that loosens its bound.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub struct ClockConstraint {
    pub clock: Clock,
    pub operator: Operator,
    pub limit: i64,
    #[serde(default)]
    pub relaxation: Option<usize>,
}

impl ClockConstraint {
    pub fn is_relaxed(&self) -> bool {
        self.relaxation.is_some()
    }
}

impl fmt::Display for ClockConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.clock, self.operator, self.limit)?;
        if let Some(idx) = self.relaxation {
            write!(f, " \u{00b1} rel_{}", idx)?;
        }
        Ok(())
    }
}

/// A location of one automaton of the network.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub id: String,
    pub process: String,
    pub name: String,
    pub urgent: bool,
    pub invariants: std::collections::BTreeSet<ClockConstraint>,
}

/// An edge of one automaton, part of a system transition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    pub process: String,
    pub guards: std::collections::BTreeSet<ClockConstraint>,
    pub resets: std::collections::BTreeSet<Clock>,
}

/// The set of locations the network occupies, one per automaton.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolicState {
    pub locations: std::collections::BTreeSet<Location>,
}

impl fmt::Display for SymbolicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self
            .locations
            .iter()
            .map(|location| format!("{}.{}", location.process, location.name))
            .collect();
        names.sort();
        write!(f, "({})", names.join(", "))
    }
}

/// A safety property over states and clocks.
///
/// A location predicate holds in a state iff some location of the state
/// has the given id; clock constraints are encoded like invariants, but
/// without relaxation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expression {
    Or {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    And {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Not {
        argument: Box<Expression>,
    },
    Constraint(ClockConstraint),
    Location {
        id: String,
    },
}

/// A state of the system as seen by the trace enumerator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemState {
    pub symbolic: SymbolicState,
}

/// A transition between system states, carrying the participating edges.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemTransition {
    pub source: SystemState,
    pub target: SystemState,
    pub edges: std::collections::BTreeSet<Edge>,
}

/// The adapter contract for a timed automaton system.
///
/// Implementations must return outgoing transitions in a deterministic
/// order for reproducible enumeration.
pub trait TaSystem {
    fn initial_state(&self) -> SystemState;

    /// Number of designated relaxation variables of the system.
    fn num_relaxations(&self) -> usize;

    fn outgoing_transitions(&self, state: &SystemState) -> Vec<SystemTransition>;

    fn safety_properties(&self, state: &SystemState) -> Vec<Expression>;
}
