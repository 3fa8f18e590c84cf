//! An in-memory reference implementation of the [`TaSystem`] contract.
//!
//! A [`StaticSystem`] is built from a JSON model describing a network of
//! processes with locations and edges. Transitions interleave: one process
//! moves at a time. This stands in for a full model-checker front-end and
//! is what the binary and the test suite drive.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use super::{
    Clock, ClockConstraint, Edge, Expression, Location, SymbolicState, SystemState,
    SystemTransition, TaSystem,
};
use crate::Error;

/// A process of the model: locations, edges and an initial location.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelProcess {
    pub name: String,
    pub initial: String,
    pub locations: Vec<ModelLocation>,
    #[serde(default)]
    pub edges: Vec<ModelEdge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelLocation {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub invariants: BTreeSet<ClockConstraint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEdge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub guards: BTreeSet<ClockConstraint>,
    #[serde(default)]
    pub resets: BTreeSet<Clock>,
}

/// The root of a JSON model.
#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    pub processes: Vec<ModelProcess>,
    #[serde(default)]
    pub properties: Vec<Expression>,
}

/// A static timed automaton system constructed from a [`Model`].
#[derive(Debug)]
pub struct StaticSystem {
    // per process: resolved locations by id, edges in declaration order
    processes: Vec<ProcessTable>,
    properties: Vec<Expression>,
    initial: SystemState,
    num_relaxations: usize,
}

#[derive(Debug)]
struct ProcessTable {
    name: String,
    locations: BTreeMap<String, Location>,
    edges: Vec<ModelEdge>,
}

impl StaticSystem {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let model: Model =
            serde_json::from_str(json).map_err(|e| Error::Model(e.to_string()))?;
        Self::new(model)
    }

    pub fn new(model: Model) -> Result<Self, Error> {
        if model.processes.is_empty() {
            return Err(Error::Model("model has no processes".to_owned()));
        }

        let num_relaxations = count_relaxations(&model);

        let mut processes = Vec::with_capacity(model.processes.len());
        let mut initial_locations = BTreeSet::new();
        for process in &model.processes {
            let mut locations = BTreeMap::new();
            for location in &process.locations {
                let resolved = Location {
                    id: location.id.clone(),
                    process: process.name.clone(),
                    name: location.name.clone().unwrap_or_else(|| location.id.clone()),
                    urgent: location.urgent,
                    invariants: location.invariants.clone(),
                };
                if locations.insert(location.id.clone(), resolved).is_some() {
                    return Err(Error::Model(format!(
                        "duplicate location id {} in process {}",
                        location.id, process.name
                    )));
                }
            }
            for edge in &process.edges {
                for id in [&edge.source, &edge.target] {
                    if !locations.contains_key(id) {
                        return Err(Error::Model(format!(
                            "edge references unknown location {} in process {}",
                            id, process.name
                        )));
                    }
                }
            }
            let initial = locations.get(&process.initial).ok_or_else(|| {
                Error::Model(format!(
                    "unknown initial location {} in process {}",
                    process.initial, process.name
                ))
            })?;
            initial_locations.insert(initial.clone());
            processes.push(ProcessTable {
                name: process.name.clone(),
                locations,
                edges: process.edges.clone(),
            });
        }

        Ok(Self {
            processes,
            properties: model.properties,
            initial: SystemState {
                symbolic: SymbolicState {
                    locations: initial_locations,
                },
            },
            num_relaxations,
        })
    }
}

/// One more than the largest relaxation index mentioned anywhere in the
/// model; zero if nothing is relaxed.
fn count_relaxations(model: &Model) -> usize {
    fn of_constraint(constraint: &ClockConstraint) -> usize {
        constraint.relaxation.map_or(0, |idx| idx + 1)
    }
    fn of_expression(expression: &Expression) -> usize {
        match expression {
            Expression::Or { left, right } | Expression::And { left, right } => {
                of_expression(left).max(of_expression(right))
            }
            Expression::Not { argument } => of_expression(argument),
            Expression::Constraint(constraint) => of_constraint(constraint),
            Expression::Location { .. } => 0,
        }
    }

    let mut count = 0;
    for process in &model.processes {
        for location in &process.locations {
            for invariant in &location.invariants {
                count = count.max(of_constraint(invariant));
            }
        }
        for edge in &process.edges {
            for guard in &edge.guards {
                count = count.max(of_constraint(guard));
            }
        }
    }
    for property in &model.properties {
        count = count.max(of_expression(property));
    }
    count
}

impl TaSystem for StaticSystem {
    fn initial_state(&self) -> SystemState {
        self.initial.clone()
    }

    fn num_relaxations(&self) -> usize {
        self.num_relaxations
    }

    fn outgoing_transitions(&self, state: &SystemState) -> Vec<SystemTransition> {
        let mut transitions = Vec::new();
        for process in &self.processes {
            let current = state
                .symbolic
                .locations
                .iter()
                .find(|location| location.process == process.name);
            let current = match current {
                Some(location) => location,
                None => continue,
            };
            for edge in &process.edges {
                if edge.source != current.id {
                    continue;
                }
                let target_location = &process.locations[&edge.target];
                let mut locations = state.symbolic.locations.clone();
                locations.remove(current);
                locations.insert(target_location.clone());
                let target = SystemState {
                    symbolic: SymbolicState { locations },
                };
                let edges = BTreeSet::from([Edge {
                    source_id: edge.source.clone(),
                    target_id: edge.target.clone(),
                    process: process.name.clone(),
                    guards: edge.guards.clone(),
                    resets: edge.resets.clone(),
                }]);
                transitions.push(SystemTransition {
                    source: state.clone(),
                    target,
                    edges,
                });
            }
        }
        transitions
    }

    fn safety_properties(&self, _state: &SystemState) -> Vec<Expression> {
        self.properties.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOP_MODEL: &str = r#"{
        "processes": [{
            "name": "P",
            "initial": "L",
            "locations": [{"id": "L"}],
            "edges": [{
                "source": "L", "target": "L",
                "guards": [{"clock": {"name": "x"}, "operator": "<=", "limit": 10, "relaxation": 0}],
                "resets": [{"name": "x"}]
            }]
        }],
        "properties": [{"type": "constraint", "clock": {"name": "x"}, "operator": "<=", "limit": 10}]
    }"#;

    #[test]
    fn loads_model_and_counts_relaxations() {
        let system = StaticSystem::from_json(LOOP_MODEL).unwrap();
        assert_eq!(system.num_relaxations(), 1);
        let initial = system.initial_state();
        assert_eq!(initial.symbolic.locations.len(), 1);
        let transitions = system.outgoing_transitions(&initial);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].target.symbolic, initial.symbolic);
        assert_eq!(system.safety_properties(&initial).len(), 1);
    }

    #[test]
    fn rejects_unknown_initial_location() {
        let json = r#"{"processes": [{"name": "P", "initial": "missing", "locations": [{"id": "L"}]}]}"#;
        assert!(StaticSystem::from_json(json).is_err());
    }

    #[test]
    fn interleaves_processes() {
        let json = r#"{
            "processes": [
                {"name": "A", "initial": "a0", "locations": [{"id": "a0"}, {"id": "a1"}],
                 "edges": [{"source": "a0", "target": "a1"}]},
                {"name": "B", "initial": "b0", "locations": [{"id": "b0"}, {"id": "b1"}],
                 "edges": [{"source": "b0", "target": "b1"}]}
            ]
        }"#;
        let system = StaticSystem::from_json(json).unwrap();
        let transitions = system.outgoing_transitions(&system.initial_state());
        assert_eq!(transitions.len(), 2);
        for transition in &transitions {
            assert_eq!(transition.target.symbolic.locations.len(), 2);
        }
    }
}
