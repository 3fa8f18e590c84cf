//! End-to-end tests of the relaxation pipeline on small timed automata.

use std::collections::BTreeSet;

use laxity::automaton::system::StaticSystem;
use laxity::io::DumpHandler;
use laxity::optimizer::pareto::{Coord, Point};
use laxity::options::RelaxationOptions;
use laxity::{relax, Rational, RelaxationResult};

const INF: Coord = Coord::Infinite;

fn finite(numer: i64, denom: i64) -> Coord {
    Coord::Finite(Rational::new(numer.into(), denom.into()))
}

fn run(model: &str, depth: usize) -> RelaxationResult {
    let system = StaticSystem::from_json(model).unwrap();
    let options = RelaxationOptions {
        depth,
        ..RelaxationOptions::default()
    };
    relax(&system, &options, &mut DumpHandler::noop()).unwrap()
}

fn assert_solutions(result: &RelaxationResult, expected: &[Vec<Coord>]) {
    let expected: BTreeSet<Point> = expected.iter().cloned().collect();
    assert_eq!(result.solutions(), &expected);
}

/// A single location with a self loop guarded by `x <= 10` with
/// relaxation 0 and a reset of `x`.
fn loop_model(properties: &str) -> String {
    format!(
        r#"{{
            "processes": [{{
                "name": "P",
                "initial": "L",
                "locations": [{{"id": "L"}}],
                "edges": [{{
                    "source": "L", "target": "L",
                    "guards": [{{"clock": {{"name": "x"}}, "operator": "<=", "limit": 10, "relaxation": 0}}],
                    "resets": [{{"name": "x"}}]
                }}]
            }}],
            "properties": [{}]
        }}"#,
        properties
    )
}

#[test]
fn relaxed_guard_alone_is_unbounded() {
    // nothing outside the guard constrains the relaxation
    let model = loop_model("");
    let result = run(&model, 2);
    assert!(result.supported());
    assert_solutions(&result, &[vec![INF]]);
}

#[test]
fn relaxed_invariant_caps_the_second_relaxation() {
    // guard x <= 10 (relax 0) stays unbounded, invariant x <= 5 (relax 1)
    // is capped by the property bound
    let model = r#"{
        "processes": [{
            "name": "P",
            "initial": "L",
            "locations": [{"id": "L", "invariants": [
                {"clock": {"name": "x"}, "operator": "<=", "limit": 5, "relaxation": 1}
            ]}],
            "edges": [{
                "source": "L", "target": "L",
                "guards": [{"clock": {"name": "x"}, "operator": "<=", "limit": 10, "relaxation": 0}],
                "resets": [{"name": "x"}]
            }]
        }],
        "properties": [{"type": "constraint", "clock": {"name": "x"}, "operator": "<=", "limit": 10}]
    }"#;
    let result = run(model, 2);
    assert!(result.supported());
    assert_solutions(&result, &[vec![INF, finite(5, 1)]]);
}

#[test]
fn relaxed_invariant_bounded_by_property_bound() {
    // the invariant bound 5 may grow up to the property bound 10
    let model = r#"{
        "processes": [{
            "name": "P",
            "initial": "L",
            "locations": [{"id": "L", "invariants": [
                {"clock": {"name": "x"}, "operator": "<=", "limit": 5, "relaxation": 0}
            ]}],
            "edges": [{"source": "L", "target": "L"}]
        }],
        "properties": [{"type": "constraint", "clock": {"name": "x"}, "operator": "<=", "limit": 10}]
    }"#;
    let result = run(model, 2);
    assert!(result.supported());
    assert_solutions(&result, &[vec![finite(5, 1)]]);
}

#[test]
fn strict_property_bound_subtracts_epsilon() {
    let model = r#"{
        "processes": [{
            "name": "P",
            "initial": "L",
            "locations": [{"id": "L", "invariants": [
                {"clock": {"name": "x"}, "operator": "<=", "limit": 5, "relaxation": 0}
            ]}],
            "edges": [{"source": "L", "target": "L"}]
        }],
        "properties": [{"type": "constraint", "clock": {"name": "x"}, "operator": "<", "limit": 10}]
    }"#;
    let result = run(model, 2);
    // 10 - 5 = 5, reduced by the default epsilon 1/10
    assert_solutions(&result, &[vec![finite(49, 10)]]);
}

#[test]
fn competing_relaxations_give_unsupported_tradeoff() {
    // two relaxed invariants cover the same property bound: either may
    // stay small, the constraints are genuinely disjunctive
    let model = r#"{
        "processes": [{
            "name": "P",
            "initial": "L",
            "locations": [{"id": "L", "invariants": [
                {"clock": {"name": "x"}, "operator": "<=", "limit": 5, "relaxation": 0},
                {"clock": {"name": "y"}, "operator": "<=", "limit": 8, "relaxation": 1}
            ]}],
            "edges": [{"source": "L", "target": "L"}]
        }],
        "properties": [{"type": "constraint", "clock": {"name": "x"}, "operator": "<=", "limit": 10}]
    }"#;
    let result = run(model, 1);
    assert!(!result.supported());
    assert_solutions(
        &result,
        &[vec![finite(5, 1), INF], vec![INF, finite(2, 1)]],
    );
}

#[test]
fn urgent_location_forbids_any_relaxed_delay() {
    // in an urgent location no time passes, so the property can never be
    // violated and the invariant relaxation is unbounded
    let model = r#"{
        "processes": [{
            "name": "P",
            "initial": "U",
            "locations": [{"id": "U", "urgent": true, "invariants": [
                {"clock": {"name": "x"}, "operator": "<=", "limit": 5, "relaxation": 0}
            ]}],
            "edges": [{"source": "U", "target": "U"}]
        }],
        "properties": [{"type": "constraint", "clock": {"name": "x"}, "operator": "<=", "limit": 10}]
    }"#;
    let result = run(model, 2);
    assert_solutions(&result, &[vec![INF]]);
}

#[test]
fn disjunctive_property_discharged_by_location_predicate() {
    // the property holds wherever the system is in L, independent of
    // clocks, so the guard relaxation is unbounded
    let model = r#"{
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
        "properties": [{
            "type": "or",
            "left": {"type": "location", "id": "L"},
            "right": {"type": "constraint", "clock": {"name": "x"}, "operator": "<=", "limit": 1}
        }]
    }"#;
    let result = run(model, 2);
    assert_solutions(&result, &[vec![INF]]);
}

#[test]
fn violated_property_leaves_no_solution() {
    // the property bound is below what the un-relaxed invariant already
    // allows, so no non-negative relaxation vector is feasible
    let model = r#"{
        "processes": [{
            "name": "P",
            "initial": "L",
            "locations": [{"id": "L", "invariants": [
                {"clock": {"name": "x"}, "operator": "<=", "limit": 5, "relaxation": 0}
            ]}],
            "edges": [{"source": "L", "target": "L"}]
        }],
        "properties": [{"type": "constraint", "clock": {"name": "x"}, "operator": "<=", "limit": 3}]
    }"#;
    let result = run(model, 1);
    assert!(result.solutions().is_empty());
}

#[test]
fn trace_count_equals_path_count_for_each_depth() {
    let model = loop_model(
        r#"{"type": "constraint", "clock": {"name": "x"}, "operator": "<=", "limit": 10}"#,
    );
    for depth in 1..=4 {
        let result = run(&model, depth);
        // a single self loop has exactly one path per length
        assert_eq!(result.stats().pipeline().traces(), depth);
    }
}

#[test]
fn deeper_exploration_does_not_change_the_bound() {
    let model = r#"{
        "processes": [{
            "name": "P",
            "initial": "L",
            "locations": [{"id": "L", "invariants": [
                {"clock": {"name": "x"}, "operator": "<=", "limit": 5, "relaxation": 0}
            ]}],
            "edges": [{"source": "L", "target": "L", "resets": [{"name": "x"}]}]
        }],
        "properties": [{"type": "constraint", "clock": {"name": "x"}, "operator": "<=", "limit": 10}]
    }"#;
    for depth in 1..=3 {
        let result = run(model, depth);
        assert_solutions(&result, &[vec![finite(5, 1)]]);
    }
}

#[test]
fn dumps_are_written_per_phase() {
    let dir = tempfile::tempdir().unwrap();
    let model = loop_model(
        r#"{"type": "constraint", "clock": {"name": "x"}, "operator": "<=", "limit": 10}"#,
    );
    let system = StaticSystem::from_json(&model).unwrap();
    let options = RelaxationOptions {
        depth: 1,
        ..RelaxationOptions::default()
    };
    let mut dump = DumpHandler::directory(dir.path());
    relax(&system, &options, &mut dump).unwrap();

    for location in [
        "trace",
        "trace_formula",
        "qe_input",
        "qe_output",
        "rip_input",
        "rip_output",
        "qf_cnf_formula",
        "qf_dnf_formula",
        "polyhedron_input",
        "polyhedron_output",
    ] {
        assert!(
            dir.path().join(location).is_dir(),
            "missing dump location {}",
            location
        );
    }
    assert!(dir.path().join("trace").join("0.json").is_file());
    assert!(dir
        .path()
        .join("qf_dnf_formula")
        .join("qf_free_dnf_formula.txt")
        .is_file());
}

#[test]
fn two_processes_interleave_and_share_the_property() {
    // the second process has no clocks and must not disturb the bound
    let model = r#"{
        "processes": [
            {
                "name": "P",
                "initial": "L",
                "locations": [{"id": "L", "invariants": [
                    {"clock": {"name": "x"}, "operator": "<=", "limit": 5, "relaxation": 0}
                ]}],
                "edges": [{"source": "L", "target": "L"}]
            },
            {
                "name": "Q",
                "initial": "A",
                "locations": [{"id": "A"}, {"id": "B"}],
                "edges": [{"source": "A", "target": "B"}]
            }
        ],
        "properties": [{"type": "constraint", "clock": {"name": "x"}, "operator": "<=", "limit": 10}]
    }"#;
    let result = run(model, 2);
    assert_solutions(&result, &[vec![finite(5, 1)]]);
}
