//! Multi-objective maximization of relaxation variables over the
//! quantifier-free constraint polyhedra.

pub mod pareto;
pub(crate) mod polyhedron;

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use log::debug;
use num_bigint::BigInt;
use num_traits::{One, Zero};

use crate::io::{DumpHandler, DumpLocation};
use crate::logic::{DNFFormula, Inequality, Rational, Variable};
use crate::Error;
use pareto::{dominates, Coord, ParetoSet, Point};
use polyhedron::{enumerate_generators, Generators};

#[derive(Debug, Default, Clone)]
pub struct OptimizationStats {
    terms: usize,
    solutions: usize,
    time: Duration,
}

impl OptimizationStats {
    pub fn terms(&self) -> usize {
        self.terms
    }

    pub fn solutions(&self) -> usize {
        self.solutions
    }

    pub fn time(&self) -> Duration {
        self.time
    }
}

impl fmt::Display for OptimizationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "|D| = {}, |P| = {}, optimization time: {:.2}",
            self.terms(),
            self.solutions(),
            self.time().as_secs_f32(),
        )
    }
}

/// Maximizes relaxation variables over each disjunct of a [`DNFFormula`]
/// by enumerating the vertices and rays of its polyhedron and feeding
/// them, together with sampled edge points, into a Pareto set.
pub struct Optimizer {
    grid_points: usize,
    input_dump: DumpLocation,
    output_dump: DumpLocation,
    stats: OptimizationStats,
}

impl Optimizer {
    pub fn new(grid_points: usize, dump: &mut DumpHandler) -> Result<Self, Error> {
        Ok(Self {
            grid_points,
            input_dump: dump.create_location("polyhedron_input")?,
            output_dump: dump.create_location("polyhedron_output")?,
            stats: OptimizationStats::default(),
        })
    }

    pub fn method(&self) -> &'static str {
        "double description"
    }

    pub fn stats(&self) -> &OptimizationStats {
        &self.stats
    }

    /// Maximize the objectives subject to the constraints. Returns the
    /// Pareto-optimal solutions and whether they are supported, which is
    /// the case exactly for purely conjunctive constraints.
    pub fn maximize(
        &mut self,
        objectives: &[Variable],
        constraints: &DNFFormula,
        epsilon: &Rational,
    ) -> Result<(BTreeSet<Point>, bool), Error> {
        let start = Instant::now();
        let supported = constraints.terms.len() == 1;
        let mut output = ParetoSet::new();
        for (term_idx, term) in constraints.terms.iter().enumerate() {
            self.maximize_term(objectives, epsilon, term_idx, term, &mut output)?;
        }
        self.stats.terms = constraints.terms.len();
        self.stats.solutions = output.len();
        self.stats.time += start.elapsed();
        Ok((output.into_points(), supported))
    }

    fn maximize_term(
        &mut self,
        objectives: &[Variable],
        epsilon: &Rational,
        term_idx: usize,
        term: &BTreeSet<Inequality>,
        output: &mut ParetoSet,
    ) -> Result<(), Error> {
        let rows = to_matrix(objectives, term, epsilon)?;
        self.input_dump
            .write(&format!("{}.txt", term_idx), &matrix_dump(&rows))?;
        let generators = enumerate_generators(objectives.len(), &rows);
        self.output_dump
            .write(&format!("{}.txt", term_idx), &generators_dump(&generators))?;

        if generators.vertices.is_empty() && generators.rays.is_empty() {
            debug!("disjunct {} is infeasible, skipping", term_idx);
            return Ok(());
        }

        let mask = unbounded_mask(objectives.len(), &generators.rays);

        if generators.vertices.is_empty() {
            let origin = vec![Rational::zero(); objectives.len()];
            output.add(masked(&origin, &mask));
            return Ok(());
        }

        // pre-filter vertices dominated under the unbounded mask
        let masked_vertices: Vec<Point> = generators
            .vertices
            .iter()
            .map(|vertex| masked(vertex, &mask))
            .collect();
        let dominated: Vec<bool> = masked_vertices
            .iter()
            .enumerate()
            .map(|(i, vertex)| {
                masked_vertices
                    .iter()
                    .enumerate()
                    .any(|(j, other)| i != j && dominates(other, vertex))
            })
            .collect();

        let thetas = grid_thetas(self.grid_points);
        for (i, vertex) in generators.vertices.iter().enumerate() {
            if dominated[i] {
                continue;
            }
            output.add(masked_vertices[i].clone());
            for &j in &generators.adjacency[i] {
                if j <= i || dominated[j] {
                    continue;
                }
                let adjacent = &generators.vertices[j];
                for theta in &thetas {
                    let complement = Rational::one() - theta;
                    let sample: Vec<Rational> = vertex
                        .iter()
                        .zip(adjacent)
                        .map(|(a, b)| a * theta + b * &complement)
                        .collect();
                    output.add(masked(&sample, &mask));
                }
            }
        }
        Ok(())
    }
}

/// Translate a conjunction of inequalities over the objectives into rows
/// `a·x <= b`. Strict inequalities are weakened by epsilon.
fn to_matrix(
    objectives: &[Variable],
    term: &BTreeSet<Inequality>,
    epsilon: &Rational,
) -> Result<Vec<(Vec<Rational>, Rational)>, Error> {
    let mut rows = Vec::with_capacity(term.len());
    for inequality in term {
        let factor = if inequality.symbol.is_lower() {
            -Rational::one()
        } else {
            Rational::one()
        };
        let offset = if inequality.is_strict() {
            epsilon.clone()
        } else {
            Rational::zero()
        };
        let rhs = &inequality.right * &factor - offset;
        let mut coefficients = vec![Rational::zero(); objectives.len()];
        for summand in inequality.left.summands() {
            let idx = objectives
                .iter()
                .position(|&objective| objective == summand.variable)
                .ok_or_else(|| {
                    Error::QuantifierElimination(format!(
                        "unexpected variable {} in optimizer constraints",
                        summand.variable
                    ))
                })?;
            coefficients[idx] += &factor * &summand.coefficient;
        }
        rows.push((coefficients, rhs));
    }
    Ok(rows)
}

/// Mark every coordinate some ray moves in as unbounded.
fn unbounded_mask(dim: usize, rays: &[Vec<Rational>]) -> Vec<bool> {
    let mut mask = vec![false; dim];
    for ray in rays {
        for (i, coordinate) in ray.iter().enumerate() {
            if !coordinate.is_zero() {
                mask[i] = true;
            }
        }
    }
    mask
}

fn masked(values: &[Rational], mask: &[bool]) -> Point {
    values
        .iter()
        .zip(mask)
        .map(|(value, &unbounded)| {
            if unbounded {
                Coord::Infinite
            } else {
                Coord::Finite(value.clone())
            }
        })
        .collect()
}

/// The convex combination parameters along an edge: `grid_points` equally
/// spaced values from one down to zero, both endpoints included.
fn grid_thetas(grid_points: usize) -> Vec<Rational> {
    if grid_points <= 1 {
        return vec![Rational::one()];
    }
    let denominator = grid_points - 1;
    (0..grid_points)
        .map(|t| {
            Rational::new(
                BigInt::from((denominator - t) as u64),
                BigInt::from(denominator as u64),
            )
        })
        .collect()
}

fn matrix_dump(rows: &[(Vec<Rational>, Rational)]) -> String {
    let mut out = String::new();
    for (coefficients, rhs) in rows {
        let rendered: Vec<String> = coefficients.iter().map(|c| c.to_string()).collect();
        out.push_str(&format!("{} <= {}\n", rendered.join(" "), rhs));
    }
    out
}

fn generators_dump(generators: &Generators) -> String {
    let mut out = String::new();
    for vertex in &generators.vertices {
        let rendered: Vec<String> = vertex.iter().map(|c| c.to_string()).collect();
        out.push_str(&format!("V: {}\n", rendered.join(" ")));
    }
    for ray in &generators.rays {
        let rendered: Vec<String> = ray.iter().map(|c| c.to_string()).collect();
        out.push_str(&format!("R: {}\n", rendered.join(" ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rational(numer: i64, denom: i64) -> Rational {
        Rational::new(numer.into(), denom.into())
    }

    fn finite(numer: i64, denom: i64) -> Coord {
        Coord::Finite(rational(numer, denom))
    }

    fn term(inequalities: &[&str]) -> BTreeSet<Inequality> {
        inequalities.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn optimizer(grid_points: usize) -> Optimizer {
        Optimizer::new(grid_points, &mut DumpHandler::noop()).unwrap()
    }

    #[test]
    fn single_bounded_objective() {
        let dnf = DNFFormula::new(vec![term(&["1*relax_0 <= 5", "1*relax_0 >= 0"])]);
        let (solutions, supported) = optimizer(2)
            .maximize(&[Variable::Relaxation(0)], &dnf, &rational(1, 10))
            .unwrap();
        assert!(supported);
        assert_eq!(solutions, BTreeSet::from([vec![finite(5, 1)]]));
    }

    #[test]
    fn strict_bound_is_reduced_by_epsilon() {
        let dnf = DNFFormula::new(vec![term(&["1*relax_0 < 5"])]);
        let (solutions, _) = optimizer(2)
            .maximize(&[Variable::Relaxation(0)], &dnf, &rational(1, 10))
            .unwrap();
        assert_eq!(solutions, BTreeSet::from([vec![finite(49, 10)]]));
    }

    #[test]
    fn unbounded_objective_is_masked_infinite() {
        // only relax_1 is bounded
        let dnf = DNFFormula::new(vec![term(&["1*relax_1 <= 5"])]);
        let (solutions, supported) = optimizer(2)
            .maximize(
                &[Variable::Relaxation(0), Variable::Relaxation(1)],
                &dnf,
                &rational(1, 10),
            )
            .unwrap();
        assert!(supported);
        assert_eq!(
            solutions,
            BTreeSet::from([vec![Coord::Infinite, finite(5, 1)]])
        );
    }

    #[test]
    fn fully_unbounded_gives_all_infinite() {
        let dnf = DNFFormula::new(vec![BTreeSet::new()]);
        let (solutions, supported) = optimizer(2)
            .maximize(
                &[Variable::Relaxation(0), Variable::Relaxation(1)],
                &dnf,
                &rational(1, 10),
            )
            .unwrap();
        assert!(supported);
        assert_eq!(
            solutions,
            BTreeSet::from([vec![Coord::Infinite, Coord::Infinite]])
        );
    }

    #[test]
    fn infeasible_disjunct_is_skipped() {
        let dnf = DNFFormula::new(vec![
            term(&["1*relax_0 <= -1"]),
            term(&["1*relax_0 <= 2"]),
        ]);
        let (solutions, supported) = optimizer(2)
            .maximize(&[Variable::Relaxation(0)], &dnf, &rational(1, 10))
            .unwrap();
        assert!(!supported);
        assert_eq!(solutions, BTreeSet::from([vec![finite(2, 1)]]));
    }

    #[test]
    fn no_feasible_disjunct_yields_empty_set() {
        let dnf = DNFFormula::new(vec![term(&["1*relax_0 <= -1"])]);
        let (solutions, _) = optimizer(2)
            .maximize(&[Variable::Relaxation(0)], &dnf, &rational(1, 10))
            .unwrap();
        assert!(solutions.is_empty());
    }

    #[test]
    fn tradeoff_face_is_sampled_at_grid_points() {
        // relax_0 + relax_1 <= 4: the Pareto front is the sloped edge
        let dnf = DNFFormula::new(vec![term(&["1*relax_0 + 1*relax_1 <= 4"])]);
        let (solutions, supported) = optimizer(3)
            .maximize(
                &[Variable::Relaxation(0), Variable::Relaxation(1)],
                &dnf,
                &rational(1, 10),
            )
            .unwrap();
        assert!(supported);
        // corners (4,0), (0,4) and the interior grid sample (2,2)
        assert_eq!(
            solutions,
            BTreeSet::from([
                vec![finite(4, 1), finite(0, 1)],
                vec![finite(2, 1), finite(2, 1)],
                vec![finite(0, 1), finite(4, 1)],
            ])
        );
    }

    #[test]
    fn two_disjuncts_are_not_supported() {
        let dnf = DNFFormula::new(vec![
            term(&["1*relax_0 <= 2", "1*relax_1 <= 5"]),
            term(&["1*relax_0 <= 5", "1*relax_1 <= 2"]),
        ]);
        let (solutions, supported) = optimizer(2)
            .maximize(
                &[Variable::Relaxation(0), Variable::Relaxation(1)],
                &dnf,
                &rational(1, 10),
            )
            .unwrap();
        assert!(!supported);
        assert_eq!(
            solutions,
            BTreeSet::from([
                vec![finite(2, 1), finite(5, 1)],
                vec![finite(5, 1), finite(2, 1)],
            ])
        );
    }
}
