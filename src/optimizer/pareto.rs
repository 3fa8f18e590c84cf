//! Pareto-optimal solution sets under component-wise dominance.

use std::collections::BTreeSet;
use std::fmt;

use crate::logic::Rational;

/// One coordinate of a solution: a rational value or positive infinity
/// for an unbounded relaxation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Coord {
    Finite(Rational),
    Infinite,
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(value) => write!(f, "{}", value),
            Self::Infinite => write!(f, "inf"),
        }
    }
}

/// A solution vector, one coordinate per relaxation variable.
pub type Point = Vec<Coord>;

/// Whether `p` dominates `q`: component-wise at least as large, and
/// strictly larger in some component.
pub fn dominates(p: &[Coord], q: &[Coord]) -> bool {
    p.iter().zip(q).all(|(a, b)| a >= b) && p.iter().zip(q).any(|(a, b)| a > b)
}

/// A set of points closed under dominance: no stored point dominates
/// another.
#[derive(Debug, Default)]
pub struct ParetoSet {
    points: BTreeSet<Point>,
}

impl ParetoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a point unless it is dominated; evicts any point the new
    /// one dominates.
    pub fn add(&mut self, point: Point) {
        let mut evicted = Vec::new();
        for existing in &self.points {
            if dominates(&point, existing) {
                evicted.push(existing.clone());
                continue;
            }
            if dominates(existing, &point) {
                return;
            }
        }
        for existing in evicted {
            self.points.remove(&existing);
        }
        self.points.insert(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_points(self) -> BTreeSet<Point> {
        self.points
    }
}
