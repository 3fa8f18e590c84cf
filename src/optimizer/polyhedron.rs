//! Vertex and ray enumeration of convex polyhedra by the double
//! description method, over exact rationals.
//!
//! The polyhedron `{ x : A·x <= b, x >= 0 }` is homogenized into the cone
//! `{ (x₀, x) >= 0 : b·x₀ - A·x >= 0 }`. Starting from the unit rays of
//! the non-negative orthant, the constraint rows are added one at a time;
//! straddling pairs of adjacent extreme rays are combined into new rays on
//! the hyperplane. Rays with `x₀ > 0` are scaled into vertices.

use fixedbitset::FixedBitSet;

use num_traits::{One, Signed, Zero};

use crate::logic::Rational;

/// The generator representation of a polyhedron: its extreme points, its
/// extreme rays, and the adjacency between vertices.
#[derive(Debug, Clone)]
pub(crate) struct Generators {
    pub(crate) vertices: Vec<Vec<Rational>>,
    pub(crate) rays: Vec<Vec<Rational>>,
    /// for each vertex, the indices of adjacent vertices
    pub(crate) adjacency: Vec<Vec<usize>>,
}

impl Generators {
    fn empty() -> Self {
        Self {
            vertices: Vec::new(),
            rays: Vec::new(),
            adjacency: Vec::new(),
        }
    }
}

struct Ray {
    coords: Vec<Rational>,
    /// indices of the constraints satisfied with equality
    tight: FixedBitSet,
}

/// Enumerate the generators of `{ x : rows, x >= 0 }`, where each row
/// `(a, b)` denotes `a·x <= b`. An infeasible system yields no generators.
pub(crate) fn enumerate_generators(
    dim: usize,
    rows: &[(Vec<Rational>, Rational)],
) -> Generators {
    let homogeneous_dim = dim + 1;
    let total_constraints = homogeneous_dim + rows.len();

    // unit rays of the orthant; each is tight at every orthant constraint
    // except its own
    let mut rays: Vec<Ray> = (0..homogeneous_dim)
        .map(|i| {
            let mut coords = vec![Rational::zero(); homogeneous_dim];
            coords[i] = Rational::one();
            let mut tight = FixedBitSet::with_capacity(total_constraints);
            for j in 0..homogeneous_dim {
                if j != i {
                    tight.insert(j);
                }
            }
            Ray { coords, tight }
        })
        .collect();

    for (k, (coefficients, rhs)) in rows.iter().enumerate() {
        let constraint_index = homogeneous_dim + k;

        // homogenized constraint value b·x₀ - a·x per ray
        let values: Vec<Rational> = rays
            .iter()
            .map(|ray| {
                let mut value = rhs * &ray.coords[0];
                for (coefficient, coordinate) in coefficients.iter().zip(&ray.coords[1..]) {
                    value -= coefficient * coordinate;
                }
                value
            })
            .collect();

        // combine adjacent pairs straddling the hyperplane
        let mut created: Vec<Ray> = Vec::new();
        for (i, positive) in rays.iter().enumerate() {
            if !values[i].is_positive() {
                continue;
            }
            for (j, negative) in rays.iter().enumerate() {
                if !values[j].is_negative() {
                    continue;
                }
                if !adjacent(&rays, i, j) {
                    continue;
                }
                let mut coords: Vec<Rational> = positive
                    .coords
                    .iter()
                    .zip(&negative.coords)
                    .map(|(p, n)| &values[i] * n - &values[j] * p)
                    .collect();
                normalize(&mut coords);
                let mut tight = positive.tight.clone();
                tight.intersect_with(&negative.tight);
                tight.insert(constraint_index);
                created.push(Ray { coords, tight });
            }
        }

        let old = std::mem::take(&mut rays);
        for (mut ray, value) in old.into_iter().zip(values) {
            if value.is_negative() {
                continue;
            }
            if value.is_zero() {
                ray.tight.insert(constraint_index);
            }
            rays.push(ray);
        }
        rays.extend(created);

        if rays.is_empty() {
            return Generators::empty();
        }
    }

    // split into vertices (x₀ > 0, scaled to x₀ = 1) and rays (x₀ = 0)
    let mut vertices = Vec::new();
    let mut vertex_tights = Vec::new();
    let mut directions = Vec::new();
    let mut direction_tights = Vec::new();
    for ray in rays {
        if ray.coords[0].is_positive() {
            let x0 = ray.coords[0].clone();
            vertices.push(
                ray.coords[1..]
                    .iter()
                    .map(|coordinate| coordinate / &x0)
                    .collect::<Vec<_>>(),
            );
            vertex_tights.push(ray.tight);
        } else {
            directions.push(ray.coords[1..].to_vec());
            direction_tights.push(ray.tight);
        }
    }

    // without a single point the inequality system is infeasible and the
    // leftover recession directions are meaningless
    if vertices.is_empty() {
        return Generators::empty();
    }

    let witnesses: Vec<&FixedBitSet> = vertex_tights
        .iter()
        .chain(direction_tights.iter())
        .collect();
    let mut adjacency = vec![Vec::new(); vertices.len()];
    for i in 0..vertices.len() {
        for j in i + 1..vertices.len() {
            let mut common = vertex_tights[i].clone();
            common.intersect_with(&vertex_tights[j]);
            let is_adjacent = witnesses
                .iter()
                .enumerate()
                .all(|(w, other)| w == i || w == j || !common.is_subset(other));
            if is_adjacent {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }

    Generators {
        vertices,
        rays: directions,
        adjacency,
    }
}

/// Two extreme rays are adjacent iff no other extreme ray is tight at
/// every constraint both of them are tight at.
fn adjacent(rays: &[Ray], i: usize, j: usize) -> bool {
    let mut common = rays[i].tight.clone();
    common.intersect_with(&rays[j].tight);
    rays.iter()
        .enumerate()
        .all(|(k, other)| k == i || k == j || !common.is_subset(&other.tight))
}

/// Scale so that the first non-zero coordinate has absolute value one.
fn normalize(coords: &mut [Rational]) {
    let scale = coords
        .iter()
        .find(|coordinate| !coordinate.is_zero())
        .map(|coordinate| coordinate.abs());
    if let Some(scale) = scale {
        for coordinate in coords.iter_mut() {
            *coordinate = &*coordinate / &scale;
        }
    }
}
