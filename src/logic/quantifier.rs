//! Quantifier elimination for linear real arithmetic.
//!
//! The elimination backend is exchangeable; the built-in reference
//! backend implements Fourier–Motzkin elimination over the crate's own
//! formula representation.

use std::collections::BTreeSet;

use num_traits::{One, Signed};

use super::normalform::Transformer;
use super::{DNFFormula, Formula, Inequality, InequalitySymbol, Rational, Sum, Variable};
use crate::Error;

/// A backend that eliminates a block of universally quantified variables
/// from an LRA sentence.
pub trait QuantifierEliminator {
    /// The name of the elimination method, for statistics.
    fn name(&self) -> &'static str;

    /// Return a quantifier-free formula equivalent to `∀ variables. body`.
    ///
    /// The result must only mention variables free in `body` outside the
    /// quantified block; the caller treats any leftover as a fatal error.
    fn eliminate_universal(
        &mut self,
        variables: &[Variable],
        body: &Formula,
    ) -> Result<Formula, Error>;
}

/// Fourier–Motzkin elimination: `∀x. F` is `¬∃x. ¬F`; the negation is
/// brought into disjunctive normal form and `x` is projected out of each
/// disjunct by combining its lower and upper bounds pairwise.
#[derive(Debug, Default)]
pub struct FourierMotzkin;

impl FourierMotzkin {
    pub fn new() -> Self {
        Self
    }
}

impl QuantifierEliminator for FourierMotzkin {
    fn name(&self) -> &'static str {
        "Fourier-Motzkin"
    }

    fn eliminate_universal(
        &mut self,
        variables: &[Variable],
        body: &Formula,
    ) -> Result<Formula, Error> {
        let negated = Transformer::nnf().transform(&Formula::not(body.clone()));
        let dnf = Transformer::dnf().transform(&negated);

        let mut surviving: Vec<BTreeSet<Inequality>> = Vec::new();
        'terms: for term in DNFFormula::from_formula(&dnf).terms {
            // settle variable-free atoms up front
            let mut constraints = BTreeSet::new();
            for inequality in term {
                match inequality.constant_truth() {
                    Some(true) => {}
                    Some(false) => continue 'terms,
                    None => {
                        constraints.insert(inequality);
                    }
                }
            }
            for &variable in variables {
                constraints = match eliminate_existential(variable, constraints) {
                    Some(remaining) => remaining,
                    // the disjunct is infeasible and contributes nothing
                    None => continue 'terms,
                };
            }
            surviving.push(constraints);
        }

        // negate the projected existential back into the universal result
        let result = Formula::and(surviving.into_iter().map(|term| {
            Formula::or(
                term.into_iter()
                    .map(|inequality| Formula::atom(inequality.negated())),
            )
        }));
        Ok(Transformer::nnf().transform(&result))
    }
}

/// Project `variable` out of a conjunction of inequalities.
///
/// Returns `None` if a combination of bounds is contradictory, making the
/// conjunction infeasible.
fn eliminate_existential(
    variable: Variable,
    constraints: BTreeSet<Inequality>,
) -> Option<BTreeSet<Inequality>> {
    let mut rest = BTreeSet::new();
    // bound: (sum part, constant part, strict)
    let mut lowers: Vec<(Sum, Rational, bool)> = Vec::new();
    let mut uppers: Vec<(Sum, Rational, bool)> = Vec::new();

    for inequality in constraints {
        let coefficient = match inequality.left.coefficient_of(variable).cloned() {
            None => {
                rest.insert(inequality);
                continue;
            }
            Some(coefficient) => coefficient,
        };
        // c*x + r ~ b  becomes  x ~' (b - r) / c, with ~ turned for c < 0
        let remainder = inequality.left.without(variable);
        let bound_sum = remainder.scale(&(-Rational::one() / &coefficient));
        let bound_const = &inequality.right / &coefficient;
        let symbol = if coefficient.is_negative() {
            inequality.symbol.turned()
        } else {
            inequality.symbol
        };
        if symbol.is_lower() {
            lowers.push((bound_sum, bound_const, symbol.is_strict()));
        } else {
            uppers.push((bound_sum, bound_const, symbol.is_strict()));
        }
    }

    if lowers.is_empty() || uppers.is_empty() {
        // unbounded on one side, every constraint on the variable is satisfiable
        return Some(rest);
    }

    for (lower_sum, lower_const, lower_strict) in &lowers {
        for (upper_sum, upper_const, upper_strict) in &uppers {
            let symbol = if *lower_strict || *upper_strict {
                InequalitySymbol::LessThan
            } else {
                InequalitySymbol::LessEqual
            };
            let combined = Inequality::new(
                lower_sum.subtract(upper_sum),
                symbol,
                upper_const - lower_const,
            );
            match combined.constant_truth() {
                Some(true) => {}
                Some(false) => return None,
                None => {
                    rest.insert(combined);
                }
            }
        }
    }
    Some(rest)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use num_bigint::BigInt;

    use super::*;

    fn atom(s: &str) -> Formula {
        Formula::atom(s.parse::<Inequality>().unwrap())
    }

    fn assert_equivalent_over(left: &Formula, right: &Formula, variable: Variable) {
        for sample in [-10, -6, -5, -1, 0, 1, 5, 6, 10] {
            let env: BTreeMap<Variable, Rational> =
                BTreeMap::from([(variable, Rational::from_integer(BigInt::from(sample)))]);
            assert_eq!(
                left.evaluate(&env),
                right.evaluate(&env),
                "differs at {} = {}",
                variable,
                sample
            );
        }
    }

    #[test]
    fn eliminates_single_delta() {
        // forall delta_0. (delta_0 >= 0 and delta_0 - relax_0 <= 5) => delta_0 <= 10
        let trace = Formula::and([atom("1*delta_0 >= 0"), atom("1*delta_0 + -1*relax_0 <= 5")]);
        let props = atom("1*delta_0 <= 10");
        let body = Formula::implies(trace, props);

        let result = FourierMotzkin::new()
            .eliminate_universal(&[Variable::Delta(0)], &body)
            .unwrap();

        assert!(result
            .variables()
            .iter()
            .all(|v| matches!(v, Variable::Relaxation(_))));
        // equivalent to relax_0 <= 5 (or relax_0 < -5, where the trace is empty)
        let expected = Formula::or([atom("1*relax_0 <= 5"), atom("1*relax_0 < -5")]);
        assert_equivalent_over(&result, &expected, Variable::Relaxation(0));
    }

    #[test]
    fn valid_sentence_becomes_true() {
        let body = Formula::implies(atom("1*delta_0 >= 0"), atom("1*delta_0 >= -1"));
        let result = FourierMotzkin::new()
            .eliminate_universal(&[Variable::Delta(0)], &body)
            .unwrap();
        assert_eq!(result, Formula::TRUE);
    }

    #[test]
    fn unsatisfiable_sentence_becomes_false() {
        // forall delta_0. delta_0 <= 1 is false
        let result = FourierMotzkin::new()
            .eliminate_universal(&[Variable::Delta(0)], &atom("1*delta_0 <= 1"))
            .unwrap();
        assert_eq!(result, Formula::FALSE);
    }

    #[test]
    fn eliminates_block_of_deltas() {
        // forall d0 d1. (d0 >= 0 and d1 >= 0 and d0 + d1 - relax_0 <= 4) => d0 + d1 <= 6
        let trace = Formula::and([
            atom("1*delta_0 >= 0"),
            atom("1*delta_1 >= 0"),
            atom("1*delta_0 + 1*delta_1 + -1*relax_0 <= 4"),
        ]);
        let props = atom("1*delta_0 + 1*delta_1 <= 6");
        let body = Formula::implies(trace, props);

        let result = FourierMotzkin::new()
            .eliminate_universal(&[Variable::Delta(0), Variable::Delta(1)], &body)
            .unwrap();

        assert!(result
            .variables()
            .iter()
            .all(|v| matches!(v, Variable::Relaxation(_))));
        let expected = Formula::or([atom("1*relax_0 <= 2"), atom("1*relax_0 < -4")]);
        assert_equivalent_over(&result, &expected, Variable::Relaxation(0));
    }

    #[test]
    fn strictness_is_preserved() {
        // forall delta_0. (delta_0 >= 0 and delta_0 - relax_0 <= 5) => delta_0 < 10
        let trace = Formula::and([atom("1*delta_0 >= 0"), atom("1*delta_0 + -1*relax_0 <= 5")]);
        let body = Formula::implies(trace, atom("1*delta_0 < 10"));
        let result = FourierMotzkin::new()
            .eliminate_universal(&[Variable::Delta(0)], &body)
            .unwrap();
        // equivalent to relax_0 < 5 on the non-vacuous side
        let expected = Formula::or([atom("1*relax_0 < 5"), atom("1*relax_0 < -5")]);
        assert_equivalent_over(&result, &expected, Variable::Relaxation(0));
    }
}
