//! Real-interval propagation on formulas in conjunctive normal form.
//!
//! Unit clauses contribute interval bounds for their left-hand sums,
//! bounds are propagated to composite sums by signed interval addition,
//! and clauses are rewritten against the resulting intervals until a full
//! pass makes no change. The output is logically equivalent to the input.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use num_traits::{One, Signed, Zero};

use super::{Atom, Formula, InequalitySymbol, Rational, Sum, Summand};
use crate::Error;

/// A rational extended with both infinities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Extended {
    NegInfinity,
    Finite(Rational),
    Infinity,
}

impl Extended {
    fn scale(&self, coefficient: &Rational) -> Extended {
        match self {
            Extended::Finite(value) => Extended::Finite(value * coefficient),
            Extended::Infinity => {
                if coefficient.is_negative() {
                    Extended::NegInfinity
                } else {
                    Extended::Infinity
                }
            }
            Extended::NegInfinity => {
                if coefficient.is_negative() {
                    Extended::Infinity
                } else {
                    Extended::NegInfinity
                }
            }
        }
    }

    fn add(&self, other: &Extended) -> Extended {
        match (self, other) {
            (Extended::Finite(a), Extended::Finite(b)) => Extended::Finite(a + b),
            (Extended::Infinity, Extended::NegInfinity)
            | (Extended::NegInfinity, Extended::Infinity) => {
                unreachable!("adding opposite infinities")
            }
            (Extended::Infinity, _) | (_, Extended::Infinity) => Extended::Infinity,
            (Extended::NegInfinity, _) | (_, Extended::NegInfinity) => Extended::NegInfinity,
        }
    }
}

/// One end of an interval. A plain value type; bounds are copied, never
/// shared, so tightening one interval cannot alias another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Bound {
    pub(crate) value: Extended,
    pub(crate) strict: bool,
}

impl Bound {
    fn finite(value: Rational, strict: bool) -> Self {
        Self {
            value: Extended::Finite(value),
            strict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Interval {
    pub(crate) lower: Bound,
    pub(crate) upper: Bound,
}

impl Interval {
    pub(crate) fn unbounded() -> Self {
        Self {
            lower: Bound {
                value: Extended::NegInfinity,
                strict: false,
            },
            upper: Bound {
                value: Extended::Infinity,
                strict: false,
            },
        }
    }

    /// Replace the upper bound if the new one is tighter. On equal values
    /// the strict bound wins.
    pub(crate) fn tighten_upper(&mut self, upper: Bound) {
        if upper.value > self.upper.value {
            return;
        }
        if upper.value == self.upper.value && (!upper.strict || self.upper.strict) {
            return;
        }
        self.upper = upper;
    }

    /// Replace the lower bound if the new one is tighter. On equal values
    /// the strict bound wins.
    pub(crate) fn tighten_lower(&mut self, lower: Bound) {
        if lower.value < self.lower.value {
            return;
        }
        if lower.value == self.lower.value && (!lower.strict || self.lower.strict) {
            return;
        }
        self.lower = lower;
    }
}

/// Propagate real intervals over a CNF formula, returning an equivalent
/// CNF formula, `FALSE` if a clause runs empty.
pub fn propagate(cnf: &Formula) -> Result<Formula, Error> {
    let clauses = match cnf {
        Formula::Atom(_) | Formula::Not(_) => return Ok(cnf.clone()),
        Formula::Or(_) => {
            let (rewritten, _) = rewrite_clause(cnf, &BTreeMap::new())?;
            return Ok(rewritten);
        }
        Formula::And(arguments) => arguments.clone(),
    };

    let composite_sums = collect_composite_sums(&clauses)?;

    let mut clauses = clauses;
    let mut intervals: BTreeMap<Sum, Interval> = BTreeMap::new();
    let mut changed = true;
    while changed {
        changed = false;
        add_unit_intervals(&mut intervals, &clauses)?;
        add_implied_intervals(&mut intervals, &composite_sums);

        let mut rewritten = BTreeSet::new();
        for clause in &clauses {
            let (clause_out, clause_changed) = rewrite_clause(clause, &intervals)?;
            changed |= clause_changed;
            if clause_out.is_false() {
                return Ok(Formula::FALSE);
            }
            if clause_out.is_true() {
                continue;
            }
            rewritten.insert(Arc::new(clause_out));
        }
        clauses = rewritten;
    }

    Ok(match clauses.len() {
        0 => Formula::TRUE,
        1 => clauses.into_iter().next().unwrap().as_ref().clone(),
        _ => Formula::And(clauses),
    })
}

/// The left-hand sum, symbol and right-hand constant of a literal, with a
/// negation folded into the symbol.
fn literal_parts(literal: &Formula) -> Result<(Sum, InequalitySymbol, Rational), Error> {
    match literal {
        Formula::Atom(Atom::Inequality(inequality)) => Ok((
            inequality.left.clone(),
            inequality.symbol,
            inequality.right.clone(),
        )),
        Formula::Not(inner) => match inner.as_ref() {
            Formula::Atom(Atom::Inequality(inequality)) => {
                let negated = inequality.negated();
                Ok((negated.left, negated.symbol, negated.right))
            }
            _ => Err(Error::NotLra),
        },
        _ => Err(Error::NotLra),
    }
}

/// Split a sum into positive and negative all-unit parts, for unit clauses
/// of the shape `e₁ - e₂ ~ 0` relating two expressions. Propagation across
/// such clauses is only done when every coefficient is `±1`.
fn unit_split(sum: &Sum) -> Option<(Sum, Sum)> {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for summand in sum.summands() {
        if summand.coefficient.is_one() {
            positive.push(summand.clone());
        } else if (-&summand.coefficient).is_one() {
            negative.push(Summand::new(Rational::one(), summand.variable));
        } else {
            return None;
        }
    }
    if positive.is_empty() || negative.is_empty() {
        return None;
    }
    Some((Sum::new(positive), Sum::new(negative)))
}

fn add_unit_intervals(
    intervals: &mut BTreeMap<Sum, Interval>,
    clauses: &BTreeSet<Arc<Formula>>,
) -> Result<(), Error> {
    for clause in clauses {
        if matches!(clause.as_ref(), Formula::Or(_)) || clause.is_true() {
            continue;
        }
        let (sum, symbol, right) = literal_parts(clause)?;

        if right.is_zero() {
            if let Some((left_expr, right_expr)) = unit_split(&sum) {
                // `left_expr ~ right_expr`: copy the matching bound of the
                // side whose interval is already known to the other side.
                let (target, source, is_lower) = if intervals.contains_key(&left_expr) {
                    (right_expr, left_expr, !symbol.is_lower())
                } else if intervals.contains_key(&right_expr) {
                    (left_expr, right_expr, symbol.is_lower())
                } else {
                    continue;
                };
                let interval = &intervals[&source];
                let mut bound = if is_lower {
                    interval.lower.clone()
                } else {
                    interval.upper.clone()
                };
                if symbol.is_strict() {
                    bound.strict = true;
                }
                let entry = intervals.entry(target).or_insert_with(Interval::unbounded);
                if is_lower {
                    entry.tighten_lower(bound);
                } else {
                    entry.tighten_upper(bound);
                }
                continue;
            }
        }

        let bound = Bound::finite(right, symbol.is_strict());
        let entry = intervals.entry(sum).or_insert_with(Interval::unbounded);
        if symbol.is_lower() {
            entry.tighten_lower(bound);
        } else {
            entry.tighten_upper(bound);
        }
    }
    Ok(())
}

/// Compute the interval of every composite sum from the intervals of its
/// variables by signed interval addition. Strictness of the result is the
/// disjunction of the contributing strictnesses.
fn add_implied_intervals(intervals: &mut BTreeMap<Sum, Interval>, composite_sums: &BTreeSet<Sum>) {
    for sum in composite_sums {
        let mut lower = Bound::finite(Rational::zero(), false);
        let mut upper = Bound::finite(Rational::zero(), false);
        let mut skip = false;
        for summand in sum.summands() {
            let component = match intervals.get(&Sum::variable(summand.variable)) {
                Some(component) => component,
                None => {
                    skip = true;
                    break;
                }
            };
            let low = component.lower.value.scale(&summand.coefficient);
            let up = component.upper.value.scale(&summand.coefficient);
            if low <= up {
                lower.value = lower.value.add(&low);
                upper.value = upper.value.add(&up);
                lower.strict |= component.lower.strict;
                upper.strict |= component.upper.strict;
            } else {
                lower.value = lower.value.add(&up);
                upper.value = upper.value.add(&low);
                lower.strict |= component.upper.strict;
                upper.strict |= component.lower.strict;
            }
        }
        if skip {
            continue;
        }
        intervals.insert(sum.clone(), Interval { lower, upper });
    }
}

fn collect_composite_sums(clauses: &BTreeSet<Arc<Formula>>) -> Result<BTreeSet<Sum>, Error> {
    let mut sums = BTreeSet::new();
    for clause in clauses {
        let literals: Vec<&Arc<Formula>> = match clause.as_ref() {
            Formula::Or(literals) => literals.iter().collect(),
            _ => vec![clause],
        };
        for literal in literals {
            if literal.is_true() || literal.is_false() {
                continue;
            }
            let (sum, _, _) = literal_parts(literal)?;
            // anything but a plain variable: several summands, or one
            // summand with a coefficient other than one
            let composite = match sum.summands() {
                [] => false,
                [single] => !single.coefficient.is_one(),
                _ => true,
            };
            if composite {
                sums.insert(sum);
            }
        }
    }
    Ok(sums)
}

/// The truth status of a literal under the known intervals.
enum LiteralStatus {
    Unknown,
    Satisfied,
    Contradicted,
}

fn literal_status(
    sum: &Sum,
    symbol: InequalitySymbol,
    right: Rational,
    intervals: &BTreeMap<Sum, Interval>,
) -> LiteralStatus {
    let interval = match intervals.get(sum) {
        Some(interval) => interval,
        None => return LiteralStatus::Unknown,
    };
    let bound = Bound::finite(right, symbol.is_strict());
    if symbol.is_lower() {
        // literal is a lower bound on the sum
        if bound.value < interval.lower.value
            || (bound.value == interval.lower.value && (interval.lower.strict || !bound.strict))
        {
            return LiteralStatus::Satisfied;
        }
        if bound.value > interval.upper.value
            || (bound.value == interval.upper.value && (bound.strict || interval.upper.strict))
        {
            return LiteralStatus::Contradicted;
        }
    } else {
        if bound.value > interval.upper.value
            || (bound.value == interval.upper.value && (interval.upper.strict || !bound.strict))
        {
            return LiteralStatus::Satisfied;
        }
        if bound.value < interval.lower.value
            || (bound.value == interval.lower.value && (bound.strict || interval.lower.strict))
        {
            return LiteralStatus::Contradicted;
        }
    }
    LiteralStatus::Unknown
}

fn rewrite_clause(
    clause: &Formula,
    intervals: &BTreeMap<Sum, Interval>,
) -> Result<(Formula, bool), Error> {
    let literals = match clause {
        Formula::Or(literals) => literals,
        // A unit clause feeds the intervals itself, so a bound the
        // intervals appear to satisfy may be its own contribution; only
        // the contradiction direction is decided for it.
        literal => {
            let (sum, symbol, right) = literal_parts(literal)?;
            if let LiteralStatus::Contradicted = literal_status(&sum, symbol, right, intervals) {
                return Ok((Formula::FALSE, true));
            }
            return Ok((clause.clone(), false));
        }
    };

    let mut changed = false;
    let mut out = BTreeSet::new();
    for literal in literals {
        let (sum, symbol, right) = literal_parts(literal)?;
        match literal_status(&sum, symbol, right, intervals) {
            LiteralStatus::Satisfied => return Ok((Formula::TRUE, true)),
            LiteralStatus::Contradicted => changed = true,
            LiteralStatus::Unknown => {
                out.insert(literal.clone());
            }
        }
    }
    Ok(match out.len() {
        0 => (Formula::FALSE, true),
        1 => (
            out.into_iter().next().unwrap().as_ref().clone(),
            changed,
        ),
        _ => (Formula::Or(out), changed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::Inequality;

    fn atom(s: &str) -> Formula {
        Formula::atom(s.parse::<Inequality>().unwrap())
    }

    fn finite(value: i64, strict: bool) -> Bound {
        Bound::finite(Rational::from_integer(value.into()), strict)
    }

    #[test]
    fn contradicting_unit_clauses_collapse_to_false() {
        let cnf = Formula::and([atom("1*delta_0 >= 5"), atom("1*delta_0 <= 3")]);
        assert_eq!(propagate(&cnf).unwrap(), Formula::FALSE);
    }

    #[test]
    fn strict_tie_is_contradiction() {
        let cnf = Formula::and([atom("1*delta_0 > 5"), atom("1*delta_0 <= 5")]);
        assert_eq!(propagate(&cnf).unwrap(), Formula::FALSE);
    }

    #[test]
    fn touching_bounds_are_satisfiable() {
        let cnf = Formula::and([atom("1*delta_0 >= 5"), atom("1*delta_0 <= 5")]);
        assert_eq!(propagate(&cnf).unwrap(), cnf);
    }

    #[test]
    fn contradicted_literal_is_dropped_from_clause() {
        let cnf = Formula::and([
            atom("1*delta_0 >= 5"),
            Formula::or([atom("1*delta_0 < 3"), atom("1*relax_0 <= 1")]),
        ]);
        let expected = Formula::and([atom("1*delta_0 >= 5"), atom("1*relax_0 <= 1")]);
        assert_eq!(propagate(&cnf).unwrap(), expected);
    }

    #[test]
    fn satisfied_literal_removes_clause() {
        let cnf = Formula::and([
            atom("1*delta_0 >= 5"),
            Formula::or([atom("1*delta_0 >= 3"), atom("1*relax_0 <= 1")]),
        ]);
        assert_eq!(propagate(&cnf).unwrap(), atom("1*delta_0 >= 5"));
    }

    #[test]
    fn implied_interval_over_composite_sum() {
        let cnf = Formula::and([
            atom("1*delta_0 >= 0"),
            atom("1*delta_0 <= 2"),
            atom("1*delta_1 >= 0"),
            atom("1*delta_1 <= 3"),
            Formula::or([
                atom("1*delta_0 + 1*delta_1 > 6"),
                atom("1*relax_0 >= 1"),
            ]),
        ]);
        let result = propagate(&cnf).unwrap();
        let expected = Formula::and([
            atom("1*delta_0 >= 0"),
            atom("1*delta_0 <= 2"),
            atom("1*delta_1 >= 0"),
            atom("1*delta_1 <= 3"),
            atom("1*relax_0 >= 1"),
        ]);
        assert_eq!(result, expected);
    }

    #[test]
    fn implied_interval_satisfies_clause() {
        let cnf = Formula::and([
            atom("1*delta_0 >= 0"),
            atom("1*delta_0 <= 2"),
            atom("1*delta_1 >= 0"),
            atom("1*delta_1 <= 3"),
            Formula::or([
                atom("1*delta_0 + 1*delta_1 <= 5"),
                atom("1*relax_0 >= 1"),
            ]),
        ]);
        let result = propagate(&cnf).unwrap();
        let expected = Formula::and([
            atom("1*delta_0 >= 0"),
            atom("1*delta_0 <= 2"),
            atom("1*delta_1 >= 0"),
            atom("1*delta_1 <= 3"),
        ]);
        assert_eq!(result, expected);
    }

    #[test]
    fn partner_bound_propagates_across_unit_difference() {
        // delta_0 >= 2 and delta_0 <= delta_1 give delta_1 >= 2
        let cnf = Formula::and([
            atom("1*delta_0 >= 2"),
            atom("1*delta_0 + -1*delta_1 <= 0"),
            Formula::or([atom("1*delta_1 < 1"), atom("1*relax_0 <= 0")]),
        ]);
        let result = propagate(&cnf).unwrap();
        let expected = Formula::and([
            atom("1*delta_0 >= 2"),
            atom("1*delta_0 + -1*delta_1 <= 0"),
            atom("1*relax_0 <= 0"),
        ]);
        assert_eq!(result, expected);
    }

    #[test]
    fn tighten_prefers_strict_on_equal_values() {
        let mut interval = Interval::unbounded();
        interval.tighten_upper(finite(5, false));
        interval.tighten_upper(finite(5, true));
        assert_eq!(interval.upper, finite(5, true));
        // and the non-strict bound does not loosen it again
        interval.tighten_upper(finite(5, false));
        assert_eq!(interval.upper, finite(5, true));

        let mut interval = Interval::unbounded();
        interval.tighten_lower(finite(3, true));
        interval.tighten_lower(finite(3, false));
        assert_eq!(interval.lower, finite(3, true));
        interval.tighten_lower(finite(4, false));
        assert_eq!(interval.lower, finite(4, false));
    }

    #[test]
    fn non_cnf_input_is_rejected() {
        let not_cnf = Formula::and([Formula::and([atom("1*delta_0 >= 0")]), Formula::TRUE]);
        // inner conjunction is not a literal or clause
        assert!(propagate(&not_cnf).is_err());
    }
}
