//! Normal-form transformation of formulas.
//!
//! One transformer covers negation normal form, conjunctive normal form
//! and disjunctive normal form. All three share a rewrite walk that is
//! rerun until no rule fires.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::{Atom, Formula};

/// The target normal form of a [`Transformer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalForm {
    /// Negations pushed down to atoms.
    Nnf,
    /// A conjunction of disjunctive clauses.
    Cnf,
    /// A disjunction of conjunctive terms.
    Dnf,
}

/// Rewrites a formula into an equivalent formula in the target normal form.
pub struct Transformer {
    target: NormalForm,
    changed: bool,
    runs: usize,
}

impl Transformer {
    pub fn new(target: NormalForm) -> Self {
        Self {
            target,
            changed: false,
            runs: 0,
        }
    }

    pub fn nnf() -> Self {
        Self::new(NormalForm::Nnf)
    }

    pub fn cnf() -> Self {
        Self::new(NormalForm::Cnf)
    }

    pub fn dnf() -> Self {
        Self::new(NormalForm::Dnf)
    }

    /// Number of walks over the formula in the last transformation.
    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn transform(&mut self, formula: &Formula) -> Formula {
        self.runs = 0;
        let mut current = formula.clone();
        loop {
            self.changed = false;
            current = self.walk(&current);
            self.runs += 1;
            if !self.changed {
                return current;
            }
        }
    }

    fn walk(&mut self, formula: &Formula) -> Formula {
        match formula {
            Formula::Atom(_) => formula.clone(),
            Formula::Not(argument) => {
                let walked = self.walk(argument);
                self.rewrite_not(walked)
            }
            Formula::And(arguments) => {
                let walked: Vec<Formula> = arguments.iter().map(|a| self.walk(a)).collect();
                self.rewrite_and(walked)
            }
            Formula::Or(arguments) => {
                let walked: Vec<Formula> = arguments.iter().map(|a| self.walk(a)).collect();
                self.rewrite_or(walked)
            }
        }
    }

    fn rewrite_not(&mut self, argument: Formula) -> Formula {
        match argument {
            // a negated inequality is a literal and stays put
            Formula::Atom(Atom::Inequality(_)) => Formula::Not(Arc::new(argument)),
            Formula::Atom(Atom::Constant(value)) => {
                self.changed = true;
                Formula::Atom(Atom::Constant(!value))
            }
            Formula::Not(inner) => {
                self.changed = true;
                inner.as_ref().clone()
            }
            Formula::And(arguments) => {
                self.changed = true;
                Formula::Or(Self::negate_all(&arguments))
            }
            Formula::Or(arguments) => {
                self.changed = true;
                Formula::And(Self::negate_all(&arguments))
            }
        }
    }

    fn negate_all(arguments: &BTreeSet<Arc<Formula>>) -> BTreeSet<Arc<Formula>> {
        arguments
            .iter()
            .map(|argument| Arc::new(Formula::Not(argument.clone())))
            .collect()
    }

    fn rewrite_and(&mut self, arguments: Vec<Formula>) -> Formula {
        let mut members: BTreeSet<Arc<Formula>> = BTreeSet::new();
        for argument in arguments {
            match argument {
                // identity
                Formula::Atom(Atom::Constant(true)) => {}
                Formula::Atom(Atom::Constant(false)) => return Formula::FALSE,
                // idempotence: flatten nested conjunction
                Formula::And(nested) => members.extend(nested),
                other => {
                    members.insert(Arc::new(other));
                }
            }
        }

        // contradiction
        for member in &members {
            if let Formula::Not(negated) = member.as_ref() {
                if members.contains(negated) {
                    return Formula::FALSE;
                }
            }
        }

        Self::absorb(&mut members, |member| matches!(member, Formula::Or(_)));

        if members.is_empty() {
            return Formula::TRUE;
        }
        if members.len() == 1 {
            return members.into_iter().next().unwrap().as_ref().clone();
        }

        if self.target == NormalForm::Dnf {
            if let Some(distributed) = self.distribute(&members, false) {
                return distributed;
            }
        }

        Formula::And(members)
    }

    fn rewrite_or(&mut self, arguments: Vec<Formula>) -> Formula {
        let mut members: BTreeSet<Arc<Formula>> = BTreeSet::new();
        for argument in arguments {
            match argument {
                Formula::Atom(Atom::Constant(true)) => return Formula::TRUE,
                // identity
                Formula::Atom(Atom::Constant(false)) => {}
                // idempotence: flatten nested disjunction
                Formula::Or(nested) => members.extend(nested),
                other => {
                    members.insert(Arc::new(other));
                }
            }
        }

        // tautology
        for member in &members {
            if let Formula::Not(negated) = member.as_ref() {
                if members.contains(negated) {
                    return Formula::TRUE;
                }
            }
        }

        Self::absorb(&mut members, |member| matches!(member, Formula::And(_)));

        if members.is_empty() {
            return Formula::FALSE;
        }
        if members.len() == 1 {
            return members.into_iter().next().unwrap().as_ref().clone();
        }

        if self.target == NormalForm::Cnf {
            if let Some(distributed) = self.distribute(&members, true) {
                return distributed;
            }
        }

        Formula::Or(members)
    }

    /// Absorption across sibling clauses: a clause whose literal set is a
    /// proper superset of another sibling's literal set is removed.
    fn absorb(members: &mut BTreeSet<Arc<Formula>>, is_clause: fn(&Formula) -> bool) {
        let literal_sets: Vec<(Arc<Formula>, BTreeSet<Arc<Formula>>)> = members
            .iter()
            .map(|member| (member.clone(), Self::clause_literals(member)))
            .collect();
        let mut absorbed = Vec::new();
        for (member, literals) in &literal_sets {
            if !is_clause(member) {
                continue;
            }
            for (_, other_literals) in &literal_sets {
                if literals == other_literals {
                    continue;
                }
                if other_literals.is_subset(literals) {
                    absorbed.push(member.clone());
                    break;
                }
            }
        }
        for member in absorbed {
            members.remove(&member);
        }
    }

    fn clause_literals(member: &Arc<Formula>) -> BTreeSet<Arc<Formula>> {
        match member.as_ref() {
            Formula::And(arguments) | Formula::Or(arguments) => arguments.clone(),
            _ => BTreeSet::from([member.clone()]),
        }
    }

    /// Distribute one nested connective of the opposite kind over the
    /// members: for CNF, `A ∨ (B₁ ∧ B₂)` becomes `(A ∨ B₁) ∧ (A ∨ B₂)`;
    /// for DNF the dual. Returns `None` if no member of the opposite kind
    /// is present.
    fn distribute(&mut self, members: &BTreeSet<Arc<Formula>>, over_and: bool) -> Option<Formula> {
        let nested = members.iter().find(|member| {
            if over_and {
                matches!(member.as_ref(), Formula::And(_))
            } else {
                matches!(member.as_ref(), Formula::Or(_))
            }
        })?;
        let branches = match nested.as_ref() {
            Formula::And(branches) | Formula::Or(branches) => branches,
            _ => unreachable!(),
        };

        self.changed = true;
        let rest: BTreeSet<Arc<Formula>> = members
            .iter()
            .filter(|member| *member != nested)
            .cloned()
            .collect();
        let clauses: BTreeSet<Arc<Formula>> = branches
            .iter()
            .map(|branch| {
                let mut clause = rest.clone();
                clause.insert(branch.clone());
                if over_and {
                    Arc::new(Formula::Or(clause))
                } else {
                    Arc::new(Formula::And(clause))
                }
            })
            .collect();
        Some(if over_and {
            Formula::And(clauses)
        } else {
            Formula::Or(clauses)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use num_bigint::BigInt;

    use super::*;
    use crate::logic::{Inequality, Rational, Variable};

    fn atom(s: &str) -> Formula {
        Formula::atom(s.parse::<Inequality>().unwrap())
    }

    /// Check logical equivalence by evaluating both formulas on a grid of
    /// sample assignments over their variables.
    fn assert_equivalent(left: &Formula, right: &Formula) {
        let mut variables: Vec<Variable> = left.variables().into_iter().collect();
        for v in right.variables() {
            if !variables.contains(&v) {
                variables.push(v);
            }
        }
        let samples: Vec<Rational> = [-1, 0, 1, 3, 5, 10]
            .into_iter()
            .map(|v| Rational::from_integer(BigInt::from(v)))
            .collect();

        fn grid(
            variables: &[Variable],
            samples: &[Rational],
            env: &mut BTreeMap<Variable, Rational>,
            left: &Formula,
            right: &Formula,
        ) {
            match variables.split_first() {
                None => assert_eq!(
                    left.evaluate(env),
                    right.evaluate(env),
                    "formulas differ under {:?}",
                    env
                ),
                Some((variable, rest)) => {
                    for sample in samples {
                        env.insert(*variable, sample.clone());
                        grid(rest, samples, env, left, right);
                    }
                }
            }
        }
        grid(&variables, &samples, &mut BTreeMap::new(), left, right);
    }

    fn no_and_under_or(formula: &Formula) -> bool {
        match formula {
            Formula::Atom(_) | Formula::Not(_) => true,
            Formula::And(arguments) => arguments.iter().all(|a| no_and_under_or(a)),
            Formula::Or(arguments) => arguments
                .iter()
                .all(|a| !matches!(a.as_ref(), Formula::And(_)) && no_and_under_or(a)),
        }
    }

    fn no_or_under_and(formula: &Formula) -> bool {
        match formula {
            Formula::Atom(_) | Formula::Not(_) => true,
            Formula::Or(arguments) => arguments.iter().all(|a| no_or_under_and(a)),
            Formula::And(arguments) => arguments
                .iter()
                .all(|a| !matches!(a.as_ref(), Formula::Or(_)) && no_or_under_and(a)),
        }
    }

    fn sample_formula() -> Formula {
        let a = atom("1*delta_0 <= 5");
        let b = atom("1*delta_0 + 1*relax_0 >= 3");
        let c = atom("1*relax_0 < 2");
        Formula::not(Formula::and([
            Formula::or([a, Formula::not(b)]),
            Formula::not(c),
        ]))
    }

    #[test]
    fn nnf_pushes_negations_to_atoms() {
        let formula = sample_formula();
        let nnf = Transformer::nnf().transform(&formula);
        fn negations_at_atoms(f: &Formula) -> bool {
            match f {
                Formula::Atom(_) => true,
                Formula::Not(inner) => matches!(inner.as_ref(), Formula::Atom(_)),
                Formula::And(args) | Formula::Or(args) => {
                    args.iter().all(|a| negations_at_atoms(a))
                }
            }
        }
        assert!(negations_at_atoms(&nnf));
        assert_equivalent(&formula, &nnf);
    }

    #[test]
    fn nnf_is_idempotent() {
        let nnf = Transformer::nnf().transform(&sample_formula());
        let again = Transformer::nnf().transform(&nnf);
        assert_eq!(nnf, again);
    }

    #[test]
    fn double_negation_and_constants() {
        let a = atom("1*delta_0 <= 5");
        let double = Formula::not(Formula::not(a.clone()));
        assert_eq!(Transformer::nnf().transform(&double), a);
        assert_eq!(
            Transformer::nnf().transform(&Formula::not(Formula::FALSE)),
            Formula::TRUE
        );
        assert_eq!(
            Transformer::nnf().transform(&Formula::not(Formula::TRUE)),
            Formula::FALSE
        );
    }

    #[test]
    fn de_morgan() {
        let a = atom("1*delta_0 <= 5");
        let b = atom("1*relax_0 >= 1");
        let formula = Formula::not(Formula::and([a.clone(), b.clone()]));
        let expected = Formula::or([Formula::not(a), Formula::not(b)]);
        assert_eq!(Transformer::nnf().transform(&formula), expected);
    }

    #[test]
    fn contradiction_and_tautology() {
        let a = atom("1*delta_0 <= 5");
        let contradiction = Formula::and([a.clone(), Formula::not(a.clone())]);
        assert_eq!(Transformer::nnf().transform(&contradiction), Formula::FALSE);
        let tautology = Formula::or([a.clone(), Formula::not(a)]);
        assert_eq!(Transformer::nnf().transform(&tautology), Formula::TRUE);
    }

    #[test]
    fn identity_constants_are_absorbed() {
        let a = atom("1*delta_0 <= 5");
        assert_eq!(
            Transformer::nnf().transform(&Formula::and([a.clone(), Formula::TRUE])),
            a
        );
        assert_eq!(
            Transformer::nnf().transform(&Formula::or([a.clone(), Formula::FALSE])),
            a
        );
        // an empty disjunction denotes falsity
        assert_eq!(Transformer::nnf().transform(&Formula::or([])), Formula::FALSE);
        assert_eq!(Transformer::nnf().transform(&Formula::and([])), Formula::TRUE);
    }

    #[test]
    fn sibling_clause_absorption() {
        let a = atom("1*delta_0 <= 5");
        let b = atom("1*relax_0 >= 1");
        let formula = Formula::and([a.clone(), Formula::or([a.clone(), b.clone()])]);
        assert_eq!(Transformer::nnf().transform(&formula), a);

        let dual = Formula::or([a.clone(), Formula::and([a.clone(), b])]);
        assert_eq!(Transformer::nnf().transform(&dual), a);
    }

    #[test]
    fn cnf_distributes_or_over_and() {
        let a = atom("1*delta_0 <= 5");
        let b = atom("1*relax_0 >= 1");
        let c = atom("1*relax_0 < 4");
        let formula = Formula::or([a.clone(), Formula::and([b.clone(), c.clone()])]);
        let cnf = Transformer::cnf().transform(&formula);
        let expected = Formula::and([
            Formula::or([a.clone(), b]),
            Formula::or([a, c]),
        ]);
        assert_eq!(cnf, expected);
    }

    #[test]
    fn cnf_shape_and_equivalence() {
        let formula = sample_formula();
        let cnf = Transformer::cnf().transform(&formula);
        assert!(no_and_under_or(&cnf));
        assert_equivalent(&formula, &cnf);
    }

    #[test]
    fn dnf_shape_and_equivalence() {
        let formula = sample_formula();
        let dnf = Transformer::dnf().transform(&formula);
        assert!(no_or_under_and(&dnf));
        assert_equivalent(&formula, &dnf);
    }

    #[test]
    fn dnf_distributes_and_over_or() {
        let a = atom("1*delta_0 <= 5");
        let b = atom("1*relax_0 >= 1");
        let c = atom("1*relax_0 < 4");
        let formula = Formula::and([a.clone(), Formula::or([b.clone(), c.clone()])]);
        let dnf = Transformer::dnf().transform(&formula);
        let expected = Formula::or([
            Formula::and([a.clone(), b]),
            Formula::and([a, c]),
        ]);
        assert_eq!(dnf, expected);
    }
}
