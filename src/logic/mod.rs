//! Linear real arithmetic: variables, sums, inequalities, formulas and
//! the DNF container exchanged between the elimination and optimization
//! layers.

pub mod elimination;
pub mod interval;
pub mod normalform;
pub mod quantifier;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::{One, Pow, Signed, Zero};

use crate::Error;

/// Exact rational number used for all coefficients and bounds.
pub type Rational = num_rational::BigRational;

/// Parse a rational from its textual forms `a`, `a/b` or a decimal `a.b`.
pub fn parse_rational(input: &str) -> Result<Rational, Error> {
    let err = || Error::parse("rational", input);
    let trimmed = input.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let integer = |s: &str| s.parse::<BigInt>().map_err(|_| err());
    let magnitude = if let Some((numer, denom)) = body.split_once('/') {
        let denom = integer(denom.trim())?;
        if denom.is_zero() {
            return Err(err());
        }
        Rational::new(integer(numer.trim())?, denom)
    } else if let Some((whole, frac)) = body.split_once('.') {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let scale = BigInt::from(10u32).pow(frac.len() as u32);
        let numer = integer(whole)? * &scale + integer(frac)?;
        Rational::new(numer, scale)
    } else {
        Rational::from_integer(integer(body)?)
    };
    Ok(if negative { -magnitude } else { magnitude })
}

/// A variable of the relaxation problem, identified by its string form
/// `delta_<j>` or `relax_<i>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Variable {
    /// The delay elapsed at trace depth `j`.
    Delta(usize),
    /// The `i`-th designated relaxation.
    Relaxation(usize),
}

impl Variable {
    /// The unique string identifier of this variable.
    pub fn identifier(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delta(depth) => write!(f, "delta_{}", depth),
            Self::Relaxation(idx) => write!(f, "relax_{}", idx),
        }
    }
}

impl FromStr for Variable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_index = |digits: &str| {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                digits.parse::<usize>().ok()
            } else {
                None
            }
        };
        if let Some(digits) = s.strip_prefix("delta_") {
            if let Some(depth) = parse_index(digits) {
                return Ok(Self::Delta(depth));
            }
        }
        if let Some(digits) = s.strip_prefix("relax_") {
            if let Some(idx) = parse_index(digits) {
                return Ok(Self::Relaxation(idx));
            }
        }
        Err(Error::parse("variable", s))
    }
}

/// A coefficient-variable pair of a [`Sum`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Summand {
    pub coefficient: Rational,
    pub variable: Variable,
}

impl Summand {
    pub fn new(coefficient: Rational, variable: Variable) -> Self {
        Self {
            coefficient,
            variable,
        }
    }
}

/// A linear term over [`Variable`]s with rational coefficients.
///
/// Sums are kept canonical: summands are combined per variable, zero
/// coefficients are dropped and the remainder is ordered by variable.
/// Two sums denoting the same multiset of summands therefore compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sum {
    summands: Vec<Summand>,
}

impl Sum {
    pub fn new(summands: impl IntoIterator<Item = Summand>) -> Self {
        let mut combined: BTreeMap<Variable, Rational> = BTreeMap::new();
        for summand in summands {
            *combined
                .entry(summand.variable)
                .or_insert_with(Rational::zero) += summand.coefficient;
        }
        Self {
            summands: combined
                .into_iter()
                .filter(|(_, coefficient)| !coefficient.is_zero())
                .map(|(variable, coefficient)| Summand::new(coefficient, variable))
                .collect(),
        }
    }

    /// The empty sum, printed as `0`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The sum consisting of the given variable with coefficient one.
    pub fn variable(variable: Variable) -> Self {
        Self {
            summands: vec![Summand::new(Rational::one(), variable)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summands.is_empty()
    }

    pub fn summands(&self) -> &[Summand] {
        &self.summands
    }

    pub fn variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.summands.iter().map(|summand| summand.variable)
    }

    pub fn coefficient_of(&self, variable: Variable) -> Option<&Rational> {
        self.summands
            .iter()
            .find(|summand| summand.variable == variable)
            .map(|summand| &summand.coefficient)
    }

    /// Whether every coefficient of this sum is exactly one.
    pub(crate) fn is_unit(&self) -> bool {
        self.summands
            .iter()
            .all(|summand| summand.coefficient.is_one())
    }

    pub fn add(&self, other: &Sum) -> Sum {
        Sum::new(
            self.summands
                .iter()
                .chain(other.summands.iter())
                .cloned(),
        )
    }

    pub fn subtract(&self, other: &Sum) -> Sum {
        self.add(&other.scale(&-Rational::one()))
    }

    pub fn scale(&self, factor: &Rational) -> Sum {
        Sum::new(
            self.summands
                .iter()
                .map(|summand| Summand::new(&summand.coefficient * factor, summand.variable)),
        )
    }

    /// The sum with all occurrences of the given variable removed.
    pub fn without(&self, variable: Variable) -> Sum {
        Sum {
            summands: self
                .summands
                .iter()
                .filter(|summand| summand.variable != variable)
                .cloned()
                .collect(),
        }
    }

    #[cfg(test)]
    pub(crate) fn value(&self, env: &BTreeMap<Variable, Rational>) -> Rational {
        self.summands
            .iter()
            .map(|summand| {
                &summand.coefficient
                    * env
                        .get(&summand.variable)
                        .cloned()
                        .unwrap_or_else(Rational::zero)
            })
            .sum()
    }
}

impl fmt::Display for Sum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "0");
        }
        for (i, summand) in self.summands.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{}*{}", summand.coefficient, summand.variable)?;
        }
        Ok(())
    }
}

impl FromStr for Sum {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut summands = Vec::new();
        for part in s.split('+') {
            let part = part.trim();
            if part == "0" || part.is_empty() {
                continue;
            }
            let (coefficient, variable) = part
                .split_once('*')
                .ok_or_else(|| Error::parse("sum", s))?;
            summands.push(Summand::new(
                parse_rational(coefficient)?,
                variable.trim().parse()?,
            ));
        }
        Ok(Sum::new(summands))
    }
}

/// Comparison symbol of an [`Inequality`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InequalitySymbol {
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
}

impl InequalitySymbol {
    /// Turns the symbol around, as when both sides of an inequality are
    /// exchanged: `<` ↔ `>` and `<=` ↔ `>=`.
    pub fn turned(self) -> Self {
        match self {
            Self::GreaterThan => Self::LessThan,
            Self::LessThan => Self::GreaterThan,
            Self::GreaterEqual => Self::LessEqual,
            Self::LessEqual => Self::GreaterEqual,
        }
    }

    /// The complement symbol, for negating an inequality:
    /// `¬(s < b)` is `s >= b`.
    pub fn negated(self) -> Self {
        match self {
            Self::GreaterThan => Self::LessEqual,
            Self::LessThan => Self::GreaterEqual,
            Self::GreaterEqual => Self::LessThan,
            Self::LessEqual => Self::GreaterThan,
        }
    }

    pub fn is_strict(self) -> bool {
        matches!(self, Self::GreaterThan | Self::LessThan)
    }

    /// Whether the symbol bounds the left-hand side from below.
    pub(crate) fn is_lower(self) -> bool {
        matches!(self, Self::GreaterThan | Self::GreaterEqual)
    }
}

impl fmt::Display for InequalitySymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterEqual => ">=",
            Self::LessEqual => "<=",
        };
        write!(f, "{}", symbol)
    }
}

impl FromStr for InequalitySymbol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(Self::GreaterThan),
            "<" => Ok(Self::LessThan),
            ">=" => Ok(Self::GreaterEqual),
            "<=" => Ok(Self::LessEqual),
            _ => Err(Error::parse("inequality symbol", s)),
        }
    }
}

/// A linear inequality `sum ~ constant` with `~` in `{<, <=, >, >=}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Inequality {
    pub left: Sum,
    pub symbol: InequalitySymbol,
    pub right: Rational,
}

impl Inequality {
    pub fn new(left: Sum, symbol: InequalitySymbol, right: Rational) -> Self {
        Self {
            left,
            symbol,
            right,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.symbol.is_strict()
    }

    /// The negation as a positive inequality with the complement symbol.
    pub fn negated(&self) -> Inequality {
        Inequality::new(self.left.clone(), self.symbol.negated(), self.right.clone())
    }

    /// For an inequality with an empty left-hand sum, its constant truth
    /// value; `None` if any variable remains.
    pub fn constant_truth(&self) -> Option<bool> {
        if !self.left.is_empty() {
            return None;
        }
        let zero = Rational::zero();
        Some(match self.symbol {
            InequalitySymbol::GreaterThan => zero > self.right,
            InequalitySymbol::LessThan => zero < self.right,
            InequalitySymbol::GreaterEqual => zero >= self.right,
            InequalitySymbol::LessEqual => zero <= self.right,
        })
    }

    #[cfg(test)]
    pub(crate) fn holds(&self, env: &BTreeMap<Variable, Rational>) -> bool {
        let value = self.left.value(env);
        match self.symbol {
            InequalitySymbol::GreaterThan => value > self.right,
            InequalitySymbol::LessThan => value < self.right,
            InequalitySymbol::GreaterEqual => value >= self.right,
            InequalitySymbol::LessEqual => value <= self.right,
        }
    }
}

impl fmt::Display for Inequality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.symbol, self.right)
    }
}

impl FromStr for Inequality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() < 2 {
            return Err(Error::parse("inequality", s));
        }
        let right = parse_rational(parts[parts.len() - 1])?;
        let symbol: InequalitySymbol = parts[parts.len() - 2].parse()?;
        let left: Sum = parts[..parts.len() - 2].join(" ").parse()?;
        Ok(Inequality::new(left, symbol, right))
    }
}

/// An atomic formula: a boolean constant or a linear inequality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Atom {
    Constant(bool),
    Inequality(Inequality),
}

/// A formula of linear real arithmetic.
///
/// `And` and `Or` hold their arguments as sets, making them commutative
/// and idempotent by construction. Nodes are immutable and shared.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Formula {
    Atom(Atom),
    Not(Arc<Formula>),
    And(BTreeSet<Arc<Formula>>),
    Or(BTreeSet<Arc<Formula>>),
}

impl Formula {
    pub const TRUE: Self = Formula::Atom(Atom::Constant(true));
    pub const FALSE: Self = Formula::Atom(Atom::Constant(false));

    pub fn atom(inequality: Inequality) -> Self {
        Formula::Atom(Atom::Inequality(inequality))
    }

    pub fn not(formula: Formula) -> Self {
        Formula::Not(Arc::new(formula))
    }

    pub fn and(arguments: impl IntoIterator<Item = Formula>) -> Self {
        Formula::And(arguments.into_iter().map(Arc::new).collect())
    }

    pub fn or(arguments: impl IntoIterator<Item = Formula>) -> Self {
        Formula::Or(arguments.into_iter().map(Arc::new).collect())
    }

    /// The implication `premise => conclusion`, expressed with the closed
    /// connective set as `¬premise ∨ conclusion`.
    pub fn implies(premise: Formula, conclusion: Formula) -> Self {
        Formula::or([Formula::not(premise), conclusion])
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Formula::Atom(Atom::Constant(true)))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Formula::Atom(Atom::Constant(false)))
    }

    /// All variables occurring in the formula.
    pub fn variables(&self) -> BTreeSet<Variable> {
        let mut variables = BTreeSet::new();
        self.collect_variables(&mut variables);
        variables
    }

    fn collect_variables(&self, variables: &mut BTreeSet<Variable>) {
        match self {
            Formula::Atom(Atom::Constant(_)) => {}
            Formula::Atom(Atom::Inequality(inequality)) => {
                variables.extend(inequality.left.variables());
            }
            Formula::Not(argument) => argument.collect_variables(variables),
            Formula::And(arguments) | Formula::Or(arguments) => {
                for argument in arguments {
                    argument.collect_variables(variables);
                }
            }
        }
    }

    /// Render the formula as an SMT-LIB term.
    pub fn to_smtlib(&self) -> String {
        match self {
            Formula::Atom(Atom::Constant(true)) => "true".to_owned(),
            Formula::Atom(Atom::Constant(false)) => "false".to_owned(),
            Formula::Atom(Atom::Inequality(inequality)) => inequality_to_smtlib(inequality),
            Formula::Not(argument) => format!("(not {})", argument.to_smtlib()),
            Formula::And(arguments) => nary_to_smtlib("and", arguments),
            Formula::Or(arguments) => nary_to_smtlib("or", arguments),
        }
    }

    #[cfg(test)]
    pub(crate) fn evaluate(&self, env: &BTreeMap<Variable, Rational>) -> bool {
        match self {
            Formula::Atom(Atom::Constant(value)) => *value,
            Formula::Atom(Atom::Inequality(inequality)) => inequality.holds(env),
            Formula::Not(argument) => !argument.evaluate(env),
            Formula::And(arguments) => arguments.iter().all(|argument| argument.evaluate(env)),
            Formula::Or(arguments) => arguments.iter().any(|argument| argument.evaluate(env)),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Atom(Atom::Constant(true)) => write!(f, "TRUE"),
            Formula::Atom(Atom::Constant(false)) => write!(f, "FALSE"),
            Formula::Atom(Atom::Inequality(inequality)) => write!(f, "{}", inequality),
            Formula::Not(argument) => write!(f, "NOT({})", argument),
            Formula::And(arguments) => write_connective(f, "AND", arguments),
            Formula::Or(arguments) => write_connective(f, "OR", arguments),
        }
    }
}

fn write_connective(
    f: &mut fmt::Formatter<'_>,
    connective: &str,
    arguments: &BTreeSet<Arc<Formula>>,
) -> fmt::Result {
    for (i, argument) in arguments.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", connective)?;
        }
        write!(f, "({})", argument)?;
    }
    Ok(())
}

fn nary_to_smtlib(op: &str, arguments: &BTreeSet<Arc<Formula>>) -> String {
    let mut out = format!("({}", op);
    for argument in arguments {
        out.push(' ');
        out.push_str(&argument.to_smtlib());
    }
    out.push(')');
    out
}

pub(crate) fn rational_to_smtlib(value: &Rational) -> String {
    let magnitude = if value.denom().is_one() {
        value.numer().abs().to_string()
    } else {
        format!("(/ {} {})", value.numer().abs(), value.denom())
    };
    if value.is_negative() {
        format!("(- {})", magnitude)
    } else {
        magnitude
    }
}

fn sum_to_smtlib(sum: &Sum) -> String {
    let render = |summand: &Summand| {
        format!(
            "(* {} {})",
            rational_to_smtlib(&summand.coefficient),
            summand.variable
        )
    };
    match sum.summands() {
        [] => "0".to_owned(),
        [single] => render(single),
        summands => {
            let mut out = "(+".to_owned();
            for summand in summands {
                out.push(' ');
                out.push_str(&render(summand));
            }
            out.push(')');
            out
        }
    }
}

fn inequality_to_smtlib(inequality: &Inequality) -> String {
    format!(
        "({} {} {})",
        inequality.symbol,
        sum_to_smtlib(&inequality.left),
        rational_to_smtlib(&inequality.right)
    )
}

/// A disjunction of conjunctions of inequalities, as handed to the
/// polyhedron optimizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DNFFormula {
    pub terms: Vec<BTreeSet<Inequality>>,
}

impl DNFFormula {
    pub fn new(terms: Vec<BTreeSet<Inequality>>) -> Self {
        Self { terms }
    }

    /// Materialize a formula in disjunctive normal form.
    ///
    /// Negated inequality literals are folded into positive inequalities
    /// with the complement symbol. A true formula yields a single empty
    /// term, a false formula no terms.
    ///
    /// # Panics
    ///
    /// Panics if the formula is not in disjunctive normal form.
    pub fn from_formula(formula: &Formula) -> Self {
        let mut terms = Vec::new();
        match formula {
            Formula::Or(arguments) => {
                for argument in arguments {
                    if let Some(term) = Self::term_from(argument) {
                        terms.push(term);
                    }
                }
            }
            other => {
                if let Some(term) = Self::term_from(other) {
                    terms.push(term);
                }
            }
        }
        Self { terms }
    }

    fn term_from(formula: &Formula) -> Option<BTreeSet<Inequality>> {
        let mut term = BTreeSet::new();
        match formula {
            Formula::And(arguments) => {
                for argument in arguments {
                    if !Self::add_literal(&mut term, argument) {
                        return None;
                    }
                }
            }
            other => {
                if !Self::add_literal(&mut term, other) {
                    return None;
                }
            }
        }
        Some(term)
    }

    /// Add a literal to a term; returns `false` if the literal is
    /// constant false, invalidating the whole term.
    fn add_literal(term: &mut BTreeSet<Inequality>, literal: &Formula) -> bool {
        match literal {
            Formula::Atom(Atom::Constant(value)) => *value,
            Formula::Atom(Atom::Inequality(inequality)) => {
                term.insert(inequality.clone());
                true
            }
            Formula::Not(argument) => match argument.as_ref() {
                Formula::Atom(Atom::Inequality(inequality)) => {
                    term.insert(inequality.negated());
                    true
                }
                Formula::Atom(Atom::Constant(value)) => !*value,
                _ => unreachable!("negation of a non-atom in a DNF term"),
            },
            _ => unreachable!("nested connective in a DNF term"),
        }
    }
}

impl fmt::Display for DNFFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, "\nOR\n")?;
            }
            for (j, inequality) in term.iter().enumerate() {
                if j > 0 {
                    writeln!(f)?;
                }
                write!(f, "\t{}", inequality)?;
            }
        }
        Ok(())
    }
}

impl FromStr for DNFFormula {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut terms = Vec::new();
        for term_str in s.split("OR") {
            let mut term = BTreeSet::new();
            for line in term_str.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                term.insert(line.parse::<Inequality>()?);
            }
            terms.push(term);
        }
        Ok(Self { terms })
    }
}
