//! The rule model and the rule-to-delta-rule compiler.
//!
//! A delta rule isolates one non-negated body literal to be matched only
//! against a designated incremental fact set, which is what lets the
//! semi-naive evaluator guarantee that every derivation of a round consumes
//! at least one newly produced fact.

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::error::EngineError;
use crate::store::Database;
use crate::subst::Omega;
use crate::term::{Atom, Term};

/// Body literals; rules are nearly always one to three literals long.
pub type Body = SmallVec<[Atom; 3]>;

/// A Horn clause (or semi-positive clause when body literals are negated):
/// one head atom and an ordered body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rule {
    /// The derived atom.
    pub head: Atom,
    /// The conditions, joined in body order.
    pub body: Body,
}

impl Rule {
    /// Builds a rule from a head and body literals.
    pub fn new(head: Atom, body: impl IntoIterator<Item = Atom>) -> Self {
        Rule {
            head,
            body: body.into_iter().collect(),
        }
    }

    /// Registers this rule's predicates with `db`: the head as IDB, any
    /// body predicate not yet known as EDB. Also validates that every head
    /// variable occurs in a non-negated body literal, since nothing else
    /// could ever bind it.
    ///
    /// # Errors
    ///
    /// [`EngineError::HeadAlreadyEdb`] if the head predicate is registered
    /// as EDB, [`EngineError::UnsupportedPattern`] for a variable predicate
    /// anywhere in the rule, [`EngineError::UnboundVariable`] for a head
    /// variable with no positive occurrence in the body.
    pub fn register(&self, db: &mut Database) -> Result<(), EngineError> {
        let Some(head_predicate) = self.head.predicate_name() else {
            return Err(EngineError::UnsupportedPattern(self.head.clone()));
        };
        if db.is_edb_relation(head_predicate) {
            return Err(EngineError::HeadAlreadyEdb(head_predicate.to_string()));
        }

        let positive_vars: IndexSet<&str> = self
            .body
            .iter()
            .filter(|a| !a.negated)
            .flat_map(|a| [&a.subject, &a.predicate, &a.object])
            .filter_map(Term::as_variable)
            .collect();
        for term in [&self.head.subject, &self.head.object] {
            if let Some(var) = term.as_variable() {
                if !positive_vars.contains(var) {
                    return Err(EngineError::UnboundVariable {
                        variable: var.to_string(),
                        atom: self.head.clone(),
                    });
                }
            }
        }

        db.register_idb_rel(head_predicate)?;
        for atom in &self.body {
            let Some(predicate) = atom.predicate_name() else {
                return Err(EngineError::UnsupportedPattern(atom.clone()));
            };
            if !db.is_edb_relation(predicate) && !db.is_idb_relation(predicate) {
                db.register_edb_rel(predicate)?;
            }
        }
        Ok(())
    }

    /// Compiles this rule into one delta rule per eligible body literal.
    ///
    /// Eligible means non-negated with a constant predicate and, when
    /// `idb_only` is set, registered as IDB in `db`. The semi-naive
    /// evaluator passes `idb_only = true` (only IDB dependencies can grow
    /// mid-fixpoint); DRed and batch append pass `false` because changes
    /// can originate from EDB predicates too.
    #[must_use]
    pub fn to_delta_rules(&self, db: &Database, idb_only: bool) -> Vec<DeltaRule> {
        let mut delta_rules = Vec::with_capacity(self.body.len());
        for (i, literal) in self.body.iter().enumerate() {
            let eligible = !literal.negated
                && literal
                    .predicate_name()
                    .is_some_and(|p| !idb_only || db.is_idb_relation(p));
            if eligible {
                let rest: Body = self
                    .body
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, a)| a.clone())
                    .collect();
                delta_rules.push(DeltaRule {
                    head: self.head.clone(),
                    delta: literal.clone(),
                    body: rest,
                });
            }
        }
        delta_rules
    }

    /// Evaluates the full rule body against `db` and returns the result
    /// set of substitutions. Non-negated literals are joined in body order;
    /// negated literals are applied afterwards via negation-as-failure,
    /// once the positive part has grounded their variables.
    ///
    /// # Errors
    ///
    /// Propagates pattern lookup failures.
    pub fn eval(&self, db: &Database) -> Result<Omega, EngineError> {
        eval_body(Omega::unit(), &self.body, db)
    }
}

/// A rule with one body literal designated as the incremental-matching
/// literal.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaRule {
    /// The derived atom.
    pub head: Atom,
    /// The literal matched only against the incremental fact set.
    pub delta: Atom,
    /// The remaining body literals, matched against the stable store.
    pub body: Body,
}

impl DeltaRule {
    /// Evaluates this delta rule: the delta literal against `delta` only,
    /// every other body literal against `db`.
    ///
    /// # Errors
    ///
    /// Propagates pattern lookup failures.
    pub fn eval(&self, db: &Database, delta: &Database) -> Result<Omega, EngineError> {
        eval_body(delta.find_mappings_for(&self.delta)?, &self.body, db)
    }
}

fn eval_body(seed: Omega, body: &[Atom], db: &Database) -> Result<Omega, EngineError> {
    let mut result = seed;
    for literal in body.iter().filter(|a| !a.negated) {
        if result.is_empty() {
            return Ok(result);
        }
        result = result.join(&db.find_mappings_for(literal)?);
    }
    for literal in body.iter().filter(|a| a.negated) {
        if result.is_empty() {
            return Ok(result);
        }
        result = result.join_neg(&db.find_mappings_for(literal)?);
    }
    Ok(result)
}

/// An ordered collection of rules.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Program(pub Vec<Rule>);

impl Program {
    /// Builds a program from rules, keeping their order.
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        Program(rules.into_iter().collect())
    }

    /// Iterates over the rules in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.0.iter()
    }

    /// Registers every rule with `db`, establishing the EDB/IDB predicate
    /// partition.
    ///
    /// # Errors
    ///
    /// See [`Rule::register`].
    pub fn register(&self, db: &mut Database) -> Result<(), EngineError> {
        for rule in &self.0 {
            rule.register(db)?;
        }
        Ok(())
    }

    /// Compiles the program into delta rules. Rules that yield no delta
    /// rule (no eligible body literal) are kept verbatim and evaluated in
    /// full each round; their output is already known after the first
    /// round and filtered out.
    #[must_use]
    pub fn to_delta_program(&self, db: &Database, idb_only: bool) -> DeltaProgram {
        let mut dprog = DeltaProgram::default();
        for rule in &self.0 {
            let delta_rules = rule.to_delta_rules(db, idb_only);
            if delta_rules.is_empty() {
                dprog.rules.push(rule.clone());
            } else {
                dprog.delta_rules.extend(delta_rules);
            }
        }
        dprog
    }
}

impl FromIterator<Rule> for Program {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Program::new(iter)
    }
}

/// The compiled form of a program: rules with no eligible delta literal
/// plus the generated delta rules.
#[derive(Debug, Clone, Default)]
pub struct DeltaProgram {
    /// Rules evaluated in full each round.
    pub rules: Vec<Rule>,
    /// Rules evaluated incrementally against the current delta.
    pub delta_rules: Vec<DeltaRule>,
}
