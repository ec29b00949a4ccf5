//! The triple-based fact model: terms, atoms and the pattern matching
//! primitive everything else is built on.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::EngineError;
use crate::subst::Mu;

/// A term of an atom: either a ground symbol or a named placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Term {
    /// An opaque ground symbol (e.g. `:alice`).
    Constant(String),
    /// A named placeholder (e.g. `?x`).
    Variable(String),
}

impl Term {
    /// Parses a term from its textual form: a leading `:` denotes a
    /// constant, a leading `?` a variable.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedTerm`] for any other leading
    /// character (including the empty string).
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s.chars().next() {
            Some(':') => Ok(Term::Constant(s.to_string())),
            Some('?') => Ok(Term::Variable(s.to_string())),
            _ => Err(EngineError::MalformedTerm(s.to_string())),
        }
    }

    /// Returns true for [`Term::Constant`].
    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(self, Term::Constant(_))
    }

    /// Returns true for [`Term::Variable`].
    #[must_use]
    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    /// The variable name, if this term is a variable.
    #[must_use]
    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Term::Variable(v) => Some(v),
            Term::Constant(_) => None,
        }
    }

    /// The constant name, if this term is a constant.
    #[must_use]
    pub fn as_constant(&self) -> Option<&str> {
        match self {
            Term::Constant(c) => Some(c),
            Term::Variable(_) => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Constant(c) => write!(f, "{c}"),
            Term::Variable(v) => write!(f, "{v}"),
        }
    }
}

/// A (subject, predicate, object) triple of terms, optionally negated.
///
/// An atom doubles as a fact (when ground) and as a pattern (when it
/// contains variables). The predicate position must always be a constant;
/// relation lookup is predicate-indexed and variable predicates are
/// rejected with [`EngineError::UnsupportedPattern`].
///
/// Equality and hashing are triple equality: the negation flag marks how a
/// literal occurs in a rule body and never distinguishes stored facts.
#[derive(Debug, Clone, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Atom {
    /// Subject position.
    pub subject: Term,
    /// Predicate position. Must be a constant.
    pub predicate: Term,
    /// Object position.
    pub object: Term,
    /// Whether this literal occurs negated in a rule body.
    pub negated: bool,
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject
            && self.predicate == other.predicate
            && self.object == other.object
    }
}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subject.hash(state);
        self.predicate.hash(state);
        self.object.hash(state);
    }
}

impl Atom {
    /// Builds an atom from three term strings using the sigil convention
    /// (`:` constant, `?` variable).
    ///
    /// # Errors
    ///
    /// [`EngineError::MalformedTerm`] for a bad sigil,
    /// [`EngineError::UnsupportedPattern`] for a variable in predicate
    /// position.
    pub fn new(subject: &str, predicate: &str, object: &str) -> Result<Self, EngineError> {
        let atom = Atom {
            subject: Term::parse(subject)?,
            predicate: Term::parse(predicate)?,
            object: Term::parse(object)?,
            negated: false,
        };
        if atom.predicate.is_variable() {
            return Err(EngineError::UnsupportedPattern(atom));
        }
        Ok(atom)
    }

    /// Like [`Atom::new`], but marks the literal as negated.
    ///
    /// # Errors
    ///
    /// Same as [`Atom::new`].
    pub fn new_negated(subject: &str, predicate: &str, object: &str) -> Result<Self, EngineError> {
        let mut atom = Atom::new(subject, predicate, object)?;
        atom.negated = true;
        Ok(atom)
    }

    /// True iff all three positions are constants.
    #[must_use]
    pub fn is_ground(&self) -> bool {
        self.subject.is_constant() && self.predicate.is_constant() && self.object.is_constant()
    }

    /// The predicate name, if the predicate position is a constant.
    #[must_use]
    pub fn predicate_name(&self) -> Option<&str> {
        self.predicate.as_constant()
    }

    /// Tests whether this pattern matches a ground atom.
    ///
    /// Every constant position of the pattern must equal the corresponding
    /// position of the atom; variable positions match anything. A variable
    /// reused across pattern positions additionally requires the matched
    /// positions to hold equal terms, otherwise a self-join like
    /// `same(?x, ?x)` would produce unsound bindings.
    #[must_use]
    pub fn matches(&self, atom: &Atom) -> bool {
        let positions = [
            (&self.subject, &atom.subject),
            (&self.predicate, &atom.predicate),
            (&self.object, &atom.object),
        ];

        for (pattern, ground) in positions {
            if pattern.is_constant() && pattern != ground {
                return false;
            }
        }

        // Self-join consistency for repeated variables.
        for (i, (p1, g1)) in positions.iter().enumerate() {
            for (p2, g2) in positions.iter().skip(i + 1) {
                if p1.is_variable() && p1 == p2 && g1 != g2 {
                    return false;
                }
            }
        }

        true
    }

    /// Derives the substitution binding every pattern variable to the
    /// corresponding position of `atom`. The caller is expected to have
    /// checked [`Atom::matches`] first. A ground pattern yields the empty
    /// substitution, which is what makes fact-shaped rules evaluable.
    #[must_use]
    pub fn to_mu(&self, atom: &Atom) -> Mu {
        let mut mu = Mu::new();
        for (pattern, ground) in [
            (&self.subject, &atom.subject),
            (&self.predicate, &atom.predicate),
            (&self.object, &atom.object),
        ] {
            if let Term::Variable(v) = pattern {
                mu.bind(v.clone(), ground.clone());
            }
        }
        mu
    }

    /// Applies a substitution to this atom, producing a ground atom.
    /// Applying to an already-ground atom returns it unchanged.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnboundVariable`] if a variable of the atom has no
    /// binding in `mu`.
    pub fn apply(&self, mu: &Mu) -> Result<Atom, EngineError> {
        let resolve = |term: &Term| -> Result<Term, EngineError> {
            match term {
                Term::Constant(_) => Ok(term.clone()),
                Term::Variable(v) => {
                    mu.get(v)
                        .cloned()
                        .ok_or_else(|| EngineError::UnboundVariable {
                            variable: v.clone(),
                            atom: self.clone(),
                        })
                }
            }
        };
        Ok(Atom {
            subject: resolve(&self.subject)?,
            predicate: resolve(&self.predicate)?,
            object: resolve(&self.object)?,
            negated: false,
        })
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "not ")?;
        }
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}
