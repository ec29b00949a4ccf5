//! The substitution algebra: partial variable bindings ([`Mu`]) and the
//! multisets of bindings produced by pattern matching ([`Omega`]), together
//! with their joins.

use std::thread;

use indexmap::IndexMap;

use crate::term::Term;

/// A substitution: a mapping from variable name to the constant it was
/// bound to by matching one pattern against one ground atom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mu {
    bindings: IndexMap<String, Term>,
}

impl Mu {
    /// Creates an empty substitution.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `variable` to `term`, overwriting any previous binding.
    pub fn bind(&mut self, variable: String, term: Term) {
        self.bindings.insert(variable, term);
    }

    /// Looks up the binding for `variable`.
    #[must_use]
    pub fn get(&self, variable: &str) -> Option<&Term> {
        self.bindings.get(variable)
    }

    /// True iff no variable is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Number of bound variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Two substitutions are compatible iff they agree on every variable
    /// they share.
    #[must_use]
    pub fn compatible(&self, other: &Mu) -> bool {
        self.bindings.iter().all(|(var, term)| {
            other.bindings.get(var).is_none_or(|t| t == term)
        })
    }

    /// Negation-as-failure compatibility check of a positive binding
    /// (`self`) against one binding of a negated literal.
    ///
    /// True iff some variable of the negative binding is either absent
    /// from, or bound differently in, the positive binding. Absence is the
    /// conservative case: the row cannot be refuted, so it is kept.
    #[must_use]
    pub fn neg_compatible(&self, neg: &Mu) -> bool {
        neg.bindings
            .iter()
            .any(|(var, term)| self.bindings.get(var) != Some(term))
    }

    /// Merges two compatible substitutions; `self`'s binding wins on
    /// overlap. Overlap is only possible on equal bindings when the inputs
    /// are compatible, so the choice is deterministic.
    #[must_use]
    pub fn join(&self, other: &Mu) -> Mu {
        let mut merged = self.clone();
        for (var, term) in &other.bindings {
            if !merged.bindings.contains_key(var) {
                merged.bindings.insert(var.clone(), term.clone());
            }
        }
        merged
    }
}

/// A result set: the multiset of substitutions produced by matching a
/// pattern against a relation. Semantically unordered; duplicates are only
/// suppressed when a ground atom is asserted into a relation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Omega {
    mus: Vec<Mu>,
}

impl Omega {
    /// Creates an empty result set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The multiplicative unit: a result set holding one empty
    /// substitution. Joining against it is the identity, which makes it the
    /// right seed for folding a rule body.
    #[must_use]
    pub fn unit() -> Self {
        Omega { mus: vec![Mu::new()] }
    }

    /// Appends a substitution.
    pub fn push(&mut self, mu: Mu) {
        self.mus.push(mu);
    }

    /// True iff the result set holds no substitution.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mus.is_empty()
    }

    /// Number of substitutions, counting duplicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mus.len()
    }

    /// Iterates over the substitutions.
    pub fn iter(&self) -> std::slice::Iter<'_, Mu> {
        self.mus.iter()
    }

    /// Joins two result sets: the cartesian product restricted to
    /// compatible pairs, each pair merged via [`Mu::join`].
    #[must_use]
    pub fn join(&self, other: &Omega) -> Omega {
        let mut joined = Omega::new();
        for mu1 in &self.mus {
            for mu2 in &other.mus {
                if mu1.compatible(mu2) {
                    joined.push(mu1.join(mu2));
                }
            }
        }
        joined
    }

    /// Joins a positive result set against the result set of a negated
    /// literal: a positive row survives only if it is neg-compatible with
    /// every negative row.
    #[must_use]
    pub fn join_neg(&self, neg: &Omega) -> Omega {
        let mut kept = Omega::new();
        for mu1 in &self.mus {
            if neg.mus.iter().all(|mu2| mu1.neg_compatible(mu2)) {
                kept.push(mu1.clone());
            }
        }
        kept
    }

    /// Data-parallel variant of [`Omega::join`].
    ///
    /// Each left-hand chunk joins against the full right-hand side in its
    /// own task with its own output buffer; the buffers are concatenated
    /// afterwards. Result sets are unordered multisets, so the merge order
    /// does not matter. This is an optimization only and is never required
    /// for correctness.
    #[must_use]
    pub fn join_par(&self, other: &Omega) -> Omega {
        let workers = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        if workers < 2 || self.mus.len() < 2 {
            return self.join(other);
        }

        let chunk_size = self.mus.len().div_ceil(workers);
        let mut joined = Omega::new();
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .mus
                .chunks(chunk_size)
                .map(|left| {
                    scope.spawn(move || {
                        let mut part = Vec::new();
                        for mu1 in left {
                            for mu2 in &other.mus {
                                if mu1.compatible(mu2) {
                                    part.push(mu1.join(mu2));
                                }
                            }
                        }
                        part
                    })
                })
                .collect();
            for handle in handles {
                let part = handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload));
                joined.mus.extend(part);
            }
        });
        joined
    }
}

impl FromIterator<Mu> for Omega {
    fn from_iter<I: IntoIterator<Item = Mu>>(iter: I) -> Self {
        Omega {
            mus: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Omega {
    type Item = &'a Mu;
    type IntoIter = std::slice::Iter<'a, Mu>;

    fn into_iter(self) -> Self::IntoIter {
        self.mus.iter()
    }
}
