use crate::store::RelationClass;
use crate::term::Atom;
use thiserror::Error;

/// Errors raised by the engine.
///
/// All of these are contract violations detected synchronously at the call
/// that introduces them; none are transient, so there is no retry story.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A term string did not start with `:` (constant) or `?` (variable).
    #[error("malformed term `{0}`: terms must start with ':' (constant) or '?' (variable)")]
    MalformedTerm(String),

    /// A ground atom was required but the atom still contains variables.
    #[error("atom `{0}` is not ground")]
    NotGround(Atom),

    /// A predicate was registered under one relation class and then
    /// requested under the other.
    #[error("relation `{predicate}` is already registered as an {registered_as} relation")]
    RelationClassConflict {
        /// The conflicting predicate name.
        predicate: String,
        /// The class the predicate is already registered under.
        registered_as: RelationClass,
    },

    /// A rule head predicate collides with an existing EDB relation.
    #[error("rule head relation `{0}` is already registered as an EDB relation")]
    HeadAlreadyEdb(String),

    /// A pattern with a variable in predicate position. Relation lookup is
    /// predicate-indexed, so these are rejected rather than supported.
    #[error("unsupported pattern `{0}`: the predicate position must be a constant")]
    UnsupportedPattern(Atom),

    /// A variable had no binding where one was required, e.g. a head
    /// variable that does not occur in any positive body literal.
    #[error("variable `{variable}` in `{atom}` has no binding")]
    UnboundVariable {
        /// The unbound variable name.
        variable: String,
        /// The atom the variable occurs in.
        atom: Atom,
    },
}
