//! # Dredlog
//!
//! A triple-pattern Datalog engine with three interchangeable strategies
//! for keeping the derived dataset consistent after the extensional facts
//! change: full recomputation, delete-and-rederive (DRed) incremental
//! maintenance, and snapshot-based commit/revert. All three produce
//! content-identical stores.
//!
//! ## Example
//!
//! ```rust
//! use dredlog::{Atom, Database, Program, Rule};
//!
//! let mut db = Database::new();
//! db.add_atom(Atom::new(":a", ":link", ":b")?)?;
//! db.add_atom(Atom::new(":b", ":link", ":c")?)?;
//!
//! let prog = Program::new([
//!     Rule::new(
//!         Atom::new("?x", ":reachable", "?y")?,
//!         [Atom::new("?x", ":link", "?y")?],
//!     ),
//!     Rule::new(
//!         Atom::new("?x", ":reachable", "?y")?,
//!         [
//!             Atom::new("?x", ":link", "?z")?,
//!             Atom::new("?z", ":reachable", "?y")?,
//!         ],
//!     ),
//! ]);
//! prog.register(&mut db)?;
//! prog.eval_seminaive(&mut db)?;
//!
//! assert!(db.knows(&Atom::new(":a", ":reachable", ":c")?));
//! # Ok::<(), dredlog::EngineError>(())
//! ```

/// Delete-and-rederive incremental maintenance.
pub mod dred;
/// The error taxonomy.
pub mod error;
/// Naive and semi-naive fixpoint evaluation.
pub mod eval;
/// Rules, programs and the delta-rule compiler.
pub mod rule;
/// The EDB/IDB relation store.
pub mod store;
/// Substitutions and result sets.
pub mod subst;
/// Terms and atoms.
pub mod term;

pub use dred::dred;
pub use error::EngineError;
pub use rule::{DeltaProgram, DeltaRule, Program, Rule};
pub use store::{Database, RelationClass};
pub use subst::{Mu, Omega};
pub use term::{Atom, Term};
