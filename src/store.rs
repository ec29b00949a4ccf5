//! The relation store: ground facts partitioned into extensional (EDB) and
//! intensional (IDB) relations, with indexed pattern lookup and cheap
//! commit/revert snapshots.

use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::error::EngineError;
use crate::subst::Omega;
use crate::term::Atom;

/// A relation: the deduplicated, insertion-ordered set of ground atoms
/// stored under one predicate. Insertion order matters because commit
/// markers are lengths and revert truncates.
pub type Relation = IndexSet<Atom>;

/// The two disjoint classes a predicate can be registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationClass {
    /// Extensional: facts asserted from outside the rule set.
    Edb,
    /// Intensional: facts derived by rule evaluation.
    Idb,
}

impl fmt::Display for RelationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationClass::Edb => write!(f, "EDB"),
            RelationClass::Idb => write!(f, "IDB"),
        }
    }
}

/// An EDB/IDB partitioned fact store.
///
/// A predicate, once registered, belongs to exactly one class for the
/// lifetime of the store. Relations are append-only within a session:
/// [`Database::commit`] pushes the current length of every relation and
/// [`Database::revert`] pops and truncates, so rollback never needs
/// tombstones.
///
/// `Clone` is a deep copy (schema, facts and commit markers); use
/// [`Database::shallow_copy`] to clone only the schema.
#[derive(Debug, Clone, Default)]
pub struct Database {
    idb: IndexMap<String, Relation>,
    edb: IndexMap<String, Relation>,
    commits: IndexMap<String, Vec<usize>>,
}

impl Database {
    /// Creates an empty store with no registered relations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones the relation schema only: the copy has the same relations
    /// registered under the same classes, all empty, with empty commit
    /// stacks. This is how delta stores and fact batches are created.
    #[must_use]
    pub fn shallow_copy(&self) -> Self {
        Database {
            idb: self.idb.keys().map(|k| (k.clone(), Relation::new())).collect(),
            edb: self.edb.keys().map(|k| (k.clone(), Relation::new())).collect(),
            commits: self.commits.keys().map(|k| (k.clone(), Vec::new())).collect(),
        }
    }

    /// Registers `predicate` as an EDB relation. Idempotent if it is
    /// already EDB.
    ///
    /// # Errors
    ///
    /// [`EngineError::RelationClassConflict`] if `predicate` is registered
    /// as IDB.
    pub fn register_edb_rel(&mut self, predicate: &str) -> Result<(), EngineError> {
        if self.is_idb_relation(predicate) {
            return Err(EngineError::RelationClassConflict {
                predicate: predicate.to_string(),
                registered_as: RelationClass::Idb,
            });
        }
        if !self.edb.contains_key(predicate) {
            self.edb.insert(predicate.to_string(), Relation::new());
            self.commits.insert(predicate.to_string(), Vec::new());
        }
        Ok(())
    }

    /// Registers `predicate` as an IDB relation. Idempotent if it is
    /// already IDB.
    ///
    /// # Errors
    ///
    /// [`EngineError::RelationClassConflict`] if `predicate` is registered
    /// as EDB.
    pub fn register_idb_rel(&mut self, predicate: &str) -> Result<(), EngineError> {
        if self.is_edb_relation(predicate) {
            return Err(EngineError::RelationClassConflict {
                predicate: predicate.to_string(),
                registered_as: RelationClass::Edb,
            });
        }
        if !self.idb.contains_key(predicate) {
            self.idb.insert(predicate.to_string(), Relation::new());
            self.commits.insert(predicate.to_string(), Vec::new());
        }
        Ok(())
    }

    /// True iff `predicate` is registered as IDB.
    #[must_use]
    pub fn is_idb_relation(&self, predicate: &str) -> bool {
        self.idb.contains_key(predicate)
    }

    /// True iff `predicate` is registered as EDB.
    #[must_use]
    pub fn is_edb_relation(&self, predicate: &str) -> bool {
        self.edb.contains_key(predicate)
    }

    /// Inserts a ground atom into the relation its predicate selects,
    /// deduplicated by triple equality. A wholly unknown predicate is
    /// auto-registered as EDB first.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotGround`] if the atom contains a variable.
    pub fn add_atom(&mut self, atom: Atom) -> Result<(), EngineError> {
        if !atom.is_ground() {
            return Err(EngineError::NotGround(atom));
        }
        // Ground atoms always have a constant predicate.
        let predicate = atom.predicate_name().unwrap_or_default().to_string();

        if let Some(rel) = self.edb.get_mut(&predicate) {
            rel.insert(atom);
        } else if let Some(rel) = self.idb.get_mut(&predicate) {
            rel.insert(atom);
        } else {
            self.register_edb_rel(&predicate)?;
            if let Some(rel) = self.edb.get_mut(&predicate) {
                rel.insert(atom);
            }
        }
        Ok(())
    }

    /// True iff `atom` is ground and present in its relation. Non-ground
    /// atoms are never known.
    #[must_use]
    pub fn knows(&self, atom: &Atom) -> bool {
        if !atom.is_ground() {
            return false;
        }
        let Some(predicate) = atom.predicate_name() else {
            return false;
        };
        self.idb
            .get(predicate)
            .or_else(|| self.edb.get(predicate))
            .is_some_and(|rel| rel.contains(atom))
    }

    /// Matches `pattern` against every atom of the relation its predicate
    /// selects (IDB checked first, then EDB) and returns the resulting
    /// substitutions. An unregistered predicate yields an empty result set,
    /// not an error.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnsupportedPattern`] if the predicate position is a
    /// variable.
    pub fn find_mappings_for(&self, pattern: &Atom) -> Result<Omega, EngineError> {
        let Some(predicate) = pattern.predicate_name() else {
            return Err(EngineError::UnsupportedPattern(pattern.clone()));
        };

        let mut omega = Omega::new();
        let rel = self.idb.get(predicate).or_else(|| self.edb.get(predicate));
        if let Some(rel) = rel {
            for atom in rel {
                if pattern.matches(atom) {
                    omega.push(pattern.to_mu(atom));
                }
            }
        }
        Ok(omega)
    }

    /// All facts currently stored under `predicate`, in insertion order.
    #[must_use]
    pub fn get_facts(&self, predicate: &str) -> Vec<Atom> {
        self.idb
            .get(predicate)
            .or_else(|| self.edb.get(predicate))
            .map(|rel| rel.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Pushes the current length of every relation onto its checkpoint
    /// stack.
    pub fn commit(&mut self) {
        for (name, rel) in self.idb.iter().chain(self.edb.iter()) {
            self.commits.entry(name.clone()).or_default().push(rel.len());
        }
    }

    /// Pops the most recent checkpoint of every relation and truncates the
    /// relation back to it. A relation with an empty checkpoint stack is
    /// left untouched; revert past the first commit is a no-op, not an
    /// error.
    pub fn revert(&mut self) {
        for (name, rel) in self.idb.iter_mut().chain(self.edb.iter_mut()) {
            if let Some(len) = self.commits.get_mut(name).and_then(Vec::pop) {
                rel.truncate(len);
            }
        }
    }

    /// Extends every relation of this store with the same-class,
    /// same-name facts of `other`. Relations of `other` that this store
    /// has not registered are ignored. With `dedupe`, facts already present
    /// are skipped up front; either way set semantics guarantee no
    /// duplicate is stored.
    pub fn append(&mut self, other: &Database, dedupe: bool) {
        append_rels(&mut self.idb, &other.idb, dedupe);
        append_rels(&mut self.edb, &other.edb, dedupe);
    }

    /// Drops from every relation the facts present in the corresponding
    /// relation of `other`. Used to retract an over-estimated deletion set.
    pub fn remove(&mut self, other: &Database) {
        remove_rels(&mut self.idb, &other.idb);
        remove_rels(&mut self.edb, &other.edb);
    }

    /// Empties every IDB relation while keeping it registered. Forces the
    /// next evaluation to recompute the derived dataset from scratch.
    pub fn clear_idb(&mut self) {
        for rel in self.idb.values_mut() {
            rel.clear();
        }
    }

    /// True iff no relation of either class holds a fact.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.idb.values().chain(self.edb.values()).all(IndexSet::is_empty)
    }

    /// Total number of stored facts across all relations.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.idb.values().chain(self.edb.values()).map(IndexSet::len).sum()
    }

    /// Content-based equivalence: for every relation name present in
    /// either store (per class), both stores hold the same fact set. An
    /// unregistered relation counts as empty. Symmetric and independent of
    /// insertion order and commit history.
    #[must_use]
    pub fn equal_to(&self, other: &Database) -> bool {
        rels_equal(&self.idb, &other.idb) && rels_equal(&self.edb, &other.edb)
    }
}

fn append_rels(
    rels: &mut IndexMap<String, Relation>,
    other: &IndexMap<String, Relation>,
    dedupe: bool,
) {
    for (name, rel) in rels.iter_mut() {
        if let Some(other_rel) = other.get(name) {
            if dedupe {
                for atom in other_rel {
                    if !rel.contains(atom) {
                        rel.insert(atom.clone());
                    }
                }
            } else {
                rel.extend(other_rel.iter().cloned());
            }
        }
    }
}

fn remove_rels(rels: &mut IndexMap<String, Relation>, other: &IndexMap<String, Relation>) {
    for (name, rel) in rels.iter_mut() {
        if let Some(other_rel) = other.get(name) {
            rel.retain(|atom| !other_rel.contains(atom));
        }
    }
}

fn rels_equal(a: &IndexMap<String, Relation>, b: &IndexMap<String, Relation>) -> bool {
    let empty = Relation::new();
    a.keys()
        .chain(b.keys().filter(|k| !a.contains_key(*k)))
        .all(|name| {
            let rel_a = a.get(name).unwrap_or(&empty);
            let rel_b = b.get(name).unwrap_or(&empty);
            rel_a == rel_b
        })
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EDB:")?;
        dump_rels(f, &self.edb)?;
        writeln!(f, "IDB:")?;
        dump_rels(f, &self.idb)
    }
}

fn dump_rels(f: &mut fmt::Formatter<'_>, rels: &IndexMap<String, Relation>) -> fmt::Result {
    for (name, rel) in rels {
        writeln!(f, "  {name} ({} facts)", rel.len())?;
        for atom in rel {
            writeln!(f, "    {atom}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Term;

    fn atom(s: &str, p: &str, o: &str) -> Atom {
        Atom::new(s, p, o).unwrap()
    }

    fn link_db() -> Database {
        let mut db = Database::new();
        for (s, o) in [(":a", ":b"), (":b", ":c"), (":c", ":c"), (":c", ":d")] {
            db.add_atom(atom(s, ":link", o)).unwrap();
        }
        db
    }

    #[test]
    fn add_atom_auto_registers_edb() {
        let db = link_db();
        assert!(db.is_edb_relation(":link"));
        assert!(!db.is_idb_relation(":link"));
        for (s, o) in [(":a", ":b"), (":b", ":c"), (":c", ":c"), (":c", ":d")] {
            assert!(db.knows(&atom(s, ":link", o)));
        }
        assert!(!db.knows(&atom(":a", ":link", ":d")));
    }

    #[test]
    fn add_atom_rejects_non_ground() {
        let mut db = Database::new();
        assert!(matches!(
            db.add_atom(Atom::new("?x", ":link", ":b").unwrap()),
            Err(EngineError::NotGround(_))
        ));
    }

    #[test]
    fn asserting_twice_does_not_grow_the_relation() {
        let mut db = link_db();
        assert_eq!(db.get_facts(":link").len(), 4);
        db.add_atom(atom(":a", ":link", ":b")).unwrap();
        assert_eq!(db.get_facts(":link").len(), 4);
    }

    #[test]
    fn relation_classes_are_exclusive_in_both_orders() {
        let mut db = Database::new();
        db.register_edb_rel(":link").unwrap();
        db.register_edb_rel(":link").unwrap(); // idempotent
        assert!(matches!(
            db.register_idb_rel(":link"),
            Err(EngineError::RelationClassConflict {
                registered_as: RelationClass::Edb,
                ..
            })
        ));

        let mut db = Database::new();
        db.register_idb_rel(":reachable").unwrap();
        db.register_idb_rel(":reachable").unwrap();
        assert!(matches!(
            db.register_edb_rel(":reachable"),
            Err(EngineError::RelationClassConflict {
                registered_as: RelationClass::Idb,
                ..
            })
        ));
    }

    #[test]
    fn find_mappings_for_matches_whole_relation() {
        let db = link_db();
        let omega = db
            .find_mappings_for(&Atom::new("?x", ":link", "?y").unwrap())
            .unwrap();
        assert_eq!(omega.len(), 4);
    }

    #[test]
    fn find_mappings_for_respects_constants_and_self_joins() {
        let db = link_db();

        let from_c = db
            .find_mappings_for(&Atom::new(":c", ":link", "?y").unwrap())
            .unwrap();
        assert_eq!(from_c.len(), 2);

        let self_loops = db
            .find_mappings_for(&Atom::new("?x", ":link", "?x").unwrap())
            .unwrap();
        assert_eq!(self_loops.len(), 1);
        assert_eq!(
            self_loops.iter().next().unwrap().get("?x"),
            Some(&Term::Constant(":c".to_string()))
        );
    }

    #[test]
    fn unregistered_predicate_yields_empty_omega() {
        let db = link_db();
        let omega = db
            .find_mappings_for(&Atom::new("?x", ":none", "?y").unwrap())
            .unwrap();
        assert!(omega.is_empty());
    }

    #[test]
    fn commit_revert_round_trip() {
        let mut db = link_db();
        let before = db.clone();

        db.commit();
        db.add_atom(atom(":d", ":link", ":e")).unwrap();
        db.add_atom(atom(":e", ":link", ":f")).unwrap();
        assert!(!db.equal_to(&before));

        db.revert();
        assert!(db.equal_to(&before));
    }

    #[test]
    fn revert_on_empty_stack_is_a_noop() {
        let mut db = link_db();
        let before = db.clone();
        db.revert();
        assert!(db.equal_to(&before));
    }

    #[test]
    fn nested_commits_unwind_in_order() {
        let mut db = link_db();
        let base = db.clone();

        db.commit();
        db.add_atom(atom(":d", ":link", ":e")).unwrap();
        let with_one = db.clone();

        db.commit();
        db.add_atom(atom(":e", ":link", ":f")).unwrap();

        db.revert();
        assert!(db.equal_to(&with_one));
        db.revert();
        assert!(db.equal_to(&base));
    }

    #[test]
    fn shallow_copy_clones_schema_only() {
        let mut db = link_db();
        db.register_idb_rel(":reachable").unwrap();

        let copy = db.shallow_copy();
        assert!(copy.is_edb_relation(":link"));
        assert!(copy.is_idb_relation(":reachable"));
        assert!(copy.is_empty());
    }

    #[test]
    fn deep_copy_is_independent() {
        let db = link_db();
        let mut copy = db.clone();
        assert!(copy.equal_to(&db));

        copy.add_atom(atom(":x", ":link", ":y")).unwrap();
        assert!(!copy.equal_to(&db));
        assert_eq!(db.get_facts(":link").len(), 4);
    }

    #[test]
    fn append_and_remove() {
        let mut db = link_db();
        let mut batch = db.shallow_copy();
        batch.add_atom(atom(":d", ":link", ":e")).unwrap();
        batch.add_atom(atom(":a", ":link", ":b")).unwrap(); // already known

        db.append(&batch, true);
        assert_eq!(db.get_facts(":link").len(), 5);

        db.remove(&batch);
        assert_eq!(db.get_facts(":link").len(), 3);
        assert!(!db.knows(&atom(":a", ":link", ":b")));
        assert!(db.knows(&atom(":b", ":link", ":c")));
    }

    #[test]
    fn clear_idb_keeps_registration() {
        let mut db = link_db();
        db.register_idb_rel(":reachable").unwrap();
        db.add_atom(atom(":a", ":reachable", ":b")).unwrap();

        db.clear_idb();
        assert!(db.is_idb_relation(":reachable"));
        assert!(db.get_facts(":reachable").is_empty());
        assert_eq!(db.get_facts(":link").len(), 4);
    }

    #[test]
    fn equality_is_content_based_and_symmetric() {
        let db = link_db();
        let mut other = Database::new();
        // Insert in a different order.
        for (s, o) in [(":c", ":d"), (":c", ":c"), (":b", ":c"), (":a", ":b")] {
            other.add_atom(atom(s, ":link", o)).unwrap();
        }
        assert!(db.equal_to(&other));
        assert!(other.equal_to(&db));

        // A registered-but-empty relation equals an unregistered one.
        other.register_edb_rel(":unused").unwrap();
        assert!(db.equal_to(&other));
        assert!(other.equal_to(&db));

        other.add_atom(atom(":a", ":unused", ":b")).unwrap();
        assert!(!db.equal_to(&other));
        assert!(!other.equal_to(&db));
    }
}
