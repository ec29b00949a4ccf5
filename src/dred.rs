//! Delete-and-rederive (DRed) incremental maintenance.
//!
//! Retraction is handled in three phases: over-estimate everything the
//! deleted facts may have contributed to, retract the whole estimate, then
//! selectively restore every estimated fact that is still derivable from
//! the surviving store. The result must equal a full recompute from the
//! post-retraction EDB; that equivalence is the correctness contract.

use log::debug;

use crate::error::EngineError;
use crate::rule::{DeltaProgram, DeltaRule, Program};
use crate::store::Database;

/// Retracts the facts of `del` from the fixpointed store `db` and
/// incrementally restores the affected part of the derived dataset.
///
/// `del` is used as scratch space for the over-estimate and holds the full
/// estimated deletion set afterwards. Its relations are aligned with the
/// program's schema up front, so a caller may pass a plain store holding
/// just the retracted EDB facts.
///
/// # Errors
///
/// Propagates registration, pattern lookup and head grounding failures.
pub fn dred(db: &mut Database, del: &mut Database, prog: &Program) -> Result<(), EngineError> {
    prog.register(del)?;

    over_estimate(prog, db, del)?;
    debug!("over-estimated deletion set: {} facts", del.fact_count());

    // Full removal from both partitions: leaving the estimate in the IDB
    // would keep stale facts reachable during alternative derivation.
    db.remove(del);

    alt_derive(prog, db, del)
}

/// Phase one: grow `del` into a safe over-approximation of everything that
/// may depend on it. `db` is left untouched until the whole estimate is
/// known: removing increments mid-phase would hide support that later
/// rounds need to reach the dependents of facts estimated in the same
/// round, such as a join whose two body facts both enter the estimate at
/// once.
fn over_estimate(prog: &Program, db: &Database, del: &mut Database) -> Result<(), EngineError> {
    // Deletions can originate from EDB changes, so every body literal is a
    // candidate delta literal.
    let dprog = prog.to_delta_program(db, false);

    loop {
        let delta = over_estimate_round(&dprog, db, del)?;
        if delta.is_empty() {
            return Ok(());
        }
        del.append(&delta, false);
    }
}

/// One over-estimate round: anything derivable with at least one deleted
/// fact is a deletion candidate. Deduplicated against the estimate, not
/// against `db` — the point is to find facts of `db` to delete.
fn over_estimate_round(
    dprog: &DeltaProgram,
    db: &Database,
    del: &Database,
) -> Result<Database, EngineError> {
    let mut out = db.shallow_copy();
    for delta_rule in &dprog.delta_rules {
        for mu in &delta_rule.eval(db, del)? {
            let head = delta_rule.head.apply(mu)?;
            if !del.knows(&head) && !out.knows(&head) {
                out.add_atom(head)?;
            }
        }
    }
    Ok(out)
}

/// Phase three: restore every estimated fact that is still supported.
///
/// Candidates are drawn from the estimate by using each rule's head as the
/// delta literal; the rule body is matched against the surviving `db`
/// only. Matching against `db` plus the estimate would resurrect facts
/// whose only support was itself deleted, e.g. a reachability fact kept
/// alive by a retracted self-loop. Restored facts are appended to `db`
/// each round, so support that re-appears is picked up by later rounds.
fn alt_derive(prog: &Program, db: &mut Database, del: &Database) -> Result<(), EngineError> {
    let dprog = to_alt_derive_program(prog);

    let mut restored = 0usize;
    loop {
        let delta = alt_derive_round(&dprog, db, del)?;
        if delta.is_empty() {
            debug!("alternative derivation restored {restored} facts");
            return Ok(());
        }
        restored += delta.fact_count();
        db.append(&delta, false);
    }
}

/// Compiles the alternative-derivation program: one delta rule per rule,
/// with the head itself as the delta literal and the full body kept.
fn to_alt_derive_program(prog: &Program) -> DeltaProgram {
    DeltaProgram {
        rules: Vec::new(),
        delta_rules: prog
            .iter()
            .map(|rule| DeltaRule {
                head: rule.head.clone(),
                delta: rule.head.clone(),
                body: rule.body.clone(),
            })
            .collect(),
    }
}

fn alt_derive_round(
    dprog: &DeltaProgram,
    db: &Database,
    del: &Database,
) -> Result<Database, EngineError> {
    let mut out = db.shallow_copy();
    for delta_rule in &dprog.delta_rules {
        for mu in &delta_rule.eval(db, del)? {
            let head = delta_rule.head.apply(mu)?;
            if !db.knows(&head) && !out.knows(&head) {
                out.add_atom(head)?;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;
    use crate::term::Atom;

    fn atom(s: &str, p: &str, o: &str) -> Atom {
        Atom::new(s, p, o).unwrap()
    }

    fn closure_program() -> Program {
        let r1 = Rule::new(
            atom("?x", ":reachable", "?y"),
            [atom("?x", ":link", "?y")],
        );
        let r2 = Rule::new(
            atom("?x", ":reachable", "?y"),
            [atom("?x", ":link", "?z"), atom("?z", ":reachable", "?y")],
        );
        Program::new([r1, r2])
    }

    fn fixpointed(edges: &[(&str, &str)]) -> (Database, Program) {
        let mut db = Database::new();
        for (s, o) in edges {
            db.add_atom(atom(s, ":link", o)).unwrap();
        }
        let prog = closure_program();
        prog.register(&mut db).unwrap();
        prog.eval_seminaive(&mut db).unwrap();
        (db, prog)
    }

    fn recompute_without(edges: &[(&str, &str)], removed: &[(&str, &str)]) -> Database {
        let mut db = Database::new();
        for (s, o) in edges {
            if !removed.contains(&(*s, *o)) {
                db.add_atom(atom(s, ":link", o)).unwrap();
            }
        }
        let prog = closure_program();
        prog.register(&mut db).unwrap();
        prog.eval_seminaive(&mut db).unwrap();
        db
    }

    const EDGES: [(&str, &str); 4] = [(":a", ":b"), (":b", ":c"), (":c", ":c"), (":c", ":d")];

    #[test]
    fn retracting_a_self_loop_keeps_independently_supported_facts() {
        let (mut db, prog) = fixpointed(&EDGES);

        let mut del = db.shallow_copy();
        del.add_atom(atom(":c", ":link", ":c")).unwrap();
        dred(&mut db, &mut del, &prog).unwrap();

        // reachable(c,c) had the self-loop as its sole support.
        assert!(!db.knows(&atom(":c", ":reachable", ":c")));
        assert!(!db.knows(&atom(":c", ":link", ":c")));

        // Everything reachable through the chain survives.
        for (s, o) in [(":a", ":d"), (":b", ":d"), (":c", ":d"), (":a", ":c")] {
            assert!(db.knows(&atom(s, ":reachable", o)), "lost reachable({s}, {o})");
        }

        let scratch = recompute_without(&EDGES, &[(":c", ":c")]);
        assert!(db.equal_to(&scratch));
    }

    #[test]
    fn retracting_a_bridge_edge_drops_the_downstream_closure() {
        let (mut db, prog) = fixpointed(&EDGES);

        let mut del = db.shallow_copy();
        del.add_atom(atom(":b", ":link", ":c")).unwrap();
        dred(&mut db, &mut del, &prog).unwrap();

        assert!(!db.knows(&atom(":a", ":reachable", ":c")));
        assert!(!db.knows(&atom(":a", ":reachable", ":d")));
        assert!(!db.knows(&atom(":b", ":reachable", ":d")));
        assert!(db.knows(&atom(":a", ":reachable", ":b")));
        assert!(db.knows(&atom(":c", ":reachable", ":d")));

        let scratch = recompute_without(&EDGES, &[(":b", ":c")]);
        assert!(db.equal_to(&scratch));
    }

    #[test]
    fn facts_with_alternative_paths_are_restored() {
        // Two parallel routes from a to c; deleting one keeps reachability.
        let edges = [(":a", ":b"), (":b", ":c"), (":a", ":x"), (":x", ":c")];
        let (mut db, prog) = fixpointed(&edges);

        let mut del = db.shallow_copy();
        del.add_atom(atom(":b", ":link", ":c")).unwrap();
        dred(&mut db, &mut del, &prog).unwrap();

        assert!(db.knows(&atom(":a", ":reachable", ":c")));
        assert!(!db.knows(&atom(":b", ":reachable", ":c")));

        let scratch = recompute_without(&edges, &[(":b", ":c")]);
        assert!(db.equal_to(&scratch));
    }

    #[test]
    fn empty_deletion_set_changes_nothing() {
        let (mut db, prog) = fixpointed(&EDGES);
        let before = db.clone();

        let mut del = db.shallow_copy();
        dred(&mut db, &mut del, &prog).unwrap();
        assert!(db.equal_to(&before));
    }

    #[test]
    fn retracting_every_edge_empties_the_closure() {
        let (mut db, prog) = fixpointed(&EDGES);

        let mut del = db.shallow_copy();
        for (s, o) in EDGES {
            del.add_atom(atom(s, ":link", o)).unwrap();
        }
        dred(&mut db, &mut del, &prog).unwrap();
        assert!(db.is_empty());
    }

    #[test]
    fn estimate_reaches_dependents_of_facts_estimated_in_the_same_round() {
        // p(x,y) joins a(x,y) and b(x,y); retracting e1 and e2 together
        // puts both supports into the estimate in the same round, and p
        // must still be found in the next one.
        let prog = Program::new([
            Rule::new(atom("?x", ":a", "?y"), [atom("?x", ":e1", "?y")]),
            Rule::new(atom("?x", ":b", "?y"), [atom("?x", ":e2", "?y")]),
            Rule::new(
                atom("?x", ":p", "?y"),
                [atom("?x", ":a", "?y"), atom("?x", ":b", "?y")],
            ),
        ]);

        let mut db = Database::new();
        db.add_atom(atom(":u", ":e1", ":v")).unwrap();
        db.add_atom(atom(":u", ":e2", ":v")).unwrap();
        prog.register(&mut db).unwrap();
        prog.eval_seminaive(&mut db).unwrap();
        assert!(db.knows(&atom(":u", ":p", ":v")));

        let mut del = db.shallow_copy();
        del.add_atom(atom(":u", ":e1", ":v")).unwrap();
        del.add_atom(atom(":u", ":e2", ":v")).unwrap();
        dred(&mut db, &mut del, &prog).unwrap();

        assert!(!db.knows(&atom(":u", ":a", ":v")));
        assert!(!db.knows(&atom(":u", ":b", ":v")));
        assert!(!db.knows(&atom(":u", ":p", ":v")));
        assert!(db.is_empty());
    }

    #[test]
    fn retracting_one_of_two_join_supports_still_drops_the_join() {
        let prog = Program::new([
            Rule::new(atom("?x", ":a", "?y"), [atom("?x", ":e1", "?y")]),
            Rule::new(atom("?x", ":b", "?y"), [atom("?x", ":e2", "?y")]),
            Rule::new(
                atom("?x", ":p", "?y"),
                [atom("?x", ":a", "?y"), atom("?x", ":b", "?y")],
            ),
        ]);

        let mut db = Database::new();
        db.add_atom(atom(":u", ":e1", ":v")).unwrap();
        db.add_atom(atom(":u", ":e2", ":v")).unwrap();
        prog.register(&mut db).unwrap();
        prog.eval_seminaive(&mut db).unwrap();

        let mut del = db.shallow_copy();
        del.add_atom(atom(":u", ":e1", ":v")).unwrap();
        dred(&mut db, &mut del, &prog).unwrap();

        assert!(!db.knows(&atom(":u", ":a", ":v")));
        assert!(!db.knows(&atom(":u", ":p", ":v")));
        assert!(db.knows(&atom(":u", ":e2", ":v")));
        assert!(db.knows(&atom(":u", ":b", ":v")));
    }

    #[test]
    fn dred_accepts_an_unregistered_deletion_store() {
        let (mut db, prog) = fixpointed(&EDGES);

        // A plain store, schema aligned by dred itself.
        let mut del = Database::new();
        del.add_atom(atom(":c", ":link", ":c")).unwrap();
        dred(&mut db, &mut del, &prog).unwrap();

        let scratch = recompute_without(&EDGES, &[(":c", ":c")]);
        assert!(db.equal_to(&scratch));
    }
}
