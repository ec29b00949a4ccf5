//! Fixpoint evaluation: naive and semi-naive strategies, plus the
//! batch-append variant used by the commit/revert maintenance strategy.
//!
//! Recursive predicates are handled purely by the round loop: every round
//! consumes the previous round's output as a bounded increment, so the
//! fixpoint terminates on any finite domain.

use log::{debug, trace};

use crate::error::EngineError;
use crate::rule::{DeltaProgram, Program};
use crate::store::Database;

impl DeltaProgram {
    /// Computes one semi-naive round: non-delta rules are evaluated in
    /// full, delta rules match their delta literal against `delta` only.
    /// A derived head is kept only if it is unknown to both the store and
    /// this round's output.
    ///
    /// # Errors
    ///
    /// Propagates pattern lookup and head grounding failures.
    pub fn eval_round(&self, db: &Database, delta: &Database) -> Result<Database, EngineError> {
        let mut out = db.shallow_copy();

        for rule in &self.rules {
            let omega = rule.eval(db)?;
            trace!("rule {} -> {} candidate bindings", rule.head, omega.len());
            for mu in &omega {
                let head = rule.head.apply(mu)?;
                if !db.knows(&head) && !out.knows(&head) {
                    out.add_atom(head)?;
                }
            }
        }

        for delta_rule in &self.delta_rules {
            let omega = delta_rule.eval(db, delta)?;
            trace!(
                "delta rule {} (delta {}) -> {} candidate bindings",
                delta_rule.head,
                delta_rule.delta,
                omega.len()
            );
            for mu in &omega {
                let head = delta_rule.head.apply(mu)?;
                if !db.knows(&head) && !out.knows(&head) {
                    out.add_atom(head)?;
                }
            }
        }

        Ok(out)
    }
}

impl Program {
    /// Runs naive evaluation to a fixpoint: every rule is evaluated in
    /// full each round until a round derives nothing new.
    ///
    /// Kept alongside the semi-naive strategy as the simplest correct
    /// reference; the two must agree on every program.
    ///
    /// # Errors
    ///
    /// Propagates pattern lookup and head grounding failures.
    pub fn eval_naive(&self, db: &mut Database) -> Result<(), EngineError> {
        let mut round = 0usize;
        loop {
            let mut delta = db.shallow_copy();
            for rule in self.iter() {
                for mu in &rule.eval(db)? {
                    let head = rule.head.apply(mu)?;
                    if !db.knows(&head) && !delta.knows(&head) {
                        delta.add_atom(head)?;
                    }
                }
            }
            if delta.is_empty() {
                debug!("naive evaluation reached fixpoint after {round} rounds");
                return Ok(());
            }
            round += 1;
            debug!("naive round {round}: {} new facts", delta.fact_count());
            db.append(&delta, false);
        }
    }

    /// Runs semi-naive evaluation to a fixpoint, bootstrapping with the
    /// whole store as the initial delta. Running it again on a fixpointed
    /// store derives nothing and leaves the store unchanged.
    ///
    /// # Errors
    ///
    /// Propagates pattern lookup and head grounding failures.
    pub fn eval_seminaive(&self, db: &mut Database) -> Result<(), EngineError> {
        let dprog = self.to_delta_program(db, true);

        let mut round = 0usize;
        let mut delta = dprog.eval_round(db, db)?;
        while !delta.is_empty() {
            round += 1;
            debug!("semi-naive round {round}: {} new facts", delta.fact_count());
            db.append(&delta, false);
            delta = dprog.eval_round(db, &delta)?;
        }
        debug!("semi-naive evaluation reached fixpoint after {round} rounds");
        Ok(())
    }

    /// Appends a batch of external facts to an already-fixpointed store
    /// and re-runs the fixpoint incrementally, using the batch as the
    /// first delta. Compiled with `idb_only = false` because the batch can
    /// touch EDB predicates directly.
    ///
    /// The batch lands before the first round so that the non-delta body
    /// literals see the store plus the batch; a head whose body needs two
    /// facts from the same batch would otherwise never be derived.
    ///
    /// The batch should share the store's relation schema; building it
    /// from [`Database::shallow_copy`] guarantees that.
    ///
    /// # Errors
    ///
    /// Propagates pattern lookup and head grounding failures.
    pub fn eval_seminaive_append(
        &self,
        db: &mut Database,
        batch: &Database,
    ) -> Result<(), EngineError> {
        let dprog = self.to_delta_program(db, false);
        db.append(batch, false);

        let mut delta = dprog.eval_round(db, batch)?;
        let mut round = 0usize;
        while !delta.is_empty() {
            round += 1;
            debug!("append round {round}: {} new facts", delta.fact_count());
            db.append(&delta, false);
            delta = dprog.eval_round(db, &delta)?;
        }
        debug!("append evaluation reached fixpoint after {round} rounds");
        Ok(())
    }
}
