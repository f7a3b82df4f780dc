//! Append-only decision ledger.
//!
//! Every constraint chosen during a protocol run is recorded as a
//! [`Decision`] with a category-scoped monotonic id, a confidence tier and a
//! lifecycle status. Decisions are never deleted; the only lawful in-place
//! mutation is the status/`superseded_by` rewrite performed by
//! [`DecisionLedger::supersede`] (and its `invalidate` sibling), which is why
//! the ledger's storage is private to [`store`].
//!
//! | Layer         | What it defines                                        |
//! |---------------|--------------------------------------------------------|
//! | `decision.rs` | `Decision`, `DecisionInput` and the closed enums       |
//! | `store.rs`    | `DecisionLedger`: append, supersede, invalidate, file I/O |

pub mod decision;
pub mod store;

pub use decision::{
    Category, Confidence, Decision, DecisionInput, DecisionPhase, DecisionStatus, Source,
};
pub use store::{DecisionLedger, LedgerMeta, LedgerStats};
