//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                       |
//! |-----------|----------------------------------------|
//! | `project` | `Init`, `Reset`                        |
//! | `run`     | `Run`, `Recover`                       |
//! | `state`   | `Status`, `Artifact`, `Block`, `Resolve` |
//! | `ledger`  | `Ledger`                               |

pub mod ledger;
pub mod project;
pub mod run;
pub mod state;

pub use ledger::cmd_ledger;
pub use project::{cmd_init, cmd_reset};
pub use run::{cmd_recover, cmd_run};
pub use state::{cmd_artifact, cmd_block, cmd_resolve, cmd_status};
