//! The two-tier context model.
//!
//! This module provides:
//! - Job-scoped shared state with the run's halt signal
//! - Record-scoped transaction state for one pipeline pass
//! - The symbol table seeded at open
//! - The persistent cross-run store with its single-writer policy

mod job;
mod store;
mod symbols;
mod transaction;

pub use job::{ContextStatus, JobContext};
pub use store::ContextStore;
pub use symbols::{
    SymbolTable, SYM_HOME_DIR, SYM_JOB_DIR, SYM_JOB_ID, SYM_JOB_NAME, SYM_RUN_DATE, SYM_RUN_TIME,
    SYM_WORK_DIR,
};
pub use transaction::TransactionContext;
