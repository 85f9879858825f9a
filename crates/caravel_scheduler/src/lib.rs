//! Execution engine and run trigger for caravel (Layer 3).
//!
//! `caravel_scheduler` takes the graphs `caravel_graph` builds and drives
//! them to completion with a bounded worker pool:
//!
//! - [`Scheduler`] - the execution engine: admits nodes whose dependencies
//!   are `Ready`, contains per-node failures by skipping dependents, and
//!   drains cleanly on cancellation
//! - [`RunReport`] - the full account of a run: verdict plus every node's
//!   final status
//! - [`RunManager`] - the control-object boundary: parses trigger payloads
//!   and supervises at most one run at a time
//!
//! # Example
//!
//! ```ignore
//! use caravel_scheduler::{RunManager, ControlEvent, ControlObject};
//!
//! let mut manager = RunManager::new(client);
//! manager
//!     .handle_event(ControlEvent::Applied(ControlObject::new().with("concurrency", "4")))
//!     .await?;
//! let report = manager.shutdown().await;
//! ```

/// The control-object run trigger.
pub mod controller;

/// The bounded-concurrency execution engine.
pub mod executor;

/// Run outcomes and reports.
pub mod report;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::controller::{
        CONCURRENCY_KEY, ControlError, ControlEvent, ControlObject, RunManager, SELECTOR_KEY,
    };
    pub use crate::executor::Scheduler;
    pub use crate::report::{RunOutcome, RunReport};
}

pub use controller::{ControlError, ControlEvent, ControlObject, RunManager};
pub use executor::Scheduler;
pub use report::{RunOutcome, RunReport};
