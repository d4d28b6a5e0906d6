//! Logging targets for the reactivity engine.
//!
//! All diagnostics go through `tracing`. Filter on these targets to follow a
//! single concern, e.g. `RUST_LOG=horizon_trellis_core::list=trace`.

pub use horizon_trellis_dom::PerfSpan;

/// Target names for log filtering.
pub mod targets {
    /// Reads, writes and deletes on the store.
    pub const STORE: &str = "horizon_trellis_core::store";
    /// Watcher and directive fan-out.
    pub const PROPAGATE: &str = "horizon_trellis_core::propagate";
    /// Computed registration and re-evaluation.
    pub const DEPS: &str = "horizon_trellis_core::deps";
    /// List materialization and ordering.
    pub const LIST: &str = "horizon_trellis_core::list";
    /// Directive registration and invocation.
    pub const DIRECTIVE: &str = "horizon_trellis_core::directive";
    /// Asynchronous continuations.
    pub const PENDING: &str = "horizon_trellis_core::pending";
}
