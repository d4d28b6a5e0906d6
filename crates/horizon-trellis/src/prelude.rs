//! Prelude module for Horizon Trellis.
//!
//! This module re-exports the most commonly used types for convenient importing:
//!
//! ```ignore
//! use horizon_trellis::prelude::*;
//! ```
//!
//! This provides access to the store and its handles, the value model,
//! directive registration and the document types.

// ============================================================================
// Store
// ============================================================================

pub use crate::{Reactive, Store, TrellisConfig};

// ============================================================================
// Values
// ============================================================================

pub use crate::{ComputeError, Computed, Value};

// ============================================================================
// Directives and Watchers
// ============================================================================

pub use crate::{DirectiveParams, IF, IFNOT, MARK, WatcherId};

// ============================================================================
// Errors
// ============================================================================

pub use crate::{Result, TrellisError};

// ============================================================================
// Document
// ============================================================================

pub use crate::dom::{Document, NodeId, ReadyState};
