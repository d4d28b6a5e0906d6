//! Error types for document tree operations.

/// Result type alias for document tree operations.
pub type DomResult<T> = std::result::Result<T, DomError>;

/// Errors that can occur while building or mutating a document tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    /// The node id is invalid or the node has been removed.
    #[error("Invalid or removed node id")]
    InvalidNode,

    /// The operation requires an element node.
    #[error("Node is not an element")]
    NotAnElement,

    /// The insertion would make a node its own ancestor, or would move the
    /// document node.
    #[error("Hierarchy request error: {0}")]
    HierarchyRequest(&'static str),

    /// The node has no parent, so sibling-relative operations are impossible.
    #[error("Node has no parent")]
    Detached,

    /// Markup could not be parsed.
    #[error("Markup parse error at byte {position}: {message}")]
    Parse { message: String, position: u64 },
}

impl DomError {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>, position: u64) -> Self {
        Self::Parse {
            message: message.into(),
            position,
        }
    }
}
