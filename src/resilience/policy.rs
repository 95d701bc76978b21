use serde::{Deserialize, Serialize};

/// What a node loop does when an iteration fails with a recoverable error.
///
/// Fatal errors always stop the node; end-of-stream always ends it gracefully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Stop the node and report the error.
    #[default]
    Propagate,

    /// Drop the offending message, log it and keep iterating.
    Skip,
}
