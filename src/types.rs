//! Shared identifiers.

use std::fmt;

/// Index of a listen capture handle within the relay's handle set.
///
/// The NAT table stores `HandleId`s rather than handle references, so a
/// recorded flow can never outlive the runtime that owns the handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub usize);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listen#{}", self.0)
    }
}
