//! Construction errors for rendered trees and patches.
//!
//! These are local faults. Callers log them; they never reach the wire.

/// A node or patch that cannot be built from its inputs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructionError {
    /// `len(statics)` must be exactly `len(dynamics) + 1`.
    #[error("expected {expected} statics for {dynamics} dynamics, got {statics}")]
    LengthMismatch {
        /// Number of statics supplied.
        statics: usize,
        /// Number of dynamics supplied.
        dynamics: usize,
        /// Number of statics required.
        expected: usize,
    },

    /// A wire object is missing a required key.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A wire value has a type that no slot or patch can hold.
    #[error("invalid {context}: {detail}")]
    InvalidValue {
        /// What was being decoded.
        context: &'static str,
        /// What was wrong with it.
        detail: String,
    },

    /// A value patch was applied with no previous node.
    #[error("value patch has no base node to apply to")]
    MissingBase,

    /// A value patch has a different slot count from its base.
    #[error("value patch has {found} entries, base node has {expected} dynamics")]
    SlotCount {
        /// Dynamics in the base node.
        expected: usize,
        /// Entries in the patch.
        found: usize,
    },

    /// A nested or list delta targets a slot of another shape.
    #[error("cannot apply {delta} delta to {slot} slot")]
    ShapeMismatch {
        /// Kind of delta.
        delta: &'static str,
        /// Kind of slot it was applied to.
        slot: &'static str,
    },
}

impl ConstructionError {
    /// Build an [`InvalidValue`](Self::InvalidValue) error.
    pub fn invalid(context: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidValue {
            context,
            detail: detail.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ConstructionError>;
