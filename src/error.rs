//! Physics Error Types
//!
//! Unified error type for the basalt-physics kernel. Functions that can fail
//! (body/collidable lookup, constraint validation, configuration checks)
//! return `Result<T, PhysicsError>` instead of raw booleans or panicking.
//!
//! Hot-path precondition violations (inverted AABBs, non-finite velocities)
//! are caller bugs per the engine contract and are checked with
//! `debug_assert!` at the point of use rather than surfaced as errors.

use core::fmt;

/// Unified error type for physics operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhysicsError {
    /// Body id is out of range or refers to a removed body.
    InvalidBody {
        /// The invalid index that was provided
        index: u32,
        /// Current number of body slots in the space
        count: usize,
    },
    /// Collidable id is out of range or refers to a removed collidable.
    InvalidCollidable {
        /// The invalid index that was provided
        index: u32,
    },
    /// A constraint references a body or bone that does not exist.
    InvalidConstraint {
        /// Human-readable description of the problem
        reason: &'static str,
    },
    /// A zero-length direction or normal was provided where a unit vector is required.
    ZeroLengthVector {
        /// Context describing where the zero-length vector was encountered
        context: &'static str,
    },
    /// A body still owns collidables and cannot be removed.
    BodyStillReferenced {
        /// Number of collidables still attached
        collidables: usize,
    },
    /// Invalid configuration parameter.
    InvalidConfiguration {
        /// Description of the invalid configuration
        reason: &'static str,
    },
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBody { index, count } => {
                write!(f, "body id {index} out of range (slots={count})")
            }
            Self::InvalidCollidable { index } => {
                write!(f, "collidable id {index} does not exist")
            }
            Self::InvalidConstraint { reason } => {
                write!(f, "invalid constraint: {reason}")
            }
            Self::ZeroLengthVector { context } => {
                write!(f, "zero-length vector in {context}")
            }
            Self::BodyStillReferenced { collidables } => {
                write!(f, "body still owns {collidables} collidable(s)")
            }
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for PhysicsError {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = PhysicsError::InvalidBody { index: 5, count: 3 };
        let s = format!("{}", e);
        assert!(s.contains("5"), "Should contain index");
        assert!(s.contains("3"), "Should contain count");
    }

    #[test]
    fn test_error_debug() {
        let e = PhysicsError::ZeroLengthVector {
            context: "ray direction",
        };
        let s = format!("{:?}", e);
        assert!(s.contains("ZeroLengthVector"));
    }

    #[test]
    fn test_error_variants() {
        let e1 = PhysicsError::InvalidBody { index: 0, count: 0 };
        let e2 = PhysicsError::InvalidCollidable { index: 0 };
        let e3 = PhysicsError::InvalidConstraint {
            reason: "body A == body B",
        };
        let e4 = PhysicsError::BodyStillReferenced { collidables: 2 };
        assert_ne!(e1, e2);
        assert_ne!(e3, e4);
    }

    #[test]
    fn test_invalid_configuration() {
        let e = PhysicsError::InvalidConfiguration {
            reason: "jump_force_factor must be >= 0",
        };
        let s = format!("{}", e);
        assert!(s.contains("jump_force_factor"));
    }
}
