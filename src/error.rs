//! Physics Error Types
//!
//! Unified error type for the impulse2d pipeline. Functions that can fail
//! (handle lookup, world mutation during a step, malformed definitions)
//! return `Result<T, PhysicsError>` instead of raw booleans or panicking.

use core::fmt;

/// Unified error type for physics operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhysicsError {
    /// A body, fixture, joint, or contact handle is stale or foreign.
    StaleHandle {
        /// What kind of handle failed to resolve
        kind: &'static str,
    },
    /// The world is mid-step; structural mutation is not allowed from
    /// callbacks.
    WorldLocked,
    /// A zero-length direction or normal was provided where a unit vector
    /// is required.
    ZeroLengthVector {
        /// Context describing where the zero-length vector was encountered
        context: &'static str,
    },
    /// Invalid definition or configuration parameter.
    InvalidConfiguration {
        /// Description of the invalid configuration
        reason: &'static str,
    },
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleHandle { kind } => write!(f, "stale {kind} handle"),
            Self::WorldLocked => write!(f, "world is locked during step"),
            Self::ZeroLengthVector { context } => {
                write!(f, "zero-length vector in {context}")
            }
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PhysicsError {}
