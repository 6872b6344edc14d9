use thiserror::Error;

macro_rules! invalid_state_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvalidState {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidState {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all failure conditions of capability resolution, capability-set
/// algebra and demand evaluation. Each variant provides specific context about the
/// failure mode to enable appropriate error handling.
///
/// # Error Categories
///
/// ## Expected Outcomes
/// - [`Error::DemandDenied`] - The normal outcome of a failed demand; carries the
///   faulting capability and the effective sets for diagnostics
///
/// ## Contract Violations
/// - [`Error::IncompatibleComparison`] - Two capability instances of different types
///   were compared
/// - [`Error::UnresolvedCapability`] - A capability type could not be interned
///
/// ## Internal Consistency
/// - [`Error::InvalidState`] - An evaluator invariant was broken; a defect in the
///   engine itself, never a user-facing condition
/// - [`Error::LockError`] - Thread synchronization failure in the token registry
///
/// # Examples
///
/// ```rust
/// use caswalk::{Error, SecurityContext};
/// use caswalk::capability::{CapabilityRc, SecurityCapability};
/// use std::sync::Arc;
///
/// let ctx = SecurityContext::new();
/// let cap: CapabilityRc = Arc::new(SecurityCapability::execution());
///
/// // A demand against an empty stack trivially succeeds
/// match ctx.demand(cap.as_ref(), std::iter::empty()) {
///     Ok(()) => {}
///     Err(Error::DemandDenied { demanded, .. }) => {
///         eprintln!("denied: {}", demanded);
///     }
///     Err(e) => eprintln!("error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A capability type could not be classified and interned.
    ///
    /// Fatal to the specific resolution call, not to the process. The most
    /// likely cause is token-index exhaustion, which cannot occur in any
    /// realistic workload.
    #[error("Failed to resolve capability type - {0}")]
    UnresolvedCapability(String),

    /// A demand walked the stack and found a frame that does not hold the
    /// demanded capability.
    ///
    /// This is the normal, expected outcome of a failed demand; it is always
    /// surfaced to the caller and never silently swallowed.
    ///
    /// # Fields
    ///
    /// * `demanded` - Rendering of the faulting capability
    /// * `granted` - Rendering of the grant set in effect at the faulting frame, if available
    /// * `refused` - Rendering of the refused set in effect at the faulting frame, if available
    #[error("Demand for {demanded} was denied")]
    DemandDenied {
        /// The capability that could not be satisfied
        demanded: String,
        /// The grant set in effect at the frame that failed the demand
        granted: Option<String>,
        /// The refused set in effect at the frame that failed the demand
        refused: Option<String>,
    },

    /// Two capability instances of different types were compared.
    ///
    /// Comparing instances of different capability types is a contract
    /// violation. At the well-defined tolerant check points inside a demand
    /// walk this error is caught and converted to a conservative boolean; from
    /// the general-purpose algebra entry points (`union`, `intersect`,
    /// `is_subset_of` called directly) it propagates verbatim.
    #[error("Incompatible capability comparison - {left} vs {right}")]
    IncompatibleComparison {
        /// Qualified name of the left-hand capability type
        left: String,
        /// Qualified name of the right-hand capability type
        right: String,
    },

    /// An internal consistency invariant of the evaluator was broken.
    ///
    /// For example an unrestricted Assert coexisting with a non-empty Refused
    /// set in one stack segment. This is a defect in the evaluator, not a user
    /// error: debug builds assert, release builds fail closed (the demand is
    /// denied). The error includes the source location where the broken
    /// invariant was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the broken invariant
    /// * `file` - Source file in which the violation was detected
    /// * `line` - Source line in which the violation was detected
    #[error("Invalid state - {file}:{line}: {message}")]
    InvalidState {
        /// The message to be printed for the InvalidState error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically when the
    /// token registry's interning lock was poisoned by a panicking thread.
    #[error("Failed to lock target")]
    LockError,
}
