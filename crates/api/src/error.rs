//! Meshsync error types.

use crate::{ContentHash, LayerId, PeerId};
use std::sync::Arc;

/// A clonable trait-object inner error.
#[derive(Clone, Default)]
pub struct DynInnerError(
    pub Option<Arc<dyn std::error::Error + 'static + Send + Sync>>,
);

impl std::fmt::Debug for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            None => f.write_str("None"),
            Some(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for DynInnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.as_ref().map(|s| {
            let out: &(dyn std::error::Error + 'static) = &**s;
            out
        })
    }
}

impl DynInnerError {
    /// Construct a new DynInnerError from a source error.
    pub fn new<E: std::error::Error + 'static + Send + Sync>(e: E) -> Self {
        Self(Some(Arc::new(e)))
    }
}

/// What exactly was wrong with a validatable value.
///
/// This is kept structured so callers (and tests) can branch on the
/// violated bound without matching on strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A bounded collection or byte field holds more than allowed.
    ExceedsBound {
        /// The offending field.
        field: &'static str,
        /// The declared upper bound.
        max: usize,
        /// The observed size.
        observed: usize,
    },

    /// A fixed-size field has the wrong length.
    InvalidLength {
        /// The offending field.
        field: &'static str,
        /// The required length.
        expected: usize,
        /// The observed length.
        observed: usize,
    },

    /// A relation between fields does not hold.
    Invariant {
        /// The offending field.
        field: &'static str,
        /// Short description of the broken invariant.
        reason: &'static str,
    },

    /// An enumerated field carries an unknown value.
    Unknown {
        /// The offending field.
        field: &'static str,
        /// The raw value.
        value: i64,
    },

    /// The payload could not be decoded at all.
    Malformed {
        /// The type that was being decoded.
        field: &'static str,
    },

    /// Artifact data does not match the hash it was requested by.
    Integrity {
        /// The hash the data was requested by.
        hash: ContentHash,
    },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExceedsBound {
                field,
                max,
                observed,
            } => write!(f, "{field} exceeds bound {max} (observed {observed})"),
            Self::InvalidLength {
                field,
                expected,
                observed,
            } => write!(
                f,
                "{field} must be {expected} bytes (observed {observed})"
            ),
            Self::Invariant { field, reason } => {
                write!(f, "{field}: {reason}")
            }
            Self::Unknown { field, value } => {
                write!(f, "{field}: unknown value {value}")
            }
            Self::Malformed { field } => write!(f, "malformed {field}"),
            Self::Integrity { hash } => {
                write!(f, "data does not match hash {hash}")
            }
        }
    }
}

/// The meshsync error type.
///
/// This type is required to implement `Clone`: a single fetch result is
/// delivered to every caller waiting on the same content hash.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MsError {
    /// Malformed or out-of-bound input to a validatable type.
    #[error("bad request: {0}")]
    BadRequest(Violation),

    /// No peer had the artifact after all retries.
    #[error("artifact {hash} not found")]
    NotFound {
        /// The requested content hash.
        hash: ContentHash,
    },

    /// A peer sent a message that violates a bound or fails integrity.
    #[error("validation of message from {peer} failed: {violation}")]
    ValidationFailed {
        /// The misbehaving peer.
        peer: PeerId,
        /// What was wrong with the message.
        violation: Violation,
    },

    /// The round trip to a peer failed.
    #[error("transport failure with {peer}: {ctx} (src: {src})")]
    TransportFailure {
        /// The peer the round trip was made to.
        peer: PeerId,
        /// Any context associated with this error.
        ctx: Arc<str>,
        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },

    /// There are no more peers or retries left for the request.
    #[error("no peers left to fetch {hash} from")]
    Exhausted {
        /// The requested content hash.
        hash: ContentHash,
    },

    /// A fork search round did not produce a usable answer.
    #[error("fork search with {peer} inconclusive at round {round}: {reason}")]
    Inconclusive {
        /// The peer being searched against.
        peer: PeerId,
        /// The round that failed, starting at 1.
        round: u32,
        /// Why the round failed.
        reason: Arc<str>,
    },

    /// A local layer hash needed for comparison is not known.
    #[error("no local hash for layer {0}")]
    MissingLocalLayer(LayerId),

    /// The subsystem was shut down before the request completed.
    #[error("shut down")]
    Shutdown,

    /// Generic error, usually from a collaborator.
    #[error("{ctx} (src: {src})")]
    Other {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },
}

impl MsError {
    /// Construct a bad request error.
    pub fn bad_request(violation: Violation) -> Self {
        Self::BadRequest(violation)
    }

    /// Construct a transport failure without an inner source error.
    pub fn transport<C: std::fmt::Display>(peer: PeerId, ctx: C) -> Self {
        Self::TransportFailure {
            peer,
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }

    /// Construct a transport failure with an inner source error.
    pub fn transport_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        peer: PeerId,
        ctx: C,
        src: S,
    ) -> Self {
        Self::TransportFailure {
            peer,
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// Construct an "other" error with an inner source error.
    pub fn other_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// Construct an "other" error.
    pub fn other<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }

    /// Re-attribute a bad request to the peer that sent it.
    ///
    /// Decoding is peer agnostic and reports [MsError::BadRequest], a
    /// requester turns that into [MsError::ValidationFailed] for the peer
    /// it is talking to.
    pub fn blame(self, peer: &PeerId) -> Self {
        match self {
            Self::BadRequest(violation) => Self::ValidationFailed {
                peer: *peer,
                violation,
            },
            other => other,
        }
    }
}

/// The meshsync result type.
pub type MsResult<T> = Result<T, MsError>;
