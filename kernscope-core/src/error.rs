use crate::channel::{Address, ChannelError};
use crate::codec::FormatError;
use std::fmt;
use thiserror::Error;

/// Why a linked kernel structure was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// A link read from `node` was the null address.
    NullPointer { node: Address },
    /// `node`'s back link does not point at the node we came from.
    AsymmetricLink {
        node: Address,
        expected: Address,
        found: Address,
    },
    /// `node` was reached twice without passing through the list head.
    Revisited { node: Address },
    /// More than `limit` nodes were visited without returning to the head.
    Unbounded { limit: usize },
    /// The trace buffer claims more slots than `limit`.
    Oversized { size: u32, limit: u32 },
    /// The trace buffer reports a zero-sized event record.
    ZeroRecordSize,
    /// The trace write cursor lies outside the buffer.
    CursorOutOfRange { cursor: Address, base: Address, end: Address },
    /// The trace write cursor does not sit on a slot boundary.
    MisalignedCursor {
        cursor: Address,
        base: Address,
        record_size: u32,
    },
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullPointer { node } => write!(f, "NULL pointer at {}", node.hex()),
            Self::AsymmetricLink { node, expected, found } => write!(
                f,
                "double linked list violation at {}: back link {} instead of {}",
                node.hex(),
                found.hex(),
                expected.hex()
            ),
            Self::Revisited { node } => write!(f, "node {} visited twice", node.hex()),
            Self::Unbounded { limit } => write!(f, "list does not close after {limit} nodes"),
            Self::Oversized { size, limit } => write!(f, "{size} slots exceed the limit of {limit}"),
            Self::ZeroRecordSize => write!(f, "zero sized event record"),
            Self::CursorOutOfRange { cursor, base, end } => write!(
                f,
                "write cursor {} outside {}..{}",
                cursor.hex(),
                base.hex(),
                end.hex()
            ),
            Self::MisalignedCursor { cursor, base, record_size } => write!(
                f,
                "write cursor {} is not a multiple of {record_size} bytes past {}",
                cursor.hex(),
                base.hex()
            ),
        }
    }
}

/// Errors surfaced by the kernel read operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntrospectError {
    /// The kernel symbols are absent: the target is not running the expected image.
    #[error("{0} not found on target")]
    TargetNotFound(String),
    /// A linked structure failed its consistency checks.
    #[error("{structure} integrity check failed, {violation}")]
    TargetIntegrity {
        structure: &'static str,
        violation: IntegrityViolation,
    },
    #[error(transparent)]
    Format(#[from] FormatError),
    /// A mandatory field could not be fetched.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl IntrospectError {
    pub const fn integrity(structure: &'static str, violation: IntegrityViolation) -> Self {
        Self::TargetIntegrity {
            structure,
            violation,
        }
    }
}

pub type Result<T> = std::result::Result<T, IntrospectError>;
