//! The debugger-facing side of the introspector.
//!
//! A [`TargetChannel`] is whatever can answer expressions and block reads for
//! a halted target: a probe, a debugger console, or the in-memory simulator.
//! Adapters own all textual marshaling; the introspector only sees
//! [`Expression`] values going out and strings it parses coming back.

use crate::codec::{format_hex, HexWidth};
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// A 32-bit target address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(u32);

impl Address {
    pub const NULL: Self = Self(0);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `bytes` further on, or `None` past the end of the address space.
    pub const fn checked_add(self, bytes: u32) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// `0x`-prefixed, 8 digit uppercase rendering.
    pub fn hex(self) -> String {
        format!("0x{}", format_hex(u64::from(self.0), HexWidth::Dword))
    }
}

impl From<u32> for Address {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

/// A read request against target memory, expressed in kernel terms.
///
/// `Display` renders the C expression a source-level debugger would accept.
/// Every expression evaluates to a 32-bit unsigned value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    /// Address of a global symbol.
    AddressOf(&'static str),
    /// Value of a global or of a member of a global struct (`rlist.r_current`).
    Global(&'static str),
    /// Address of an element of an array member of a global.
    ElementAddress { array: &'static str, index: u32 },
    /// Size in bytes of a kernel type.
    SizeOf(&'static str),
    /// Member of a struct of type `ty` located at `base`.
    Member {
        ty: &'static str,
        base: Address,
        field: &'static str,
    },
}

impl Expression {
    pub const fn member(ty: &'static str, base: Address, field: &'static str) -> Self {
        Self::Member { ty, base, field }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressOf(symbol) => write!(f, "(uint32_t)&{symbol}"),
            Self::Global(path) => write!(f, "(uint32_t){path}"),
            Self::ElementAddress { array, index } => write!(f, "(uint32_t)&{array}[{index}]"),
            Self::SizeOf(ty) => write!(f, "(uint32_t)sizeof ({ty})"),
            Self::Member { ty, base, field } => write!(f, "(uint32_t)(({ty} *){base})->{field}"),
        }
    }
}

/// Unit of a block memory read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSize {
    Byte,
    HalfWord,
    Word,
}

impl WordSize {
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::HalfWord => 2,
            Self::Word => 4,
        }
    }
}

/// Result of a block read: `words` holds one raw value per unit read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlock {
    pub address: Address,
    pub word_size: WordSize,
    pub words: Vec<u32>,
}

impl MemoryBlock {
    /// Printable rendering of a byte block, `.` for anything not printable.
    pub fn ascii(&self) -> String {
        self.words
            .iter()
            .map(|&w| match u8::try_from(w) {
                Ok(b) if b.is_ascii_graphic() || b == b' ' => char::from(b),
                _ => '.',
            })
            .collect()
    }

    /// The block interpreted as a NUL-terminated string (bytes only).
    pub fn c_string(&self) -> String {
        let bytes: Vec<u8> = self
            .words
            .iter()
            .map_while(|&w| u8::try_from(w).ok().filter(|&b| b != 0))
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Failure reported by a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("error evaluating the expression: '{expression}': {reason}")]
    Evaluate { expression: String, reason: String },
    #[error("error reading memory at {}: {reason}", .address.hex())]
    ReadMemory { address: Address, reason: String },
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("type '{ty}' has no field '{field}'")]
    UnknownField { ty: String, field: String },
}

impl ChannelError {
    pub fn evaluate(expression: &Expression, reason: impl fmt::Display) -> Self {
        Self::Evaluate {
            expression: expression.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Request/response access to a debug target.
///
/// Calls block until the target answers; implementations are never asked to
/// pipeline requests.
pub trait TargetChannel {
    /// Evaluate `expression` and return its value as text.
    fn evaluate(&mut self, expression: &Expression) -> Result<String, ChannelError>;

    /// Read `count` units of `word_size` starting at `address`.
    fn read_memory(
        &mut self,
        address: Address,
        word_size: WordSize,
        count: u32,
    ) -> Result<MemoryBlock, ChannelError>;

    /// Whether the target is executing. Memory is only read while halted.
    fn is_target_running(&mut self) -> bool;
}

impl<C: TargetChannel + ?Sized> TargetChannel for &mut C {
    fn evaluate(&mut self, expression: &Expression) -> Result<String, ChannelError> {
        (**self).evaluate(expression)
    }

    fn read_memory(
        &mut self,
        address: Address,
        word_size: WordSize,
        count: u32,
    ) -> Result<MemoryBlock, ChannelError> {
        (**self).read_memory(address, word_size, count)
    }

    fn is_target_running(&mut self) -> bool {
        (**self).is_target_running()
    }
}
