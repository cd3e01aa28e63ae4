//! Kernscope Core - kernel state introspection for halted RTOS targets.
//!
//! This crate reconstructs the scheduler's view of a halted target (threads,
//! virtual timers, the context switch trace and kernel globals) through a
//! narrow [`TargetChannel`] that only evaluates expressions and reads memory.

pub mod channel;
pub mod codec;
pub mod error;
pub mod kernel;
pub mod layout;
#[cfg(feature = "hardware")]
pub mod probe;
pub mod report;
pub mod sim;
pub mod symbols;

// Re-export commonly used types
pub use channel::{Address, ChannelError, Expression, MemoryBlock, TargetChannel, WordSize};
pub use codec::{format_hex, parse_number, parse_word, FormatError, HexWidth};
pub use error::{IntegrityViolation, IntrospectError};
pub use kernel::{scan_unused, state_label, IntrospectorConfig, KernelIntrospector};
pub use layout::KernelLayout;
#[cfg(feature = "hardware")]
pub use probe::{open_session, ExecutionState, ProbeChannel};
pub use report::{
    ContextSwitch, CurrentThread, Field, GlobalSnapshot, Nesting, PanicMessage, Report, StackUsage,
    ThreadName, ThreadRecord, ThreadReport, TimerRecord, TimerReport, TraceEvent, TraceReport,
};
pub use sim::{SimThread, SimulatedTarget};
pub use symbols::SymbolTable;
