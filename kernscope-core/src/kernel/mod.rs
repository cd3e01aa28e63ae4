//! Kernel state introspection.
//!
//! Reconstructs threads, timers, the context switch trace and a handful of
//! kernel globals from a halted target using only expression evaluation and
//! block reads. Nothing is cached: every call walks target memory again.

mod globals;
mod list;
pub mod names;
mod stack;
mod threads;
mod timers;
mod trace;

pub use stack::scan_unused;

use crate::channel::{Address, Expression, TargetChannel, WordSize};
use crate::codec::parse_word;
use crate::error::{IntrospectError, Result};
use crate::report::{Field, ThreadName};
use serde::{Deserialize, Serialize};

/// Thread state names, indexed by the kernel's state number.
pub const THREAD_STATES: [&str; 15] = [
    "READY",
    "CURRENT",
    "SUSPENDED",
    "WTSEM",
    "WTMTX",
    "WTCOND",
    "SLEEPING",
    "WTEXIT",
    "WTOREVT",
    "WTANDEVT",
    "SNDMSGQ",
    "SNDMSG",
    "WTMSG",
    "WTQUEUE",
    "FINAL",
];

/// Label for a thread state number, `"unknown"` when out of range.
pub fn state_label(state: u32) -> &'static str {
    usize::try_from(state)
        .ok()
        .and_then(|i| THREAD_STATES.get(i))
        .copied()
        .unwrap_or("unknown")
}

/// Tunables for the read operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrospectorConfig {
    /// Nodes a circular list may hold before it is declared corrupt.
    pub max_list_nodes: usize,
    /// Slots a trace buffer may claim before it is declared corrupt.
    pub max_trace_events: u32,
    /// Word the kernel writes over unused stack.
    pub stack_fill_pattern: u32,
    /// Largest stack a thread may claim before it is left unscanned.
    pub max_stack_bytes: u32,
    pub thread_name_len: u32,
    pub panic_message_len: u32,
}

impl Default for IntrospectorConfig {
    fn default() -> Self {
        Self {
            max_list_nodes: 1024,
            max_trace_events: 4096,
            stack_fill_pattern: 0x5555_5555,
            max_stack_bytes: 64 * 1024,
            thread_name_len: 16,
            panic_message_len: 32,
        }
    }
}

impl IntrospectorConfig {
    /// Load a configuration from JSON; absent keys keep their defaults.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Reads kernel state through a [`TargetChannel`].
///
/// Each read returns `Ok(None)` when the target is executing, since memory
/// cannot be observed consistently until it halts.
pub struct KernelIntrospector<C> {
    channel: C,
    config: IntrospectorConfig,
}

impl<C: TargetChannel> KernelIntrospector<C> {
    pub fn new(channel: C) -> Self {
        Self::with_config(channel, IntrospectorConfig::default())
    }

    pub const fn with_config(channel: C, config: IntrospectorConfig) -> Self {
        Self { channel, config }
    }

    pub const fn config(&self) -> &IntrospectorConfig {
        &self.config
    }

    pub const fn channel(&self) -> &C {
        &self.channel
    }

    fn halted(&mut self) -> bool {
        if self.channel.is_target_running() {
            log::debug!("Target is running, kernel read deferred");
            return false;
        }
        true
    }

    /// Evaluate a mandatory value.
    fn fetch(&mut self, expression: &Expression) -> Result<u32> {
        let text = self.channel.evaluate(expression)?;
        Ok(parse_word(&text)?)
    }

    fn fetch_address(&mut self, expression: &Expression) -> Result<Address> {
        self.fetch(expression).map(Address::new)
    }

    /// Evaluate a value that may be compiled out of the kernel.
    ///
    /// Channel failures become [`Field::Missing`]; unparsable answers still fail.
    fn fetch_optional(&mut self, expression: &Expression) -> Result<Field<u32>> {
        let answer = self
            .channel
            .evaluate(expression)
            .inspect_err(|e| log::warn!("Optional field unavailable: {e}"));
        match Field::from(answer) {
            Field::Present(text) => Ok(Field::Present(parse_word(&text)?)),
            Field::Missing => Ok(Field::Missing),
        }
    }

    /// Evaluate the first value of an operation; a channel failure there
    /// means the structure is not present in the target image.
    fn fetch_anchor(&mut self, expression: &Expression, what: &str) -> Result<u32> {
        self.fetch(expression).map_err(|e| match e {
            IntrospectError::Channel(cause) => {
                log::debug!("Anchor {expression} unavailable: {cause}");
                IntrospectError::TargetNotFound(what.to_string())
            }
            other => other,
        })
    }

    fn read_c_string(&mut self, address: Address, max_len: u32) -> Result<String> {
        let block = self.channel.read_memory(address, WordSize::Byte, max_len)?;
        Ok(block.c_string())
    }

    /// Name of the thread whose control block is at `tcb`.
    fn thread_name(&mut self, tcb: Address) -> Result<Field<ThreadName>> {
        let pointer = self.fetch_optional(&Expression::member(names::THREAD, tcb, names::THREAD_NAME))?;
        let Field::Present(pointer) = pointer else {
            return Ok(Field::Missing);
        };
        if pointer == 0 {
            return Ok(Field::Present(ThreadName::Unnamed));
        }
        let max_len = self.config.thread_name_len;
        match self.read_c_string(Address::new(pointer), max_len) {
            Ok(name) => Ok(Field::Present(ThreadName::Named(name))),
            Err(e) => {
                log::warn!("Thread name at {} unreadable: {e}", tcb.hex());
                Ok(Field::Missing)
            }
        }
    }
}
