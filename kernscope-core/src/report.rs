//! Records produced by the kernel read operations.
//!
//! Every read builds a fresh [`Report`]; entries keep discovery order and the
//! report is never modified afterwards.

use crate::channel::Address;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// Ordered, immutable key to record mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report<K, V> {
    entries: Vec<(K, V)>,
}

impl<K: PartialEq, V> Report<K, V> {
    pub(crate) const fn new(entries: Vec<(K, V)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn first(&self) -> Option<(&K, &V)> {
        self.entries.first().map(|(k, v)| (k, v))
    }

    pub fn last(&self) -> Option<(&K, &V)> {
        self.entries.last().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Serialize, V: Serialize> Serialize for Report<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// A field that belongs to an optional kernel feature and may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<T> {
    Present(T),
    Missing,
}

impl<T> Field<T> {
    pub const fn as_ref(&self) -> Field<&T> {
        match self {
            Self::Present(v) => Field::Present(v),
            Self::Missing => Field::Missing,
        }
    }

    pub fn present(self) -> Option<T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Missing => None,
        }
    }

    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Self::Present(v) => Field::Present(f(v)),
            Self::Missing => Field::Missing,
        }
    }
}

impl<T, E> From<Result<T, E>> for Field<T> {
    fn from(result: Result<T, E>) -> Self {
        result.map_or(Self::Missing, Self::Present)
    }
}

impl<T: fmt::Display> fmt::Display for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present(v) => v.fmt(f),
            Self::Missing => f.write_str("-"),
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Present(v) => v.serialize(serializer),
            Self::Missing => serializer.serialize_none(),
        }
    }
}

/// Name of a thread; kernels allow threads without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadName {
    Named(String),
    Unnamed,
}

impl fmt::Display for ThreadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Unnamed => f.write_str("<no name>"),
        }
    }
}

impl Serialize for ThreadName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Unused stack space derived from the fill pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackUsage {
    /// Bytes between the stack limit and the first overwritten word.
    Unused(u32),
    /// The saved stack pointer lies below the stack limit.
    Overflow,
    /// Stack limit or pointer unavailable, or the scan failed.
    Unknown,
}

impl fmt::Display for StackUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unused(bytes) => bytes.fmt(f),
            Self::Overflow => f.write_str("overflow"),
            Self::Unknown => f.write_str("-"),
        }
    }
}

impl Serialize for StackUsage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unused(bytes) => serializer.serialize_u32(*bytes),
            Self::Overflow => serializer.serialize_str("overflow"),
            Self::Unknown => serializer.serialize_none(),
        }
    }
}

/// One thread control block from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadRecord {
    pub stack_limit: Field<Address>,
    pub stack_pointer: Field<Address>,
    pub unused_stack: StackUsage,
    pub name: Field<ThreadName>,
    pub state: u32,
    pub state_label: &'static str,
    pub flags: u32,
    pub priority: u32,
    pub ref_count: Field<u32>,
    pub cumulative_time: Field<u32>,
    pub wait_object: Field<Address>,
}

/// One pending timer from the delta list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerRecord {
    /// Ticks after the previous timer in the list expires.
    pub delta: u32,
    pub callback: Address,
    pub parameter: u32,
}

/// One context switch recorded in the trace buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub timestamp: u32,
    /// Thread switched in.
    pub thread: Address,
    /// Object the switched-out thread went to wait on.
    pub wait_object: Address,
    /// State the switched-out thread was left in.
    pub state: u32,
    pub state_label: &'static str,
}

pub type ThreadReport = Report<Address, ThreadRecord>;
pub type TimerReport = Report<Address, TimerRecord>;
pub type TraceReport = Report<i64, TraceEvent>;

impl TimerReport {
    /// Each timer with its absolute expiry, in ticks from now.
    pub fn deadlines(&self) -> impl Iterator<Item = (Address, u64, &TimerRecord)> {
        self.entries.iter().scan(0u64, |elapsed, (addr, timer)| {
            *elapsed += u64::from(timer.delta);
            Some((*addr, *elapsed, timer))
        })
    }
}

/// A trace event paired with the thread that was running before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextSwitch<'a> {
    pub index: i64,
    /// `None` for the oldest recorded event.
    pub previous: Option<Address>,
    pub event: &'a TraceEvent,
}

impl TraceReport {
    /// Events oldest first, each with the previously switched-in thread.
    pub fn switches(&self) -> impl Iterator<Item = ContextSwitch<'_>> {
        self.entries.iter().scan(None, |previous, (index, event)| {
            let switch = ContextSwitch {
                index: *index,
                previous: *previous,
                event,
            };
            *previous = Some(event.thread);
            Some(switch)
        })
    }
}

/// The thread the kernel considers current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentThread {
    pub address: Address,
    pub name: Field<ThreadName>,
}

impl fmt::Display for CurrentThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.is_null() {
            f.write_str("0")
        } else {
            write!(f, "{} \"{}\"", self.address.hex(), self.name)
        }
    }
}

/// Last panic message recorded by the kernel debug layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanicMessage {
    Message(String),
    Null,
    NotEnabled,
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => f.write_str(msg),
            Self::Null => f.write_str("<NULL>"),
            Self::NotEnabled => f.write_str("<not enabled>"),
        }
    }
}

/// State of a kernel nesting counter (ISR or lock).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nesting {
    Inside,
    Outside,
    NotEnabled,
}

impl Nesting {
    pub(crate) const fn from_count(count: u32) -> Self {
        if count == 0 {
            Self::Outside
        } else {
            Self::Inside
        }
    }

    fn describe(self, context: &str) -> String {
        match self {
            Self::Inside => format!("within {context}"),
            Self::Outside => format!("not within {context}"),
            Self::NotEnabled => "<not enabled>".to_string(),
        }
    }
}

/// Kernel global variables at the time of the read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSnapshot {
    pub system_time: u32,
    pub current_thread: Field<CurrentThread>,
    pub preemption: Field<u32>,
    pub panic_message: PanicMessage,
    pub isr_nesting: Nesting,
    pub lock_nesting: Nesting,
}

impl GlobalSnapshot {
    /// The snapshot as named values, labelled after the kernel variables.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("vt_systime", self.system_time.to_string()),
            ("r_current", self.current_thread.to_string()),
            ("r_preempt", self.preemption.to_string()),
            ("dbg_panic_msg", self.panic_message.to_string()),
            ("dbg_isr_cnt", self.isr_nesting.describe("ISR")),
            ("dbg_lock_cnt", self.lock_nesting.describe("lock")),
        ]
    }
}

impl Serialize for GlobalSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = self.entries();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (name, value) in &entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
