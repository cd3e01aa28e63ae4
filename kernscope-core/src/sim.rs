//! An in-memory target running a fake kernel image.
//!
//! [`SimulatedTarget`] lays out kernel structures with the same
//! [`KernelLayout`] the probe channel uses and answers expressions from its
//! own byte memory. Failures can be injected per expression or per address,
//! and every request is counted.

use crate::channel::{Address, ChannelError, Expression, MemoryBlock, TargetChannel, WordSize};
use crate::kernel::names;
use crate::layout::{read_words, KernelLayout, TargetMemory};
use crate::symbols::SymbolTable;
use std::collections::{BTreeMap, HashSet};

const REGISTRY_ADDR: u32 = 0x2000_0100;
const TIMER_LIST_ADDR: u32 = 0x2000_0200;
const TRACE_ADDR: u32 = 0x2000_0400;
const PANIC_ADDR: u32 = 0x2000_0300;
const ISR_ADDR: u32 = 0x2000_0304;
const LOCK_ADDR: u32 = 0x2000_0308;
const HEAP_START: u32 = 0x2000_4000;
const STACK_FILL: u32 = 0x5555_5555;

#[derive(Debug, Default)]
struct SimMemory(BTreeMap<u32, u8>);

impl TargetMemory for SimMemory {
    fn read_bytes(&mut self, address: Address, buf: &mut [u8]) -> Result<(), ChannelError> {
        for (offset, byte) in (0u32..).zip(buf.iter_mut()) {
            let at = address.value().wrapping_add(offset);
            *byte = *self.0.get(&at).ok_or_else(|| ChannelError::ReadMemory {
                address: Address::new(at),
                reason: "unmapped".to_string(),
            })?;
        }
        Ok(())
    }
}

/// Description of a thread to place in the simulated registry.
#[derive(Debug, Clone)]
pub struct SimThread {
    pub name: Option<String>,
    pub priority: u32,
    pub state: u8,
    pub flags: u8,
    pub refs: u8,
    pub time: u32,
    pub wait_object: u32,
    /// Stack area in bytes; filled with the stack pattern on creation.
    pub stack_size: u32,
    /// Bytes at the top of the stack already overwritten.
    pub stack_used: u32,
}

impl SimThread {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }
}

impl Default for SimThread {
    fn default() -> Self {
        Self {
            name: None,
            priority: 64,
            state: 0,
            flags: 0,
            refs: 1,
            time: 0,
            wait_object: 0,
            stack_size: 256,
            stack_used: 64,
        }
    }
}

/// A halted (or running) target with a ChibiOS-like kernel in memory.
#[derive(Debug)]
pub struct SimulatedTarget {
    memory: SimMemory,
    symbols: SymbolTable,
    layout: KernelLayout,
    running: bool,
    hex_answers: bool,
    failing: HashSet<String>,
    failing_reads: HashSet<u32>,
    requests: usize,
    heap: u32,
}

impl Default for SimulatedTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTarget {
    /// A target with no kernel symbols at all.
    pub fn new() -> Self {
        Self::with_layout(KernelLayout::default())
    }

    pub fn with_layout(layout: KernelLayout) -> Self {
        Self {
            memory: SimMemory::default(),
            symbols: SymbolTable::new(),
            layout,
            running: false,
            hex_answers: false,
            failing: HashSet::new(),
            failing_reads: HashSet::new(),
            requests: 0,
            heap: HEAP_START,
        }
    }

    /// A target with an initialised kernel: empty registry, empty timer
    /// list, system time zero and the debug counters enabled.
    pub fn with_kernel() -> Self {
        Self::with_kernel_layout(KernelLayout::default())
    }

    /// Like [`Self::with_kernel`], with structures placed by `layout`.
    pub fn with_kernel_layout(layout: KernelLayout) -> Self {
        let mut target = Self::with_layout(layout);
        target.define_symbol(names::REGISTRY, REGISTRY_ADDR);
        target.define_symbol(names::TIMER_LIST, TIMER_LIST_ADDR);
        target.define_symbol("dbg_panic_msg", PANIC_ADDR);
        target.define_symbol("dbg_isr_cnt", ISR_ADDR);
        target.define_symbol("dbg_lock_cnt", LOCK_ADDR);

        let registry = Address::new(REGISTRY_ADDR);
        target.write_field("ReadyList", registry, "r_newer", REGISTRY_ADDR);
        target.write_field("ReadyList", registry, "r_older", REGISTRY_ADDR);
        target.write_field("ReadyList", registry, "r_current", 0);
        target.write_field("ReadyList", registry, "r_preempt", 0);

        let timers = Address::new(TIMER_LIST_ADDR);
        target.write_field("VTList", timers, "vt_next", TIMER_LIST_ADDR);
        target.write_field("VTList", timers, "vt_prev", TIMER_LIST_ADDR);
        target.write_field("VTList", timers, "vt_time", u32::MAX);
        target.write_field("VTList", timers, "vt_systime", 0);

        target.write_word(PANIC_ADDR, 0);
        target.write_word(ISR_ADDR, 0);
        target.write_word(LOCK_ADDR, 0);
        target
    }

    pub const fn registry() -> Address {
        Address::new(REGISTRY_ADDR)
    }

    pub const fn timer_list() -> Address {
        Address::new(TIMER_LIST_ADDR)
    }

    pub fn layout(&self) -> &KernelLayout {
        &self.layout
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Answer expressions in `0x` hex instead of decimal.
    pub fn set_hex_answers(&mut self, hex: bool) {
        self.hex_answers = hex;
    }

    /// Make every evaluation of `expression` fail.
    pub fn fail_on(&mut self, expression: &Expression) {
        self.failing.insert(expression.to_string());
    }

    /// Make block reads starting at `address` fail.
    pub fn fail_reads_at(&mut self, address: Address) {
        self.failing_reads.insert(address.value());
    }

    /// Number of `evaluate` and `read_memory` calls served so far.
    pub const fn request_count(&self) -> usize {
        self.requests
    }

    pub fn define_symbol(&mut self, name: &str, address: u32) {
        self.symbols.insert(name, u64::from(address));
    }

    pub fn write_bytes(&mut self, address: u32, bytes: &[u8]) {
        for (offset, byte) in (0u32..).zip(bytes) {
            self.memory.0.insert(address + offset, *byte);
        }
    }

    pub fn write_word(&mut self, address: u32, value: u32) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    /// Write `value` into `field` of the `ty` struct at `base`, truncated to
    /// the field width.
    ///
    /// Panics if the layout does not describe the field.
    pub fn write_field(&mut self, ty: &str, base: Address, field: &str, value: u32) {
        let layout = &self.layout.structs[ty].fields[field];
        let (offset, size) = (layout.offset, layout.size as usize);
        self.write_bytes(base.value() + offset, &value.to_le_bytes()[..size]);
    }

    /// Reserve zeroed memory, word aligned.
    pub fn allocate(&mut self, size: u32) -> Address {
        let address = self.heap;
        self.heap += size.next_multiple_of(4);
        self.write_bytes(address, &vec![0; size as usize]);
        Address::new(address)
    }

    /// Store a NUL-terminated string and return its address.
    ///
    /// At least 32 bytes are reserved so fixed-length string reads stay mapped.
    pub fn allocate_string(&mut self, text: &str) -> Address {
        let size = u32::try_from(text.len() + 1).unwrap_or(u32::MAX).max(32);
        let address = self.allocate(size);
        self.write_bytes(address.value(), text.as_bytes());
        address
    }

    /// Append a thread at the newest end of the registry.
    pub fn add_thread(&mut self, thread: &SimThread) -> Address {
        let size = self.layout.structs["Thread"].size;
        let tcb = self.allocate(size);

        let stack = self.allocate(thread.stack_size);
        for offset in (0..thread.stack_size).step_by(4) {
            self.write_word(stack.value() + offset, STACK_FILL);
        }
        let sp = stack.value() + thread.stack_size - thread.stack_used;
        for offset in (sp..stack.value() + thread.stack_size).step_by(4) {
            self.write_word(offset, 0xDEAD_BEEF);
        }

        let name = thread
            .name
            .as_deref()
            .map_or(0, |name| self.allocate_string(name).value());

        let registry = Address::new(REGISTRY_ADDR);
        let newest = self.read_field("Thread", registry, "p_older");
        self.write_field("Thread", tcb, "p_newer", REGISTRY_ADDR);
        self.write_field("Thread", tcb, "p_older", newest);
        self.write_field("Thread", Address::new(newest), "p_newer", tcb.value());
        self.write_field("Thread", registry, "p_older", tcb.value());

        self.write_field("Thread", tcb, "p_prio", thread.priority);
        for field in names::THREAD_STACK_POINTER {
            if self.layout.structs["Thread"].fields.contains_key(field) {
                self.write_field("Thread", tcb, field, sp);
            }
        }
        self.write_field("Thread", tcb, "p_name", name);
        self.write_field("Thread", tcb, "p_stklimit", stack.value());
        self.write_field("Thread", tcb, "p_state", u32::from(thread.state));
        self.write_field("Thread", tcb, "p_flags", u32::from(thread.flags));
        self.write_field("Thread", tcb, "p_refs", u32::from(thread.refs));
        self.write_field("Thread", tcb, "p_time", thread.time);
        self.write_field("Thread", tcb, "p_u.wtobjp", thread.wait_object);
        tcb
    }

    /// Append a timer at the end of the delta list.
    pub fn add_timer(&mut self, delta: u32, callback: u32, parameter: u32) -> Address {
        let size = self.layout.structs["VirtualTimer"].size;
        let timer = self.allocate(size);
        let head = Address::new(TIMER_LIST_ADDR);
        let last = self.read_field("VirtualTimer", head, "vt_prev");

        self.write_field("VirtualTimer", timer, "vt_next", TIMER_LIST_ADDR);
        self.write_field("VirtualTimer", timer, "vt_prev", last);
        self.write_field("VirtualTimer", Address::new(last), "vt_next", timer.value());
        self.write_field("VirtualTimer", head, "vt_prev", timer.value());

        self.write_field("VirtualTimer", timer, "vt_time", delta);
        self.write_field("VirtualTimer", timer, "vt_func", callback);
        self.write_field("VirtualTimer", timer, "vt_par", parameter);
        timer
    }

    pub fn set_system_time(&mut self, ticks: u32) {
        self.write_field("VTList", Address::new(TIMER_LIST_ADDR), "vt_systime", ticks);
    }

    pub fn set_current_thread(&mut self, tcb: Address) {
        self.write_field("ReadyList", Address::new(REGISTRY_ADDR), "r_current", tcb.value());
    }

    pub fn set_preemption(&mut self, value: u32) {
        self.write_field("ReadyList", Address::new(REGISTRY_ADDR), "r_preempt", value);
    }

    pub fn set_panic_message(&mut self, message: Option<&str>) {
        let pointer = message.map_or(0, |text| self.allocate_string(text).value());
        self.write_word(PANIC_ADDR, pointer);
    }

    pub fn set_isr_count(&mut self, count: u32) {
        self.write_word(ISR_ADDR, count);
    }

    pub fn set_lock_count(&mut self, count: u32) {
        self.write_word(LOCK_ADDR, count);
    }

    /// Create an empty trace buffer with `slots` event records.
    pub fn enable_trace(&mut self, slots: u32) -> Address {
        self.define_symbol("dbg_trace_buffer", TRACE_ADDR);
        let base = Address::new(TRACE_ADDR);
        let slot_size = self.layout.structs[names::TRACE_EVENT].size;
        let start = TRACE_ADDR + self.layout.structs["ch_trace_buffer_t"].fields["tb_buffer"].offset;
        self.write_bytes(start, &vec![0; (slots * slot_size) as usize]);
        self.write_field("ch_trace_buffer_t", base, "tb_size", slots);
        self.write_field("ch_trace_buffer_t", base, "tb_ptr", start);
        Address::new(start)
    }

    /// Record a context switch at the write cursor and advance it.
    pub fn record_switch(&mut self, time: u32, thread: Address, wait_object: u32, state: u8) {
        let base = Address::new(TRACE_ADDR);
        let slot_size = self.layout.structs[names::TRACE_EVENT].size;
        let start = TRACE_ADDR + self.layout.structs["ch_trace_buffer_t"].fields["tb_buffer"].offset;
        let slots = self.read_field("ch_trace_buffer_t", base, "tb_size");
        let cursor = Address::new(self.read_field("ch_trace_buffer_t", base, "tb_ptr"));

        self.write_field(names::TRACE_EVENT, cursor, "se_time", time);
        self.write_field(names::TRACE_EVENT, cursor, "se_tp", thread.value());
        self.write_field(names::TRACE_EVENT, cursor, "se_wtobjp", wait_object);
        self.write_field(names::TRACE_EVENT, cursor, "se_state", u32::from(state));

        let mut next = cursor.value() + slot_size;
        if next >= start + slots * slot_size {
            next = start;
        }
        self.write_field("ch_trace_buffer_t", base, "tb_ptr", next);
    }

    /// Read a field back; panics if it is unmapped.
    pub fn read_field(&mut self, ty: &str, base: Address, field: &str) -> u32 {
        let layout = &self.layout.structs[ty].fields[field];
        let mut buf = [0u8; 4];
        let size = layout.size as usize;
        let address = Address::new(base.value() + layout.offset);
        self.memory
            .read_bytes(address, &mut buf[..size])
            .unwrap_or_else(|e| panic!("simulated read of {ty}.{field}: {e}"));
        u32::from_le_bytes(buf)
    }
}

impl TargetChannel for SimulatedTarget {
    fn evaluate(&mut self, expression: &Expression) -> Result<String, ChannelError> {
        self.requests += 1;
        if self.failing.contains(&expression.to_string()) {
            return Err(ChannelError::evaluate(expression, "injected failure"));
        }
        let value = self.layout.evaluate(expression, &self.symbols, &mut self.memory)?;
        Ok(if self.hex_answers {
            format!("0x{value:x}")
        } else {
            value.to_string()
        })
    }

    fn read_memory(
        &mut self,
        address: Address,
        word_size: WordSize,
        count: u32,
    ) -> Result<MemoryBlock, ChannelError> {
        self.requests += 1;
        if self.failing_reads.contains(&address.value()) {
            return Err(ChannelError::ReadMemory {
                address,
                reason: "injected failure".to_string(),
            });
        }
        read_words(&mut self.memory, address, word_size, count)
    }

    fn is_target_running(&mut self) -> bool {
        self.running
    }
}
