//! Kernel symbols, types and fields the introspector relies on.
//!
//! These match ChibiOS/RT 2.x built with the registry, debug and trace
//! options enabled. Struct offsets live in [`crate::layout::KernelLayout`].

pub const REGISTRY: &str = "rlist";
pub const THREAD: &str = "Thread";
pub const THREAD_NEWER: &str = "p_newer";
pub const THREAD_OLDER: &str = "p_older";
pub const THREAD_STACK_LIMIT: &str = "p_stklimit";
/// Saved stack pointer; older ports name it `r13`, newer ones `sp`.
pub const THREAD_STACK_POINTER: [&str; 2] = ["p_ctx.r13", "p_ctx.sp"];
pub const THREAD_NAME: &str = "p_name";
pub const THREAD_STATE: &str = "p_state";
pub const THREAD_FLAGS: &str = "p_flags";
pub const THREAD_PRIORITY: &str = "p_prio";
pub const THREAD_REFS: &str = "p_refs";
pub const THREAD_TIME: &str = "p_time";
pub const THREAD_WAIT_OBJECT: &str = "p_u.wtobjp";

pub const TIMER_LIST: &str = "vtlist";
pub const TIMER: &str = "VirtualTimer";
pub const TIMER_NEXT: &str = "vt_next";
pub const TIMER_PREV: &str = "vt_prev";
pub const TIMER_DELTA: &str = "vt_time";
pub const TIMER_CALLBACK: &str = "vt_func";
pub const TIMER_PARAMETER: &str = "vt_par";

pub const TRACE_SIZE: &str = "dbg_trace_buffer.tb_size";
pub const TRACE_CURSOR: &str = "dbg_trace_buffer.tb_ptr";
pub const TRACE_SLOTS: &str = "dbg_trace_buffer.tb_buffer";
pub const TRACE_EVENT: &str = "ch_swc_event_t";
pub const EVENT_TIME: &str = "se_time";
pub const EVENT_THREAD: &str = "se_tp";
pub const EVENT_WAIT_OBJECT: &str = "se_wtobjp";
pub const EVENT_STATE: &str = "se_state";

pub const SYSTEM_TIME: &str = "vtlist.vt_systime";
pub const CURRENT_THREAD: &str = "rlist.r_current";
pub const PREEMPTION: &str = "rlist.r_preempt";
pub const PANIC_MESSAGE: &str = "dbg_panic_msg";
pub const ISR_COUNT: &str = "dbg_isr_cnt";
pub const LOCK_COUNT: &str = "dbg_lock_cnt";
