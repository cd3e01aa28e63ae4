use super::names::{
    EVENT_STATE, EVENT_THREAD, EVENT_TIME, EVENT_WAIT_OBJECT, TRACE_CURSOR, TRACE_EVENT, TRACE_SIZE,
    TRACE_SLOTS,
};
use super::{state_label, KernelIntrospector};
use crate::channel::{Address, Expression, TargetChannel};
use crate::error::{IntegrityViolation, IntrospectError, Result};
use crate::report::{Report, TraceEvent, TraceReport};

const STRUCTURE: &str = "trace buffer";

impl<C: TargetChannel> KernelIntrospector<C> {
    /// Read the context switch ring buffer, oldest event first.
    ///
    /// Keys run from `-(size - 1)` for the oldest slot to `0` for the most
    /// recent one. Slots that were never written are skipped but still
    /// consume an index.
    pub fn read_trace_buffer(&mut self) -> Result<Option<TraceReport>> {
        if !self.halted() {
            return Ok(None);
        }

        let size = self.fetch_anchor(&Expression::Global(TRACE_SIZE), STRUCTURE)?;
        if size == 0 {
            return Ok(Some(Report::new(Vec::new())));
        }
        let limit = self.config.max_trace_events;
        if size > limit {
            return Err(IntrospectError::integrity(
                STRUCTURE,
                IntegrityViolation::Oversized { size, limit },
            ));
        }

        let record_size = self.fetch(&Expression::SizeOf(TRACE_EVENT))?;
        if record_size == 0 {
            return Err(IntrospectError::integrity(STRUCTURE, IntegrityViolation::ZeroRecordSize));
        }
        let base = self.fetch_address(&Expression::Global(TRACE_SLOTS))?;
        let end = self.fetch_address(&Expression::ElementAddress {
            array: TRACE_SLOTS,
            index: size,
        })?;
        let mut cursor = self.fetch_address(&Expression::Global(TRACE_CURSOR))?;
        if cursor < base || cursor >= end {
            return Err(IntrospectError::integrity(
                STRUCTURE,
                IntegrityViolation::CursorOutOfRange { cursor, base, end },
            ));
        }
        if (cursor.value() - base.value()) % record_size != 0 {
            return Err(IntrospectError::integrity(
                STRUCTURE,
                IntegrityViolation::MisalignedCursor {
                    cursor,
                    base,
                    record_size,
                },
            ));
        }
        log::debug!(
            "Trace buffer: {size} slots of {record_size} bytes at {}, cursor {}",
            base.hex(),
            cursor.hex()
        );

        // The cursor points at the next slot to be written, which is also the
        // oldest one still holding an event.
        let mut entries = Vec::new();
        for index in (1 - i64::from(size))..=0 {
            let slot = move |name| Expression::member(TRACE_EVENT, cursor, name);
            let thread = self.fetch_address(&slot(EVENT_THREAD))?;
            if !thread.is_null() {
                let state = self.fetch(&slot(EVENT_STATE))?;
                let event = TraceEvent {
                    timestamp: self.fetch(&slot(EVENT_TIME))?,
                    thread,
                    wait_object: self.fetch_address(&slot(EVENT_WAIT_OBJECT))?,
                    state,
                    state_label: state_label(state),
                };
                entries.push((index, event));
            }

            cursor = cursor
                .checked_add(record_size)
                .filter(|&next| next < end)
                .unwrap_or(base);
        }
        Ok(Some(Report::new(entries)))
    }
}
