use super::list::CircularList;
use super::names::{
    REGISTRY, THREAD, THREAD_FLAGS, THREAD_NEWER, THREAD_OLDER, THREAD_PRIORITY, THREAD_REFS,
    THREAD_STACK_LIMIT, THREAD_STACK_POINTER, THREAD_STATE, THREAD_TIME, THREAD_WAIT_OBJECT,
};
use super::{scan_unused, state_label, KernelIntrospector};
use crate::channel::{Address, Expression, TargetChannel};
use crate::error::Result;
use crate::report::{Field, Report, StackUsage, ThreadRecord, ThreadReport};

const REGISTRY_LIST: CircularList = CircularList {
    structure: "thread registry",
    node_type: THREAD,
    next: THREAD_NEWER,
    prev: THREAD_OLDER,
    compiled_out: Some("thread registry"),
};

impl<C: TargetChannel> KernelIntrospector<C> {
    /// Read every thread in the registry, in registry order.
    pub fn read_threads(&mut self) -> Result<Option<ThreadReport>> {
        if !self.halted() {
            return Ok(None);
        }
        let head = Address::new(self.fetch_anchor(&Expression::AddressOf(REGISTRY), "kernel")?);
        let entries = self.walk_list(&REGISTRY_LIST, head, Self::read_thread)?;
        Ok(Some(Report::new(entries)))
    }

    fn read_thread(&mut self, tcb: Address) -> Result<ThreadRecord> {
        let field = |name| Expression::member(THREAD, tcb, name);

        let stack_limit = self.fetch_optional(&field(THREAD_STACK_LIMIT))?.map(Address::new);
        let stack_pointer = self.stack_pointer(tcb)?;
        let unused_stack = self.unused_stack(tcb, stack_limit, stack_pointer);
        let name = self.thread_name(tcb)?;

        let state = self.fetch(&field(THREAD_STATE))?;
        let flags = self.fetch(&field(THREAD_FLAGS))?;
        let priority = self.fetch(&field(THREAD_PRIORITY))?;

        Ok(ThreadRecord {
            stack_limit,
            stack_pointer,
            unused_stack,
            name,
            state,
            state_label: state_label(state),
            flags,
            priority,
            ref_count: self.fetch_optional(&field(THREAD_REFS))?,
            cumulative_time: self.fetch_optional(&field(THREAD_TIME))?,
            wait_object: self.fetch_optional(&field(THREAD_WAIT_OBJECT))?.map(Address::new),
        })
    }

    /// Saved stack pointer, trying each historical field name in order.
    fn stack_pointer(&mut self, tcb: Address) -> Result<Field<Address>> {
        for name in THREAD_STACK_POINTER {
            if let Field::Present(sp) = self.fetch_optional(&Expression::member(THREAD, tcb, name))? {
                return Ok(Field::Present(Address::new(sp)));
            }
        }
        Ok(Field::Missing)
    }

    fn unused_stack(
        &mut self,
        tcb: Address,
        limit: Field<Address>,
        pointer: Field<Address>,
    ) -> StackUsage {
        let (Field::Present(limit), Field::Present(pointer)) = (limit, pointer) else {
            return StackUsage::Unknown;
        };
        if pointer < limit {
            log::warn!("Thread {} stack pointer below its limit", tcb.hex());
            return StackUsage::Overflow;
        }
        let span = pointer.value() - limit.value();
        if span > self.config.max_stack_bytes {
            log::warn!(
                "Thread {} claims {span} bytes of stack, not scanning",
                tcb.hex()
            );
            return StackUsage::Unknown;
        }
        let pattern = self.config.stack_fill_pattern;
        match scan_unused(&mut self.channel, limit, pointer, pattern) {
            Ok(bytes) => StackUsage::Unused(bytes),
            Err(e) => {
                log::warn!("Stack scan of thread {} failed: {e}", tcb.hex());
                StackUsage::Unknown
            }
        }
    }
}
