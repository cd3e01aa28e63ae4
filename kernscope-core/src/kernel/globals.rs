use super::names::{CURRENT_THREAD, ISR_COUNT, LOCK_COUNT, PANIC_MESSAGE, PREEMPTION, SYSTEM_TIME};
use super::KernelIntrospector;
use crate::channel::{Address, Expression, TargetChannel};
use crate::error::Result;
use crate::report::{CurrentThread, Field, GlobalSnapshot, Nesting, PanicMessage};

impl<C: TargetChannel> KernelIntrospector<C> {
    /// Snapshot of the kernel globals.
    ///
    /// Only the system time is required; without it the kernel image is not
    /// present. Every other value degrades on its own.
    pub fn read_global_variables(&mut self) -> Result<Option<GlobalSnapshot>> {
        if !self.halted() {
            return Ok(None);
        }
        let system_time = self.fetch_anchor(&Expression::Global(SYSTEM_TIME), "kernel")?;

        let current_thread = match self.fetch_optional(&Expression::Global(CURRENT_THREAD))? {
            Field::Present(0) => Field::Present(CurrentThread {
                address: Address::NULL,
                name: Field::Missing,
            }),
            Field::Present(tcb) => {
                let address = Address::new(tcb);
                Field::Present(CurrentThread {
                    address,
                    name: self.thread_name(address)?,
                })
            }
            Field::Missing => Field::Missing,
        };

        let preemption = self.fetch_optional(&Expression::Global(PREEMPTION))?;
        let panic_message = self.panic_message()?;
        let isr_nesting = self.nesting(ISR_COUNT)?;
        let lock_nesting = self.nesting(LOCK_COUNT)?;

        Ok(Some(GlobalSnapshot {
            system_time,
            current_thread,
            preemption,
            panic_message,
            isr_nesting,
            lock_nesting,
        }))
    }

    fn panic_message(&mut self) -> Result<PanicMessage> {
        let message = match self.fetch_optional(&Expression::Global(PANIC_MESSAGE))? {
            Field::Missing => PanicMessage::NotEnabled,
            Field::Present(0) => PanicMessage::Null,
            Field::Present(pointer) => {
                let max_len = self.config.panic_message_len;
                match self.read_c_string(Address::new(pointer), max_len) {
                    Ok(text) => PanicMessage::Message(text),
                    Err(e) => {
                        log::warn!("Panic message unreadable: {e}");
                        PanicMessage::NotEnabled
                    }
                }
            }
        };
        Ok(message)
    }

    fn nesting(&mut self, counter: &'static str) -> Result<Nesting> {
        Ok(match self.fetch_optional(&Expression::Global(counter))? {
            Field::Present(count) => Nesting::from_count(count),
            Field::Missing => Nesting::NotEnabled,
        })
    }
}
