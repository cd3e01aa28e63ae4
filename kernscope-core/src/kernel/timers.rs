use super::list::CircularList;
use super::names::{TIMER, TIMER_CALLBACK, TIMER_DELTA, TIMER_LIST, TIMER_NEXT, TIMER_PARAMETER, TIMER_PREV};
use super::KernelIntrospector;
use crate::channel::{Address, Expression, TargetChannel};
use crate::error::Result;
use crate::report::{Report, TimerRecord, TimerReport};

const DELTA_LIST: CircularList = CircularList {
    structure: "delta list",
    node_type: TIMER,
    next: TIMER_NEXT,
    prev: TIMER_PREV,
    compiled_out: None,
};

impl<C: TargetChannel> KernelIntrospector<C> {
    /// Read the pending timers in expiry order.
    pub fn read_timers(&mut self) -> Result<Option<TimerReport>> {
        if !self.halted() {
            return Ok(None);
        }
        let head = Address::new(self.fetch_anchor(&Expression::AddressOf(TIMER_LIST), "kernel")?);
        let entries = self.walk_list(&DELTA_LIST, head, |this, timer| {
            Ok(TimerRecord {
                delta: this.fetch(&Expression::member(TIMER, timer, TIMER_DELTA))?,
                callback: this.fetch_address(&Expression::member(TIMER, timer, TIMER_CALLBACK))?,
                parameter: this.fetch(&Expression::member(TIMER, timer, TIMER_PARAMETER))?,
            })
        })?;
        Ok(Some(Report::new(entries)))
    }
}
