//! Target channel over a debug probe.
//!
//! Expressions are resolved with a [`KernelLayout`] and the firmware's
//! [`SymbolTable`]; the probe only provides raw memory and core status.

use crate::channel::{Address, ChannelError, Expression, MemoryBlock, TargetChannel, WordSize};
use crate::layout::{read_words, KernelLayout, TargetMemory};
use crate::symbols::SymbolTable;
use anyhow::{Context, Result};
use probe_rs::probe::list::Lister;
use probe_rs::{Core, CoreStatus, MemoryInterface, Permissions, Session};

/// Whether a core is currently executing.
pub trait ExecutionState {
    fn is_running(&mut self) -> bool;
}

impl ExecutionState for Core<'_> {
    fn is_running(&mut self) -> bool {
        match self.status() {
            Ok(status) => matches!(status, CoreStatus::Running),
            Err(e) => {
                // An unreadable status is not a safe point to read memory.
                log::warn!("Failed to get core status: {e}");
                true
            }
        }
    }
}

struct ProbeMemory<'m, M>(&'m mut M);

impl<M: MemoryInterface> TargetMemory for ProbeMemory<'_, M> {
    fn read_bytes(&mut self, address: Address, buf: &mut [u8]) -> std::result::Result<(), ChannelError> {
        self.0
            .read_8(u64::from(address.value()), buf)
            .map_err(|e| ChannelError::ReadMemory {
                address,
                reason: e.to_string(),
            })
    }
}

/// [`TargetChannel`] backed by a probe-rs core.
pub struct ProbeChannel<'a, M> {
    core: M,
    symbols: &'a SymbolTable,
    layout: &'a KernelLayout,
}

impl<'a, M: MemoryInterface + ExecutionState> ProbeChannel<'a, M> {
    pub const fn new(core: M, symbols: &'a SymbolTable, layout: &'a KernelLayout) -> Self {
        Self { core, symbols, layout }
    }
}

impl<M: MemoryInterface + ExecutionState> TargetChannel for ProbeChannel<'_, M> {
    fn evaluate(&mut self, expression: &Expression) -> std::result::Result<String, ChannelError> {
        let value = self
            .layout
            .evaluate(expression, self.symbols, &mut ProbeMemory(&mut self.core))?;
        log::trace!("{expression} = {value}");
        Ok(value.to_string())
    }

    fn read_memory(
        &mut self,
        address: Address,
        word_size: WordSize,
        count: u32,
    ) -> std::result::Result<MemoryBlock, ChannelError> {
        read_words(&mut ProbeMemory(&mut self.core), address, word_size, count)
    }

    fn is_target_running(&mut self) -> bool {
        self.core.is_running()
    }
}

/// Open the probe at `index` and attach to `chip`.
pub fn open_session(index: usize, chip: &str) -> Result<Session> {
    let lister = Lister::new();
    let probes = lister.list_all();
    let probe_info = probes.get(index).context("Probe index out of range")?;
    let probe = probe_info.open().context("Failed to open probe")?;
    log::info!("Attaching to {chip}");
    probe
        .attach(chip, Permissions::default())
        .with_context(|| format!("Failed to attach to target {chip}"))
}
