//! Struct layouts for resolving [`Expression`]s without a source-level debugger.
//!
//! A probe only gives raw memory and the ELF symbol table, so field offsets
//! have to be supplied. The default matches ChibiOS/RT 2.x on a 32-bit
//! little-endian Cortex-M with registry, stack check, profiling, dynamic
//! threads and the trace buffer enabled. Kernels built with other options
//! load their own layout from JSON.

use crate::channel::{Address, ChannelError, Expression, MemoryBlock, WordSize};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Location of one (possibly nested, dotted) field inside a struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub offset: u32,
    /// Width in bytes: 1, 2 or 4.
    #[serde(default = "FieldLayout::default_size")]
    pub size: u32,
    /// Element type when the field is an array; such fields evaluate to
    /// their address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
}

impl FieldLayout {
    const fn default_size() -> u32 {
        4
    }

    const fn word(offset: u32) -> Self {
        Self { offset, size: 4, element: None }
    }

    const fn byte(offset: u32) -> Self {
        Self { offset, size: 1, element: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructLayout {
    pub size: u32,
    pub fields: BTreeMap<String, FieldLayout>,
}

impl StructLayout {
    fn new(size: u32, fields: impl IntoIterator<Item = (&'static str, FieldLayout)>) -> Self {
        Self {
            size,
            fields: fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }
}

/// Type of a global symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalType {
    /// Instance of a struct described in [`KernelLayout::structs`].
    Struct(String),
    /// Integer or pointer of the given width in bytes.
    Scalar(u32),
}

/// Resolves symbol names to addresses.
pub trait SymbolLookup {
    fn symbol_address(&self, name: &str) -> Option<u64>;
}

/// Raw byte access to target memory.
pub trait TargetMemory {
    fn read_bytes(&mut self, address: Address, buf: &mut [u8]) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelLayout {
    pub structs: BTreeMap<String, StructLayout>,
    pub globals: BTreeMap<String, GlobalType>,
}

impl Default for KernelLayout {
    fn default() -> Self {
        Self::chibios_cortex_m()
    }
}

impl KernelLayout {
    /// ChibiOS/RT 2.x, ARMv6-M/ARMv7-M port.
    pub fn chibios_cortex_m() -> Self {
        let thread = StructLayout::new(
            64,
            [
                ("p_next", FieldLayout::word(0)),
                ("p_prev", FieldLayout::word(4)),
                ("p_prio", FieldLayout::word(8)),
                ("p_ctx.r13", FieldLayout::word(12)),
                ("p_newer", FieldLayout::word(16)),
                ("p_older", FieldLayout::word(20)),
                ("p_name", FieldLayout::word(24)),
                ("p_stklimit", FieldLayout::word(28)),
                ("p_state", FieldLayout::byte(32)),
                ("p_flags", FieldLayout::byte(33)),
                ("p_refs", FieldLayout::byte(34)),
                ("p_time", FieldLayout::word(36)),
                ("p_u.wtobjp", FieldLayout::word(40)),
            ],
        );
        let ready_list = StructLayout::new(
            32,
            [
                ("r_queue.p_next", FieldLayout::word(0)),
                ("r_queue.p_prev", FieldLayout::word(4)),
                ("r_prio", FieldLayout::word(8)),
                ("r_newer", FieldLayout::word(16)),
                ("r_older", FieldLayout::word(20)),
                ("r_current", FieldLayout::word(24)),
                ("r_preempt", FieldLayout::word(28)),
            ],
        );
        let timer = StructLayout::new(
            20,
            [
                ("vt_next", FieldLayout::word(0)),
                ("vt_prev", FieldLayout::word(4)),
                ("vt_time", FieldLayout::word(8)),
                ("vt_func", FieldLayout::word(12)),
                ("vt_par", FieldLayout::word(16)),
            ],
        );
        let timer_list = StructLayout::new(
            16,
            [
                ("vt_next", FieldLayout::word(0)),
                ("vt_prev", FieldLayout::word(4)),
                ("vt_time", FieldLayout::word(8)),
                ("vt_systime", FieldLayout::word(12)),
            ],
        );
        let event = StructLayout::new(
            16,
            [
                ("se_time", FieldLayout::word(0)),
                ("se_tp", FieldLayout::word(4)),
                ("se_wtobjp", FieldLayout::word(8)),
                ("se_state", FieldLayout::byte(12)),
            ],
        );
        let trace_buffer = StructLayout::new(
            8 + 64 * 16,
            [
                ("tb_size", FieldLayout::word(0)),
                ("tb_ptr", FieldLayout::word(4)),
                (
                    "tb_buffer",
                    FieldLayout {
                        offset: 8,
                        size: 4,
                        element: Some("ch_swc_event_t".to_string()),
                    },
                ),
            ],
        );

        let structs = [
            ("Thread", thread),
            ("ReadyList", ready_list),
            ("VirtualTimer", timer),
            ("VTList", timer_list),
            ("ch_swc_event_t", event),
            ("ch_trace_buffer_t", trace_buffer),
        ];
        let globals = [
            ("rlist", GlobalType::Struct("ReadyList".to_string())),
            ("vtlist", GlobalType::Struct("VTList".to_string())),
            ("dbg_trace_buffer", GlobalType::Struct("ch_trace_buffer_t".to_string())),
            ("dbg_panic_msg", GlobalType::Scalar(4)),
            ("dbg_isr_cnt", GlobalType::Scalar(4)),
            ("dbg_lock_cnt", GlobalType::Scalar(4)),
        ];

        Self {
            structs: structs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            globals: globals.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    /// Load a layout from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read layout {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse layout {}", path.display()))
    }

    /// Evaluate `expression` against raw memory.
    pub fn evaluate(
        &self,
        expression: &Expression,
        symbols: &dyn SymbolLookup,
        memory: &mut dyn TargetMemory,
    ) -> Result<u32, ChannelError> {
        match expression {
            Expression::AddressOf(symbol) => Ok(resolve_symbol(symbols, symbol)?.value()),
            Expression::SizeOf(ty) => Ok(self.struct_layout(ty)?.size),
            Expression::Member { ty, base, field } => {
                let field = self.field(ty, field)?;
                read_field(memory, *base, field)
            }
            Expression::Global(path) => match path.split_once('.') {
                None => match self.global_type(path)? {
                    GlobalType::Scalar(size) => {
                        let address = resolve_symbol(symbols, path)?;
                        read_value(memory, address, *size)
                    }
                    GlobalType::Struct(_) => Err(ChannelError::evaluate(expression, "not a scalar")),
                },
                Some((symbol, member)) => {
                    let (address, field) = self.global_member(symbols, symbol, member)?;
                    read_field(memory, address, field)
                }
            },
            Expression::ElementAddress { array, index } => {
                let (symbol, member) = array
                    .split_once('.')
                    .ok_or_else(|| ChannelError::evaluate(expression, "not a struct member"))?;
                let (address, field) = self.global_member(symbols, symbol, member)?;
                let element = field
                    .element
                    .as_deref()
                    .ok_or_else(|| ChannelError::evaluate(expression, "not an array"))?;
                let stride = self.struct_layout(element)?.size;
                index
                    .checked_mul(stride)
                    .and_then(|bytes| field_address(address, field)?.checked_add(bytes))
                    .map(Address::value)
                    .ok_or_else(|| ChannelError::evaluate(expression, "address overflow"))
            }
        }
    }

    fn struct_layout(&self, ty: &str) -> Result<&StructLayout, ChannelError> {
        self.structs
            .get(ty)
            .ok_or_else(|| ChannelError::UnknownType(ty.to_string()))
    }

    fn field(&self, ty: &str, field: &str) -> Result<&FieldLayout, ChannelError> {
        self.struct_layout(ty)?
            .fields
            .get(field)
            .ok_or_else(|| ChannelError::UnknownField {
                ty: ty.to_string(),
                field: field.to_string(),
            })
    }

    fn global_type(&self, symbol: &str) -> Result<&GlobalType, ChannelError> {
        self.globals
            .get(symbol)
            .ok_or_else(|| ChannelError::UnknownSymbol(symbol.to_string()))
    }

    fn global_member(
        &self,
        symbols: &dyn SymbolLookup,
        symbol: &str,
        member: &str,
    ) -> Result<(Address, &FieldLayout), ChannelError> {
        let GlobalType::Struct(ty) = self.global_type(symbol)? else {
            return Err(ChannelError::UnknownField {
                ty: symbol.to_string(),
                field: member.to_string(),
            });
        };
        let field = self.field(ty, member)?;
        Ok((resolve_symbol(symbols, symbol)?, field))
    }
}

fn resolve_symbol(symbols: &dyn SymbolLookup, name: &str) -> Result<Address, ChannelError> {
    symbols
        .symbol_address(name)
        .and_then(|addr| u32::try_from(addr).ok())
        .map(Address::new)
        .ok_or_else(|| ChannelError::UnknownSymbol(name.to_string()))
}

fn field_address(base: Address, field: &FieldLayout) -> Option<Address> {
    base.checked_add(field.offset)
}

fn read_field(
    memory: &mut dyn TargetMemory,
    base: Address,
    field: &FieldLayout,
) -> Result<u32, ChannelError> {
    let address = field_address(base, field).ok_or_else(|| ChannelError::ReadMemory {
        address: base,
        reason: "field offset past end of address space".to_string(),
    })?;
    if field.element.is_some() {
        return Ok(address.value());
    }
    read_value(memory, address, field.size)
}

/// Read a little-endian value of `size` bytes.
fn read_value(memory: &mut dyn TargetMemory, address: Address, size: u32) -> Result<u32, ChannelError> {
    let mut buf = [0u8; 4];
    let len = match size {
        1 | 2 | 4 => size as usize,
        _ => {
            return Err(ChannelError::ReadMemory {
                address,
                reason: format!("unsupported width {size}"),
            })
        }
    };
    memory.read_bytes(address, &mut buf[..len])?;
    Ok(u32::from_le_bytes(buf))
}

/// Block read of `count` little-endian units.
pub fn read_words(
    memory: &mut dyn TargetMemory,
    address: Address,
    word_size: WordSize,
    count: u32,
) -> Result<MemoryBlock, ChannelError> {
    let unit = word_size.bytes() as usize;
    let mut bytes = vec![0u8; unit * count as usize];
    memory.read_bytes(address, &mut bytes)?;
    let words = bytes
        .chunks_exact(unit)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..unit].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect();
    Ok(MemoryBlock {
        address,
        word_size,
        words,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Flat {
        symbols: HashMap<&'static str, u64>,
        memory: HashMap<u32, u8>,
    }

    impl SymbolLookup for Flat {
        fn symbol_address(&self, name: &str) -> Option<u64> {
            self.symbols.get(name).copied()
        }
    }

    impl TargetMemory for Flat {
        fn read_bytes(&mut self, address: Address, buf: &mut [u8]) -> Result<(), ChannelError> {
            for (i, byte) in buf.iter_mut().enumerate() {
                let at = address.value() + i as u32;
                *byte = *self.memory.get(&at).ok_or(ChannelError::ReadMemory {
                    address: Address::new(at),
                    reason: "unmapped".to_string(),
                })?;
            }
            Ok(())
        }
    }

    impl Flat {
        fn new() -> Self {
            Self { symbols: HashMap::new(), memory: HashMap::new() }
        }

        fn set_word(&mut self, addr: u32, value: u32) {
            for (i, b) in value.to_le_bytes().iter().enumerate() {
                self.memory.insert(addr + i as u32, *b);
            }
        }
    }

    fn eval(layout: &KernelLayout, target: &mut Flat, expr: &Expression) -> Result<u32, ChannelError> {
        let symbols = Flat { symbols: target.symbols.clone(), memory: HashMap::new() };
        layout.evaluate(expr, &symbols, target)
    }

    #[test]
    fn test_member_reads_honour_width() {
        let layout = KernelLayout::default();
        let mut target = Flat::new();
        target.set_word(0x2000_0020, 0x0001_0203);
        let tcb = Address::new(0x2000_0000);

        assert_eq!(eval(&layout, &mut target, &Expression::member("Thread", tcb, "p_state")), Ok(3));
        assert_eq!(eval(&layout, &mut target, &Expression::member("Thread", tcb, "p_flags")), Ok(2));
        assert_eq!(eval(&layout, &mut target, &Expression::member("Thread", tcb, "p_refs")), Ok(1));
    }

    #[test]
    fn test_globals_and_arrays() {
        let layout = KernelLayout::default();
        let mut target = Flat::new();
        target.symbols.insert("dbg_trace_buffer", 0x2000_1000);
        target.symbols.insert("dbg_isr_cnt", 0x2000_2000);
        target.set_word(0x2000_1000, 64);
        target.set_word(0x2000_2000, 2);

        assert_eq!(
            eval(&layout, &mut target, &Expression::Global("dbg_trace_buffer.tb_size")),
            Ok(64)
        );
        assert_eq!(
            eval(&layout, &mut target, &Expression::Global("dbg_trace_buffer.tb_buffer")),
            Ok(0x2000_1008)
        );
        assert_eq!(
            eval(
                &layout,
                &mut target,
                &Expression::ElementAddress { array: "dbg_trace_buffer.tb_buffer", index: 64 }
            ),
            Ok(0x2000_1008 + 64 * 16)
        );
        assert_eq!(eval(&layout, &mut target, &Expression::Global("dbg_isr_cnt")), Ok(2));
        assert_eq!(eval(&layout, &mut target, &Expression::SizeOf("ch_swc_event_t")), Ok(16));
        assert_eq!(
            eval(&layout, &mut target, &Expression::AddressOf("dbg_trace_buffer")),
            Ok(0x2000_1000)
        );
    }

    #[test]
    fn test_unknown_names_are_channel_errors() {
        let layout = KernelLayout::default();
        let mut target = Flat::new();
        let tcb = Address::new(0x2000_0000);

        assert_eq!(
            eval(&layout, &mut target, &Expression::member("Thread", tcb, "p_ctx.sp")),
            Err(ChannelError::UnknownField { ty: "Thread".into(), field: "p_ctx.sp".into() })
        );
        assert_eq!(
            eval(&layout, &mut target, &Expression::AddressOf("rlist")),
            Err(ChannelError::UnknownSymbol("rlist".into()))
        );
        assert!(matches!(
            eval(&layout, &mut target, &Expression::member("Thread", tcb, "p_prio")),
            Err(ChannelError::ReadMemory { .. })
        ));
    }

    #[test]
    fn test_layout_json_round_trip() {
        let layout = KernelLayout::default();
        let json = serde_json::to_string(&layout).unwrap();
        assert!(json.contains("\"dbg_isr_cnt\":{\"scalar\":4}"));
        let parsed: KernelLayout = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, layout);
    }

    #[test]
    fn test_block_read_decodes_little_endian() {
        let mut target = Flat::new();
        target.set_word(0x100, 0x5555_5555);
        target.set_word(0x104, 0x1234_5678);
        let block = read_words(&mut target, Address::new(0x100), WordSize::Word, 2).unwrap();
        assert_eq!(block.words, vec![0x5555_5555, 0x1234_5678]);
        let halves = read_words(&mut target, Address::new(0x104), WordSize::HalfWord, 2).unwrap();
        assert_eq!(halves.words, vec![0x5678, 0x1234]);
    }
}
