use crate::layout::SymbolLookup;
use anyhow::{Context, Result};
use object::{Object, ObjectSymbol};
use std::collections::HashMap;
use std::path::Path;

/// Named symbols of the firmware image running on the target.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    addresses: HashMap<String, u64>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the symbol table from an ELF file.
    pub fn load_elf(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let table = Self::parse_elf(&data)?;
        log::info!("Loaded {} symbols from {}", table.len(), path.display());
        Ok(table)
    }

    /// Index every named symbol of an in-memory ELF image.
    pub fn parse_elf(data: &[u8]) -> Result<Self> {
        let obj = object::File::parse(data).context("Failed to parse ELF")?;
        let addresses = obj
            .symbols()
            .filter_map(|symbol| {
                let name = symbol.name().ok().filter(|n| !n.is_empty())?;
                Some((name.to_string(), symbol.address()))
            })
            .collect();
        Ok(Self { addresses })
    }

    pub fn insert(&mut self, name: impl Into<String>, address: u64) {
        self.addresses.insert(name.into(), address);
    }

    /// Address of a symbol by name.
    pub fn lookup_symbol(&self, name: &str) -> Option<u64> {
        self.addresses.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self {
            addresses: iter.into_iter().map(|(n, a)| (n.into(), a)).collect(),
        }
    }
}

impl SymbolLookup for SymbolTable {
    fn symbol_address(&self, name: &str) -> Option<u64> {
        self.lookup_symbol(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_table_initial_state() {
        let table = SymbolTable::new();
        assert!(table.is_empty());
        assert!(table.lookup_symbol("rlist").is_none());
    }

    #[test]
    fn test_symbol_table_from_pairs() {
        let table: SymbolTable = [("rlist", 0x2000_0100u64), ("vtlist", 0x2000_0200)].into_iter().collect();
        assert_eq!(table.len(), 2);
        assert_eq!(table.symbol_address("vtlist"), Some(0x2000_0200));
    }

    #[test]
    fn test_parse_rejects_non_elf() {
        assert!(SymbolTable::parse_elf(b"not an elf").is_err());
    }
}
