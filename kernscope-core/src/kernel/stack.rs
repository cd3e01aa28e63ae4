use crate::channel::{Address, ChannelError, TargetChannel, WordSize};

/// Count the untouched stack bytes in `[low, high)`.
///
/// Reads the range as 32-bit words and counts how many, starting at `low`,
/// still hold `fill_pattern`. Stacks grow down, so the low end is the last
/// to be overwritten. An empty or inverted range yields 0 without reading.
pub fn scan_unused<C: TargetChannel + ?Sized>(
    channel: &mut C,
    low: Address,
    high: Address,
    fill_pattern: u32,
) -> Result<u32, ChannelError> {
    if high <= low {
        return Ok(0);
    }
    let words = (high.value() - low.value()) / WordSize::Word.bytes();
    if words == 0 {
        return Ok(0);
    }

    let block = channel.read_memory(low, WordSize::Word, words)?;
    let untouched = block
        .words
        .iter()
        .take_while(|&&w| w == fill_pattern)
        .count();
    let untouched = u32::try_from(untouched).unwrap_or(words);
    Ok(untouched * WordSize::Word.bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Expression, MemoryBlock};

    struct FixedStack {
        base: u32,
        words: Vec<u32>,
        reads: usize,
    }

    impl TargetChannel for FixedStack {
        fn evaluate(&mut self, expression: &Expression) -> Result<String, ChannelError> {
            Err(ChannelError::evaluate(expression, "not supported"))
        }

        fn read_memory(
            &mut self,
            address: Address,
            word_size: WordSize,
            count: u32,
        ) -> Result<MemoryBlock, ChannelError> {
            self.reads += 1;
            let start = ((address.value() - self.base) / 4) as usize;
            let words = self.words[start..start + count as usize].to_vec();
            Ok(MemoryBlock { address, word_size, words })
        }

        fn is_target_running(&mut self) -> bool {
            false
        }
    }

    fn stack(words: Vec<u32>) -> FixedStack {
        FixedStack { base: 0x2000_0000, words, reads: 0 }
    }

    #[test]
    fn test_empty_range_reads_nothing() {
        let mut target = stack(vec![]);
        let base = Address::new(0x2000_0000);
        assert_eq!(scan_unused(&mut target, base, base, 0x5555_5555), Ok(0));
        assert_eq!(
            scan_unused(&mut target, base, Address::new(0x1FFF_FFF0), 0x5555_5555),
            Ok(0)
        );
        assert_eq!(target.reads, 0);
    }

    #[test]
    fn test_fully_filled_range() {
        let mut target = stack(vec![0x5555_5555; 64]);
        let low = Address::new(0x2000_0000);
        let high = Address::new(0x2000_0100);
        assert_eq!(scan_unused(&mut target, low, high, 0x5555_5555), Ok(0x100));
    }

    #[test]
    fn test_stops_at_first_used_word() {
        let mut words = vec![0x5555_5555; 16];
        words[5] = 0xDEAD_BEEF;
        let mut target = stack(words);
        let low = Address::new(0x2000_0000);
        let high = Address::new(0x2000_0040);
        assert_eq!(scan_unused(&mut target, low, high, 0x5555_5555), Ok(20));
    }
}
