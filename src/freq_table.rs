use std::collections::HashMap;

/// Identifier to count mapping.
///
/// A worker's local accumulator, a chunk handed to the aggregator and the
/// merged global table all share this shape.
pub type FreqTable = HashMap<String, u64>;

/// Immutable snapshot of a worker's table, moved to the aggregator.
pub type Chunk = FreqTable;

#[inline]
pub fn count_identifier(frequency: &mut FreqTable, identifier: String) {
    *frequency.entry(identifier).or_insert(0) += 1;
}

/// Additive merge, consuming the chunk.
pub fn merge_into(frequency: &mut FreqTable, chunk: Chunk) {
    if frequency.is_empty() {
        *frequency = chunk;
        return;
    }
    for (identifier, count) in chunk {
        *frequency.entry(identifier).or_insert(0) += count;
    }
}

/// Sum of all counts in the table
pub fn total(frequency: &FreqTable) -> u64 {
    frequency.values().sum()
}
