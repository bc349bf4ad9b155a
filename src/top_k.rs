use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::freq_table::FreqTable;

/// One line of the ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedEntry {
    pub identifier: String,
    pub count: u64,
}

impl RankedEntry {
    pub fn new(identifier: impl Into<String>, count: u64) -> Self {
        RankedEntry {
            identifier: identifier.into(),
            count,
        }
    }
}

#[derive(PartialEq, Eq)]
struct Candidate<'a> {
    count: u64,
    identifier: &'a str,
}

/// Greater means ranked higher: more occurrences first, equal counts by
/// identifier ascending.
impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| other.identifier.cmp(self.identifier))
    }
}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The `k` most frequent identifiers, descending by count, ties broken by
/// identifier ascending.
///
/// Keeps a min-heap of at most `k` candidates, O(n log k).
pub fn top_k(frequency: &FreqTable, k: usize) -> Vec<RankedEntry> {
    if k == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k.min(frequency.len()) + 1);
    for (identifier, &count) in frequency {
        let candidate = Candidate {
            count,
            identifier: identifier.as_str(),
        };
        if heap.len() < k {
            heap.push(Reverse(candidate));
        } else if let Some(Reverse(worst)) = heap.peek() {
            if candidate > *worst {
                heap.pop();
                heap.push(Reverse(candidate));
            }
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(c)| RankedEntry::new(c.identifier, c.count))
        .collect()
}
