//! Key range partitioning.
//!
//! The owner of a key is selected by the top `floor(log2(n))` bits of the key's first byte, so every node
//! computes the same assignment without any coordination. Only clusters sized as a power of two have every
//! node reachable: with `n` nodes ids in `[2^floor(log2(n)), n)` never own a key. Changing that would change
//! the assignment observed by peers running the same protocol, so the gap is kept as is.

/// Maps keys to owning node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    nodes: usize,
    bits: u32,
}

impl Partitioner {
    /// Creates a partitioner for a cluster of `nodes` nodes.
    pub fn new(nodes: usize) -> Self {
        let bits = if nodes <= 1 { 0 } else { nodes.ilog2() };
        // a single byte can't address more than 256 owners
        Partitioner { nodes, bits: bits.min(8) }
    }

    /// Number of key bits used to select the owner.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of nodes that can own a key, i.e. `2^bits`.
    pub fn reachable(&self) -> usize {
        1 << self.bits
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Returns the id of the node owning `key`.
    ///
    /// # Panics
    /// Panics if `key` is empty.
    pub fn destination(&self, key: &[u8]) -> usize {
        if self.bits == 0 {
            return 0;
        }
        (key[0] >> (8 - self.bits)) as usize
    }
}

/// Returns the id of the node owning `key` in a cluster of `nodes` nodes.
pub fn destination(key: &[u8], nodes: usize) -> usize {
    Partitioner::new(nodes).destination(key)
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use rstest::*;

    use super::{destination, Partitioner};

    #[rstest]
    #[case(1, 0)]
    #[case(2, 1)]
    #[case(4, 2)]
    #[case(8, 3)]
    #[case(16, 4)]
    #[case(256, 8)]
    fn test_power_of_two_coverage(#[case] nodes: usize, #[case] bits: u32) {
        let partitioner = Partitioner::new(nodes);
        assert_eq!(partitioner.bits(), bits);

        let mut owners = BTreeSet::new();
        for head in 0..=u8::MAX {
            let owner = partitioner.destination(&[head, 0xFF, 0x00]);
            assert!(owner < nodes);
            assert_eq!(owner, destination(&[head], nodes));
            owners.insert(owner);
        }
        assert_eq!(owners, (0..nodes).collect::<BTreeSet<_>>());
    }

    #[rstest]
    #[case(2)]
    #[case(4)]
    #[case(8)]
    fn test_depends_on_top_bits_only(#[case] nodes: usize) {
        let partitioner = Partitioner::new(nodes);
        let low_mask = 0xFFu8 >> partitioner.bits();

        for head in 0..=u8::MAX {
            let expected = partitioner.destination(&[head & !low_mask]);
            assert_eq!(partitioner.destination(&[head | low_mask, 0xAA]), expected);
            assert_eq!(partitioner.destination(&[head, 0x00, 0x11, 0x22]), expected);
        }
    }

    #[test]
    fn test_one_bit_split() {
        assert_eq!(destination(&[0x10], 2), 0);
        assert_eq!(destination(&[0x40], 2), 0);
        assert_eq!(destination(&[0x80], 2), 1);
        assert_eq!(destination(&[0xA0], 2), 1);
    }

    #[rstest]
    #[case(3, 2)]
    #[case(5, 4)]
    #[case(6, 4)]
    #[case(7, 4)]
    #[case(12, 8)]
    fn test_non_power_of_two_gap(#[case] nodes: usize, #[case] reachable: usize) {
        let partitioner = Partitioner::new(nodes);
        assert_eq!(partitioner.reachable(), reachable);

        let owners: BTreeSet<usize> = (0..=u8::MAX).map(|head| partitioner.destination(&[head])).collect();
        assert_eq!(owners, (0..reachable).collect::<BTreeSet<_>>());
        for unreachable in reachable..nodes {
            assert!(!owners.contains(&unreachable));
        }
    }
}
