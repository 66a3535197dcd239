//! A bit vector for compact coverage and requirement sets.
//!
//! The engine tracks several index spaces (global branch indices, edge indices,
//! DUA slots) as sets of small integers. This module provides the compact bit
//! set used for branch coverage vectors, spanning-tree membership, and the four
//! branch-requirement sets attached to every DUA.

/// A fixed-capacity bit vector.
///
/// Backing storage is one `u64` word per 64 bits. Capacity is fixed at
/// construction; index spaces in this crate are assigned once and never grow.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    /// The bits, 64 per word.
    words: Vec<u64>,
    /// Capacity in bits.
    len: usize,
}

impl BitSet {
    /// Creates an empty bit set with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            len: capacity,
        }
    }

    /// Returns the capacity of this bit set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Sets the bit at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn insert(&mut self, index: usize) {
        assert!(index < self.len, "index out of bounds");
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    /// Clears the bit at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn remove(&mut self, index: usize) {
        assert!(index < self.len, "index out of bounds");
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Returns `true` if the bit at the given index is set.
    ///
    /// Out-of-range indices are reported as unset rather than panicking, since
    /// requirement sets may reference branch indices from other methods.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        (self.words[index / 64] & (1u64 << (index % 64))) != 0
    }

    /// Returns the number of set bits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if any bit is set in both `self` and `other`.
    ///
    /// Used for requirement-set overlap checks (e.g. the self-overlap kill
    /// exclusion in DUA classification). The two sets may differ in capacity;
    /// only the common prefix is compared.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Computes the union with another bit set of the same capacity, in place.
    ///
    /// # Panics
    ///
    /// Panics if the capacities differ.
    pub fn union_with(&mut self, other: &Self) {
        assert_eq!(self.len, other.len, "bit sets must have same length");
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
    }

    /// Returns an iterator over the indices of set bits, in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(word_idx * 64 + bit)
            })
        })
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<usize> for BitSet {
    /// Collects indices into a bit set sized to the largest index.
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let indices: Vec<usize> = iter.into_iter().collect();
        let capacity = indices.iter().max().map_or(0, |m| m + 1);
        let mut set = Self::new(capacity);
        for idx in indices {
            set.insert(idx);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = BitSet::new(100);
        assert!(bs.is_empty());

        bs.insert(0);
        bs.insert(50);
        bs.insert(99);

        assert!(!bs.is_empty());
        assert_eq!(bs.count(), 3);
        assert!(bs.contains(0));
        assert!(bs.contains(50));
        assert!(bs.contains(99));
        assert!(!bs.contains(1));
        assert!(!bs.contains(100));
    }

    #[test]
    fn test_bitset_remove() {
        let mut bs = BitSet::new(64);
        bs.insert(42);
        bs.remove(42);
        assert!(!bs.contains(42));
        assert!(bs.is_empty());
    }

    #[test]
    fn test_bitset_intersects() {
        let mut a = BitSet::new(100);
        let mut b = BitSet::new(70);

        a.insert(65);
        b.insert(66);
        assert!(!a.intersects(&b));

        b.insert(65);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn test_bitset_union() {
        let mut a = BitSet::new(100);
        let mut b = BitSet::new(100);
        a.insert(1);
        b.insert(2);

        a.union_with(&b);
        assert!(a.contains(1));
        assert!(a.contains(2));
    }

    #[test]
    fn test_bitset_iter_order() {
        let mut bs = BitSet::new(200);
        bs.insert(130);
        bs.insert(5);
        bs.insert(63);
        bs.insert(64);

        let bits: Vec<_> = bs.iter().collect();
        assert_eq!(bits, vec![5, 63, 64, 130]);
    }

    #[test]
    fn test_bitset_from_iter() {
        let bs: BitSet = [3usize, 7, 7, 11].into_iter().collect();
        assert_eq!(bs.count(), 3);
        assert_eq!(bs.len(), 12);
        assert!(bs.contains(11));
    }
}
