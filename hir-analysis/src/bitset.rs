use core::fmt;
use core::ops::{BitAndAssign, BitOrAssign};

use bitvec::vec::BitVec;

/// A fixed-width bit set.
///
/// The width is fixed at construction and always equals the cardinality of
/// the domain the owning analysis ranges over; all binary operations require
/// both operands to share a width.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct BitSet {
    bits: BitVec,
}

impl BitSet {
    /// A set of width `len` with no bits set.
    pub fn empty(len: usize) -> Self {
        Self {
            bits: BitVec::repeat(false, len),
        }
    }

    /// A set of width `len` with every bit set.
    pub fn full(len: usize) -> Self {
        Self {
            bits: BitVec::repeat(true, len),
        }
    }

    /// The width of the set, i.e. the domain cardinality.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    pub fn set(&mut self, index: usize) {
        self.bits.set(index, true);
    }

    pub fn reset(&mut self, index: usize) {
        self.bits.set(index, false);
    }

    pub fn test(&self, index: usize) -> bool {
        self.bits[index]
    }

    /// Flip every bit in place.
    pub fn complement(&mut self) {
        let bits = core::mem::take(&mut self.bits);
        self.bits = !bits;
    }

    /// A copy of this set with every bit flipped.
    pub fn complemented(&self) -> Self {
        let mut out = self.clone();
        out.complement();
        out
    }

    /// Remove every bit that is set in `other`.
    pub fn difference_with(&mut self, other: &Self) {
        debug_assert_eq!(self.len(), other.len());
        *self &= &other.complemented();
    }

    /// Returns true if every bit set in `self` is also set in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        debug_assert_eq!(self.len(), other.len());
        self.iter_ones().all(|index| other.test(index))
    }

    /// Indices of set bits, in increasing order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    pub fn count_ones(&self) -> usize {
        self.bits.count_ones()
    }
}

impl BitAndAssign<&BitSet> for BitSet {
    fn bitand_assign(&mut self, rhs: &BitSet) {
        debug_assert_eq!(self.len(), rhs.len());
        *self.bits.as_mut_bitslice() &= rhs.bits.as_bitslice();
    }
}

impl BitOrAssign<&BitSet> for BitSet {
    fn bitor_assign(&mut self, rhs: &BitSet) {
        debug_assert_eq!(self.len(), rhs.len());
        *self.bits.as_mut_bitslice() |= rhs.bits.as_bitslice();
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, index) in self.iter_ones().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{index}")?;
        }
        f.write_str("}")
    }
}
