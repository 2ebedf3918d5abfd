//! Fixed-length bit field over a [`Mem`].

use std::fmt;

use bedrock_alloc::{AllocError, Mem};

use crate::vec::MemVec;

const WORD_BITS: usize = u64::BITS as usize;

/// A bit field of fixed length, all bits initially clear.
pub struct MemBits<'m> {
    words: MemVec<'m, u64>,
    len: usize,
}

impl<'m> MemBits<'m> {
    /// Allocate `len` clear bits from `mem`.
    pub fn new(mem: &'m dyn Mem, len: usize) -> Result<Self, AllocError> {
        let count = len.div_ceil(WORD_BITS);
        let mut words = MemVec::with_capacity(mem, count)?;
        words.resize(count, 0)?;
        Ok(Self { words, len })
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` for a zero-length field.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bit `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.len {
            return None;
        }
        let (word, mask) = locate(index);
        Some(self.words[word] & mask != 0)
    }

    /// Set bit `index`, returning its previous value.
    pub fn set(&mut self, index: usize) -> Result<bool, AllocError> {
        self.update(index, |word, mask| word | mask)
    }

    /// Clear bit `index`, returning its previous value.
    pub fn clear(&mut self, index: usize) -> Result<bool, AllocError> {
        self.update(index, |word, mask| word & !mask)
    }

    /// Flip bit `index`, returning its previous value.
    pub fn toggle(&mut self, index: usize) -> Result<bool, AllocError> {
        self.update(index, |word, mask| word ^ mask)
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clear every bit.
    pub fn clear_all(&mut self) {
        for word in self.words.iter_mut() {
            *word = 0;
        }
    }

    /// Indices of set bits in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(at, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(at * WORD_BITS + bit)
            })
        })
    }

    fn update(
        &mut self,
        index: usize,
        f: impl FnOnce(u64, u64) -> u64,
    ) -> Result<bool, AllocError> {
        if index >= self.len {
            return Err(AllocError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        let (word, mask) = locate(index);
        let old = self.words[word];
        self.words[word] = f(old, mask);
        Ok(old & mask != 0)
    }
}

fn locate(index: usize) -> (usize, u64) {
    (index / WORD_BITS, 1 << (index % WORD_BITS))
}

impl fmt::Debug for MemBits<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemBits")
            .field("len", &self.len)
            .field("ones", &self.count_ones())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedrock_alloc::{Arena, SystemMem};

    #[test]
    fn starts_clear() {
        let mem = SystemMem::new();
        let bits = MemBits::new(&mem, 130).unwrap();
        assert_eq!(bits.len(), 130);
        assert_eq!(bits.count_ones(), 0);
        assert!((0..130).all(|i| bits.get(i) == Some(false)));
        assert_eq!(bits.get(130), None);
    }

    #[test]
    fn set_clear_toggle_report_previous_value() {
        let mem = SystemMem::new();
        let mut bits = MemBits::new(&mem, 100).unwrap();
        assert_eq!(bits.set(63), Ok(false));
        assert_eq!(bits.set(63), Ok(true));
        assert_eq!(bits.toggle(64), Ok(false));
        assert_eq!(bits.get(64), Some(true));
        assert_eq!(bits.toggle(64), Ok(true));
        assert_eq!(bits.get(64), Some(false));
        assert_eq!(bits.clear(63), Ok(true));
        assert_eq!(bits.clear(63), Ok(false));
        assert_eq!(bits.count_ones(), 0);
    }

    #[test]
    fn out_of_range_is_an_error() {
        let mem = SystemMem::new();
        let mut bits = MemBits::new(&mem, 10).unwrap();
        let err = AllocError::IndexOutOfBounds { index: 10, len: 10 };
        assert_eq!(bits.set(10), Err(err.clone()));
        assert_eq!(bits.clear(10), Err(err.clone()));
        assert_eq!(bits.toggle(10), Err(err));
        assert_eq!(bits.count_ones(), 0);
    }

    #[test]
    fn iter_ones_spans_words() {
        let mut arena = Arena::with_capacity(1 << 16).unwrap();
        let mem = arena.as_mem();
        let mut bits = MemBits::new(&mem, 200).unwrap();
        for i in [0, 5, 63, 64, 127, 128, 199] {
            bits.set(i).unwrap();
        }
        assert_eq!(bits.count_ones(), 7);
        assert_eq!(
            bits.iter_ones().collect::<Vec<_>>(),
            vec![0, 5, 63, 64, 127, 128, 199]
        );
        bits.clear_all();
        assert_eq!(bits.iter_ones().count(), 0);
    }

    #[test]
    fn zero_length_field() {
        let mem = SystemMem::new();
        let mut bits = MemBits::new(&mem, 0).unwrap();
        assert!(bits.is_empty());
        assert_eq!(bits.get(0), None);
        assert!(bits.set(0).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn matches_bool_vector(len in 1usize..300, ops in proptest::collection::vec((0u8..3, any::<usize>()), 0..200)) {
                let mem = SystemMem::new();
                let mut bits = MemBits::new(&mem, len).unwrap();
                let mut model = vec![false; len];
                for (op, index) in ops {
                    let at = index % len;
                    let before = model[at];
                    let reported = match op {
                        0 => { model[at] = true; bits.set(at).unwrap() }
                        1 => { model[at] = false; bits.clear(at).unwrap() }
                        _ => { model[at] = !model[at]; bits.toggle(at).unwrap() }
                    };
                    prop_assert_eq!(reported, before);
                }
                prop_assert_eq!(bits.count_ones(), model.iter().filter(|&&b| b).count());
                for (i, &b) in model.iter().enumerate() {
                    prop_assert_eq!(bits.get(i), Some(b));
                }
            }
        }
    }
}
