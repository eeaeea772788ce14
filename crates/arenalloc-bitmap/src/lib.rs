#![cfg_attr(not(test), no_std)]

//! Concurrent bitmap over machine-word fields.
//!
//! Runs of bits are always claimed within a single field, so every operation
//! is one atomic read-modify-write on one word. A successful claim
//! synchronizes with the unclaim that last released the same bits.

use core::sync::atomic::{
  AtomicUsize,
  Ordering,
};


pub type BitmapWord = AtomicUsize;

pub const FIELD_BITS: usize = usize::BITS as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapError {
  /// Run length is zero, wider than a field, or crosses a field boundary.
  InvalidRun { count: usize, bit: usize },
  OutOfBounds { field: usize, fields: usize },
}

pub type BitmapResult<T> = Result<T, BitmapError>;

/// Absolute bit position: `field * FIELD_BITS + bit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BitmapIndex(usize);

impl BitmapIndex {
  #[inline(always)]
  pub const fn new(field: usize, bit: usize) -> Self {
    debug_assert!(bit < FIELD_BITS);
    Self(field * FIELD_BITS + bit)
  }

  #[inline(always)]
  pub const fn from_raw(raw: usize) -> Self {
    Self(raw)
  }

  #[inline(always)]
  pub const fn raw(self) -> usize {
    self.0
  }

  #[inline(always)]
  pub const fn field(self) -> usize {
    self.0 / FIELD_BITS
  }

  #[inline(always)]
  pub const fn bit(self) -> usize {
    self.0 % FIELD_BITS
  }
}

#[derive(Debug, Clone, Copy)]
pub struct Bitmap<'slice> {
  store: &'slice [BitmapWord],
}

impl<'slice> Bitmap<'slice> {
  /// Fields needed to hold `bits` bits.
  #[inline(always)]
  pub const fn words(bits: usize) -> usize {
    bits.div_ceil(FIELD_BITS)
  }

  #[inline(always)]
  pub const fn bytes(bits: usize) -> usize {
    Self::words(bits) * core::mem::size_of::<BitmapWord>()
  }

  pub const fn new(store: &'slice [BitmapWord]) -> Self {
    Self { store }
  }

  #[inline(always)]
  pub const fn fields(&self) -> usize {
    self.store.len()
  }

  #[inline(always)]
  pub const fn bits(&self) -> usize {
    self.store.len() * FIELD_BITS
  }

  #[inline(always)]
  const fn mask(count: usize, bit: usize) -> usize {
    if count >= FIELD_BITS {
      usize::MAX
    } else {
      ((1usize << count) - 1) << bit
    }
  }

  fn locate(&self, count: usize, index: BitmapIndex) -> BitmapResult<(&BitmapWord, usize)> {
    let (field, bit) = (index.field(), index.bit());
    if count == 0 || bit + count > FIELD_BITS {
      return Err(BitmapError::InvalidRun { count, bit });
    }
    let word = self.store.get(field).ok_or(BitmapError::OutOfBounds {
      field,
      fields: self.store.len(),
    })?;
    Ok((word, Self::mask(count, bit)))
  }

  /// Atomically claims `count` contiguous zero bits inside `field`.
  ///
  /// Returns `None` when the field has no such run (or `count` does not fit in
  /// a field at all).
  pub fn try_claim_field(&self, field: usize, count: usize) -> Option<BitmapIndex> {
    if count == 0 || count > FIELD_BITS {
      return None;
    }
    let word = self.store.get(field)?;

    let mut map = word.load(Ordering::Relaxed);
    if map == usize::MAX {
      return None;
    }

    let max_bit = FIELD_BITS - count;
    let mut bit = (!map).trailing_zeros() as usize;
    while bit <= max_bit {
      let mask = Self::mask(count, bit);
      let overlap = map & mask;
      if overlap == 0 {
        match word.compare_exchange_weak(map, map | mask, Ordering::AcqRel, Ordering::Acquire) {
          Ok(_) => return Some(BitmapIndex::new(field, bit)),
          // retry the same position against the fresh value
          Err(current) => map = current,
        }
      } else {
        // skip past the highest set bit that got in the way
        let highest = (FIELD_BITS - 1) - overlap.leading_zeros() as usize;
        bit = highest + 1;
      }
    }
    None
  }

  /// Sets `count` bits at `index`. Returns whether they were all zero before.
  pub fn claim(&self, count: usize, index: BitmapIndex) -> BitmapResult<bool> {
    let (word, mask) = self.locate(count, index)?;
    let prev = word.fetch_or(mask, Ordering::AcqRel);
    Ok(prev & mask == 0)
  }

  /// Clears `count` bits at `index`. Returns whether they were all one before.
  pub fn unclaim(&self, count: usize, index: BitmapIndex) -> BitmapResult<bool> {
    let (word, mask) = self.locate(count, index)?;
    let prev = word.fetch_and(!mask, Ordering::AcqRel);
    Ok(prev & mask == mask)
  }

  /// Whether all `count` bits at `index` are currently set.
  pub fn is_claimed(&self, count: usize, index: BitmapIndex) -> BitmapResult<bool> {
    let (word, mask) = self.locate(count, index)?;
    Ok(word.load(Ordering::Acquire) & mask == mask)
  }

  /// Number of set bits over the whole bitmap; a racy snapshot.
  pub fn count_claimed(&self) -> usize {
    self
      .store
      .iter()
      .map(|word| word.load(Ordering::Relaxed).count_ones() as usize)
      .sum()
  }
}
