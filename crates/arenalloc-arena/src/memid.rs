use arenalloc_bitmap::BitmapIndex;

/// Where a block handed out by the arena layer came from.
///
/// The packed form keeps `arena + 1` in the low byte and the bitmap index in
/// the remaining bits, so `0` is free to mean "direct OS memory".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemId {
  Os,
  Arena { arena: usize, bitmap: BitmapIndex },
}

impl MemId {
  const ARENA_SHIFT: u32 = 8;
  const ARENA_MASK: usize = 0xFF;

  pub const RAW_OS: usize = 0;

  pub const fn arena(arena: usize, bitmap: BitmapIndex) -> Self {
    MemId::Arena { arena, bitmap }
  }

  pub const fn is_os(self) -> bool {
    matches!(self, MemId::Os)
  }

  /// Total over every value, including ids decoded from corrupt handles, so
  /// `from_raw(raw).to_raw() == raw` always holds.
  pub const fn to_raw(self) -> usize {
    match self {
      MemId::Os => Self::RAW_OS,
      MemId::Arena { arena, bitmap } => {
        (bitmap.raw() << Self::ARENA_SHIFT) | (arena.wrapping_add(1) & Self::ARENA_MASK)
      }
    }
  }

  /// Decodes a packed id. A corrupt value decodes to an arena index that the
  /// registry will reject when the block is freed.
  pub const fn from_raw(raw: usize) -> Self {
    if raw == Self::RAW_OS {
      return MemId::Os;
    }
    MemId::Arena {
      arena: (raw & Self::ARENA_MASK).wrapping_sub(1),
      bitmap: BitmapIndex::from_raw(raw >> Self::ARENA_SHIFT),
    }
  }
}

impl From<MemId> for usize {
  fn from(memid: MemId) -> usize {
    memid.to_raw()
  }
}

impl From<usize> for MemId {
  fn from(raw: usize) -> MemId {
    MemId::from_raw(raw)
  }
}
