use core::{
  ptr::NonNull,
  sync::atomic::{
    AtomicPtr,
    AtomicUsize,
    Ordering,
  },
};

use arenalloc_bitmap::BitmapIndex;
use arenalloc_sys::{
  math::divide_up,
  system::{
    SysOption,
    System,
  },
};

use crate::{
  arena::{
    Allocation,
    Arena,
    NumaNode,
  },
  config::{
    BLOCK_SIZE,
    MAX_ARENAS,
    MAX_OBJ_SIZE,
    MIN_OBJ_SIZE,
    SEGMENT_ALIGN,
  },
  error::{
    ArenaError,
    ArenaResult,
    Corruption,
  },
  memid::MemId,
  options::Options,
  stats::Stats,
};

/// Process-wide table of published arenas.
///
/// Slots are reserved with a counter and then published; a slot is never
/// cleared once published, so readers need no lock.
pub struct Arenas {
  slots: [AtomicPtr<Arena>; MAX_ARENAS],
  count: AtomicUsize,
  system: &'static dyn System,
  options: &'static Options,
  stats: Stats,
}

impl Arenas {
  pub const fn new(system: &'static dyn System, options: &'static Options) -> Self {
    Self {
      slots: [const { AtomicPtr::new(core::ptr::null_mut()) }; MAX_ARENAS],
      count: AtomicUsize::new(0),
      system,
      options,
      stats: Stats::new(),
    }
  }

  #[inline]
  pub fn system(&self) -> &'static dyn System {
    self.system
  }

  #[inline]
  pub fn options(&self) -> &'static Options {
    self.options
  }

  #[inline]
  pub fn stats(&self) -> &Stats {
    &self.stats
  }

  /// Number of reserved slots. Some of them may not be published yet.
  #[inline]
  pub fn count(&self) -> usize {
    self.count.load(Ordering::Acquire).min(MAX_ARENAS)
  }

  pub fn get(&self, index: usize) -> Option<&Arena> {
    let ptr = self.slots.get(index)?.load(Ordering::Acquire);
    // published descriptors live for as long as the registry
    NonNull::new(ptr).map(|arena| unsafe { &*arena.as_ptr() })
  }

  /// Published arenas in slot order. Slots that are reserved but still being
  /// published are skipped rather than ending the scan.
  pub fn iter(&self) -> impl Iterator<Item = (usize, &Arena)> + '_ {
    (0..self.count()).filter_map(move |index| self.get(index).map(|arena| (index, arena)))
  }

  pub(crate) fn reserve_slot(&self) -> ArenaResult<usize> {
    let index = self.count.fetch_add(1, Ordering::AcqRel);
    if index >= MAX_ARENAS {
      self.count.fetch_sub(1, Ordering::AcqRel);
      return Err(ArenaError::RegistryFull);
    }
    Ok(index)
  }

  pub(crate) fn publish(&self, index: usize, arena: NonNull<Arena>) {
    self.slots[index].store(arena.as_ptr(), Ordering::Release);
  }

  /// Registers `arena` and returns its slot index.
  ///
  /// On success the registry takes ownership of the descriptor for the rest
  /// of the process.
  pub fn add(&self, arena: NonNull<Arena>) -> ArenaResult<usize> {
    let index = self.reserve_slot()?;
    self.publish(index, arena);
    log::debug!("published arena {index} at {:p}", arena.as_ptr());
    Ok(index)
  }

  #[inline]
  pub const fn is_eligible(size: usize, alignment: usize) -> bool {
    alignment <= SEGMENT_ALIGN && size >= MIN_OBJ_SIZE && size <= MAX_OBJ_SIZE
  }

  fn alloc_in(
    &self,
    blocks: usize,
    large: bool,
    accept: impl Fn(NumaNode) -> bool,
  ) -> Option<Allocation> {
    self
      .iter()
      .filter(|(_, arena)| accept(arena.numa_node()) && (large || !arena.is_large()))
      .find_map(|(index, arena)| arena.alloc_from(index, blocks))
  }

  /// Allocates `size` bytes aligned to `alignment`, preferring arenas on the
  /// caller's NUMA node, then other nodes, then the OS.
  ///
  /// `large` allows the result to be backed by large OS pages; arena memory on
  /// large pages is never handed to a caller that did not allow it.
  pub fn alloc_aligned(
    &self,
    size: usize,
    alignment: usize,
    commit: bool,
    large: bool,
  ) -> ArenaResult<Allocation> {
    if size == 0 {
      return Err(ArenaError::InvalidSize);
    }

    if Self::is_eligible(size, alignment) {
      let blocks = divide_up(size, BLOCK_SIZE);
      let node = self.system.current_numa_node();

      let found = self
        .alloc_in(blocks, large, |numa| numa.is_local(node))
        .or_else(|| self.alloc_in(blocks, large, |numa| !numa.is_local(node)));
      if let Some(allocation) = found {
        self.stats.record_claim(blocks * BLOCK_SIZE);
        return Ok(allocation);
      }
    }

    self.alloc_from_os(size, alignment, commit, large)
  }

  /// Allocates at the strictest alignment arena blocks are guaranteed to
  /// have, so eligible sizes can be served from an arena.
  pub fn alloc(&self, size: usize, commit: bool, large: bool) -> ArenaResult<Allocation> {
    self.alloc_aligned(size, SEGMENT_ALIGN, commit, large)
  }

  fn alloc_from_os(
    &self,
    size: usize,
    alignment: usize,
    commit: bool,
    large: bool,
  ) -> ArenaResult<Allocation> {
    let large = large && self.options.large_os_pages();
    let options = if commit {
      SysOption::Commit
    } else {
      SysOption::Reserve
    };

    let mapping = unsafe { self.system.alloc_aligned(size, alignment, options, large) }?;
    self.stats.record_os_alloc(size);
    log::debug!("os fallback: {size} bytes at {:p}", mapping.region.cast::<u8>().as_ptr());

    Ok(Allocation::new(
      mapping.region.cast(),
      MemId::Os,
      commit,
      mapping.large,
      true,
    ))
  }

  /// Returns memory obtained from `alloc_aligned`.
  ///
  /// A `memid` that does not match the registry, or a run that is not fully
  /// allocated, is reported as `ArenaError::Corrupted` and leaves the
  /// registry untouched apart from the bits that were actually set.
  pub fn free(&self, ptr: NonNull<u8>, size: usize, memid: MemId) -> ArenaResult<()> {
    if size == 0 {
      return Ok(());
    }

    match memid {
      MemId::Os => {
        unsafe { self.system.free(NonNull::slice_from_raw_parts(ptr, size)) }?;
        self.stats.record_os_free(size);
        Ok(())
      }
      MemId::Arena { arena, bitmap } => self.free_blocks(ptr, size, memid, arena, bitmap),
    }
  }

  fn free_blocks(
    &self,
    ptr: NonNull<u8>,
    size: usize,
    memid: MemId,
    arena_index: usize,
    bitmap: BitmapIndex,
  ) -> ArenaResult<()> {
    let (ptr, memid) = (ptr.as_ptr() as usize, memid.to_raw());

    let Some(arena) = self.get(arena_index) else {
      return Err(Self::corrupted(Corruption::UnknownArena { ptr, size, memid }));
    };
    if bitmap.field() >= arena.field_count() {
      return Err(Self::corrupted(Corruption::BlockOutOfRange { ptr, size, memid }));
    }

    let blocks = divide_up(size, BLOCK_SIZE);
    match arena.blocks_map().unclaim(blocks, bitmap) {
      Ok(true) => {
        self.stats.record_release(blocks * BLOCK_SIZE);
        Ok(())
      }
      Ok(false) => Err(Self::corrupted(Corruption::DoubleFree { ptr, size, memid })),
      Err(_) => Err(Self::corrupted(Corruption::BlockOutOfRange { ptr, size, memid })),
    }
  }

  fn corrupted(corruption: Corruption) -> ArenaError {
    log::error!("{corruption}");
    ArenaError::Corrupted(corruption)
  }
}

#[cfg(test)]
mod tests;
