use core::{
  mem::ManuallyDrop,
  ptr::NonNull,
  sync::atomic::{
    AtomicUsize,
    Ordering,
  },
};

use arenalloc_bitmap::{
  Bitmap,
  BitmapIndex,
  BitmapWord,
};
use arenalloc_sys::{
  extent::Extent,
  math::{
    align_up,
    is_aligned,
  },
  system::{
    SysOption,
    System,
  },
};
use getset::{
  CopyGetters,
  Getters,
};

use crate::{
  config::{
    BLOCK_SIZE,
    FIELD_BITS,
    SEGMENT_ALIGN,
  },
  error::{
    ArenaError,
    ArenaResult,
  },
  memid::MemId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumaNode {
  Any,
  At(usize),
}

impl NumaNode {
  /// Whether a thread running on `current` counts as local to this node.
  #[inline]
  pub const fn is_local(self, current: usize) -> bool {
    match self {
      NumaNode::Any => true,
      NumaNode::At(node) => node == current,
    }
  }

  pub const fn normalize(self, nodes: usize) -> Self {
    match self {
      NumaNode::At(node) if nodes > 0 => NumaNode::At(node % nodes),
      other => other,
    }
  }

  pub const fn as_option(self) -> Option<usize> {
    match self {
      NumaNode::Any => None,
      NumaNode::At(node) => Some(node),
    }
  }
}

impl From<Option<usize>> for NumaNode {
  fn from(node: Option<usize>) -> Self {
    node.map_or(NumaNode::Any, NumaNode::At)
  }
}

/// What a successful arena or OS allocation hands back to the caller.
#[derive(Debug, Clone, Copy, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Allocation {
  ptr: NonNull<u8>,
  memid: MemId,
  commit: bool,
  large: bool,
  zero: bool,
}

impl Allocation {
  pub(crate) const fn new(ptr: NonNull<u8>, memid: MemId, commit: bool, large: bool, zero: bool) -> Self {
    Self {
      ptr,
      memid,
      commit,
      large,
      zero,
    }
  }
}

unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

/// Descriptor of one contiguous region carved into `BLOCK_SIZE` blocks.
///
/// The descriptor and both of its bitmaps live in a single OS mapping that the
/// descriptor owns. The region itself is only borrowed; whoever created the
/// arena decides how it is returned to the system.
#[derive(Getters, CopyGetters)]
pub struct Arena {
  #[getset(get_copy = "pub")]
  region: NonNull<[u8]>,
  #[getset(get_copy = "pub")]
  block_count: usize,
  #[getset(get_copy = "pub")]
  field_count: usize,
  #[getset(get_copy = "pub")]
  numa_node: NumaNode,
  #[getset(get_copy = "pub")]
  is_large: bool,
  #[getset(get_copy = "pub")]
  is_zero_init: bool,
  search_idx: AtomicUsize,
  #[getset(get = "pub")]
  blocks_map: Bitmap<'static>,
  #[getset(get = "pub")]
  blocks_dirty: Bitmap<'static>,
  storage: ManuallyDrop<Extent>,
}

impl Arena {
  fn bitmap_offset() -> usize {
    let header = core::mem::size_of::<Self>();
    let align = core::mem::align_of::<BitmapWord>();
    // both are tiny, overflow is impossible
    align_up(header, align).unwrap_or(header)
  }

  /// Builds a descriptor for `region` in fresh OS memory from `system`.
  ///
  /// The region must be `SEGMENT_ALIGN` aligned; only whole blocks are used.
  pub fn new(
    system: &'static dyn System,
    region: NonNull<[u8]>,
    numa_node: NumaNode,
    is_large: bool,
    is_zero_init: bool,
  ) -> ArenaResult<NonNull<Self>> {
    let start = region.cast::<u8>().as_ptr() as usize;
    let block_count = region.len() / BLOCK_SIZE;
    if block_count == 0 || is_aligned(start, SEGMENT_ALIGN) != Some(true) {
      return Err(ArenaError::InvalidRegion);
    }
    let field_count = Bitmap::words(block_count);

    let offset = Self::bitmap_offset();
    let size = offset + 2 * Bitmap::bytes(block_count);
    let mut storage = Extent::new_in(system, size, SysOption::Commit)?;

    let base = storage.as_mut_ptr();
    let words = base.wrapping_add(offset) as *mut BitmapWord;
    for i in 0..2 * field_count {
      unsafe { words.add(i).write(BitmapWord::new(0)) };
    }
    let (blocks_map, blocks_dirty) = unsafe {
      (
        Bitmap::new(core::slice::from_raw_parts(words, field_count)),
        Bitmap::new(core::slice::from_raw_parts(words.add(field_count), field_count)),
      )
    };

    // never hand out the bits past `block_count` in the last field
    let post = field_count * FIELD_BITS - block_count;
    if post > 0 {
      let idx = BitmapIndex::new(field_count - 1, FIELD_BITS - post);
      blocks_map
        .claim(post, idx)
        .map_err(|_| ArenaError::InvalidRegion)?;
    }

    let arena = Self {
      region,
      block_count,
      field_count,
      numa_node,
      is_large,
      is_zero_init,
      search_idx: AtomicUsize::new(0),
      blocks_map,
      blocks_dirty,
      storage: ManuallyDrop::new(storage),
    };

    let this = base as *mut Self;
    unsafe {
      this.write(arena);
      Ok(NonNull::new_unchecked(this))
    }
  }

  /// Tears down a descriptor that was never published and returns the region
  /// it described.
  ///
  /// # Safety
  ///
  /// `this` must come from `Arena::new`, must not be reachable from any
  /// registry, and must not be used afterwards.
  pub unsafe fn release(this: NonNull<Self>) -> NonNull<[u8]> {
    let mut arena = unsafe { this.as_ptr().read() };
    let region = arena.region;
    unsafe { ManuallyDrop::drop(&mut arena.storage) };
    region
  }

  #[inline]
  pub fn start(&self) -> NonNull<u8> {
    self.region.cast()
  }

  #[inline]
  pub fn search_idx(&self) -> usize {
    self.search_idx.load(Ordering::Relaxed)
  }

  /// Claims `blocks` contiguous blocks inside one bitmap field, starting the
  /// scan at the field of the last successful claim.
  pub fn claim(&self, blocks: usize) -> Option<BitmapIndex> {
    let fcount = self.field_count;
    let mut idx = self.search_idx.load(Ordering::Relaxed);
    for _ in 0..fcount {
      if idx >= fcount {
        idx = 0;
      }
      if let Some(bitmap_idx) = self.blocks_map.try_claim_field(idx, blocks) {
        self.search_idx.store(idx, Ordering::Relaxed);
        return Some(bitmap_idx);
      }
      idx += 1;
    }
    None
  }

  pub(crate) fn alloc_from(&self, arena_index: usize, blocks: usize) -> Option<Allocation> {
    let bitmap_idx = self.claim(blocks)?;

    // the dirty map only ever gains bits; a run that was clear there has not
    // been handed out since the region was created
    let pristine = self
      .blocks_dirty
      .claim(blocks, bitmap_idx)
      .unwrap_or(false);

    let offset = bitmap_idx.raw() * BLOCK_SIZE;
    let ptr = NonNull::new(self.start().as_ptr().wrapping_add(offset))?;
    Some(Allocation::new(
      ptr,
      MemId::arena(arena_index, bitmap_idx),
      true,
      self.is_large,
      pristine && self.is_zero_init,
    ))
  }

  /// Memory footprint of the descriptor itself.
  pub fn storage_size(&self) -> usize {
    self.storage.len()
  }
}

unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}
