#![no_std]

use core::{
  ptr::NonNull,
  time::Duration,
};

use arenalloc_arena::prelude::*;

pub mod prelude {
  pub use arenalloc_arena::prelude::*;
  pub use arenalloc_sys::prelude::*;
}

/// Allocates `size` bytes aligned to `alignment` from the process arenas,
/// falling back to the OS.
pub fn alloc_aligned(size: usize, alignment: usize, commit: bool, large: bool) -> ArenaResult<Allocation> {
  arenas().alloc_aligned(size, alignment, commit, large)
}

pub fn alloc(size: usize, commit: bool, large: bool) -> ArenaResult<Allocation> {
  arenas().alloc(size, commit, large)
}

/// Returns memory to wherever `memid` says it came from.
pub fn free(ptr: NonNull<u8>, size: usize, memid: MemId) -> ArenaResult<()> {
  arenas().free(ptr, size, memid)
}

pub fn reserve_huge_pages_at(pages: usize, numa_node: Option<usize>, timeout: Duration) -> ArenaResult<()> {
  arenas().reserve_huge_pages_at(pages, numa_node.into(), timeout)
}

pub fn reserve_huge_pages_interleaved(pages: usize, timeout: Duration) -> ArenaResult<()> {
  arenas().reserve_huge_pages_interleaved(pages, timeout)
}

#[deprecated(note = "use `reserve_huge_pages_interleaved` or `reserve_huge_pages_at`")]
pub fn reserve_huge_pages(pages: usize, max_secs: f64) -> ArenaResult<usize> {
  #[allow(deprecated)]
  let reserved = arenas().reserve_huge_pages(pages, max_secs);
  reserved
}

pub fn stats() -> &'static Stats {
  arenas().stats()
}

pub fn options() -> &'static Options {
  arenalloc_arena::options()
}
