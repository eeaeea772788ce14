#![cfg_attr(not(test), no_std)]

pub use arenalloc::prelude::*;
use core::{
  ffi::c_int,
  ptr::{
    self,
    NonNull,
  },
  time::Duration,
};

mod handler;

fn status(result: ArenaResult<()>) -> c_int {
  match result {
    Ok(()) => 0,
    Err(_) => libc::ENOMEM,
  }
}

unsafe fn store<T>(out: *mut T, value: T) {
  if !out.is_null() {
    unsafe { out.write(value) };
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn ba_page_size() -> usize {
  page_size()
}

/// A negative `numa_node` means any node.
#[unsafe(no_mangle)]
pub extern "C" fn ba_reserve_huge_os_pages_at(pages: usize, numa_node: c_int, timeout_ms: usize) -> c_int {
  let node = usize::try_from(numa_node).ok();
  status(arenalloc::reserve_huge_pages_at(
    pages,
    node,
    Duration::from_millis(timeout_ms as u64),
  ))
}

#[unsafe(no_mangle)]
pub extern "C" fn ba_reserve_huge_os_pages_interleave(pages: usize, timeout_ms: usize) -> c_int {
  status(arenalloc::reserve_huge_pages_interleaved(
    pages,
    Duration::from_millis(timeout_ms as u64),
  ))
}

/// # Safety
///
/// `pages_reserved` must be null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ba_reserve_huge_os_pages(
  pages: usize,
  max_secs: f64,
  pages_reserved: *mut usize,
) -> c_int {
  unsafe { store(pages_reserved, 0) };
  #[allow(deprecated)]
  let result = arenalloc::reserve_huge_pages(pages, max_secs);
  match result {
    Ok(reserved) => {
      unsafe { store(pages_reserved, reserved) };
      0
    }
    Err(_) => libc::ENOMEM,
  }
}

/// Allocates from the arenas or the OS. `commit` and `large` are read as the
/// request ("commit now", "large pages are acceptable") and written back with
/// what the returned memory actually is.
///
/// # Safety
///
/// Every out pointer must be null or valid for writes; `commit` and `large`
/// must be null or valid for reads too.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ba_arena_alloc(
  size: usize,
  alignment: usize,
  commit: *mut bool,
  large: *mut bool,
  is_zero: *mut bool,
  memid: *mut usize,
) -> *mut u8 {
  let want_commit = !commit.is_null() && unsafe { commit.read() };
  let allow_large = !large.is_null() && unsafe { large.read() };
  match arenalloc::alloc_aligned(size, alignment, want_commit, allow_large) {
    Ok(allocation) => unsafe {
      store(commit, allocation.commit());
      store(large, allocation.large());
      store(is_zero, allocation.zero());
      store(memid, allocation.memid().to_raw());
      allocation.ptr().as_ptr()
    },
    Err(_) => ptr::null_mut(),
  }
}

/// Returns memory from `ba_arena_alloc`. A free that does not match the
/// allocator's bookkeeping aborts the process.
#[unsafe(no_mangle)]
pub extern "C" fn ba_arena_free(ptr: *mut u8, size: usize, memid: usize) {
  let Some(ptr) = NonNull::new(ptr) else {
    return;
  };
  if let Err(err) = arenalloc::free(ptr, size, MemId::from_raw(memid)) {
    if err.is_fatal() {
      panic!("{err}");
    }
  }
}
