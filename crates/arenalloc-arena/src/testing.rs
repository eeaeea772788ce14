use std::{
  alloc::Layout,
  ptr::NonNull,
  sync::{
    Mutex,
    atomic::{
      AtomicBool,
      AtomicUsize,
      Ordering,
    },
  },
  time::Duration,
  vec::Vec,
};

use arenalloc_sys::{
  math::align_up,
  prim::HUGE_PAGE_SIZE,
  system::{
    HugePages,
    Mapping,
    SysError,
    SysOption,
    SysResult,
    System,
  },
};

use crate::{
  arena::{
    Arena,
    NumaNode,
  },
  config::{
    BLOCK_SIZE,
    SEGMENT_ALIGN,
  },
  options::Options,
  registry::Arenas,
};

const META_ALIGN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HugeCall {
  pub pages: usize,
  pub node: Option<usize>,
  pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsCall {
  pub size: usize,
  pub align: usize,
  pub options: SysOption,
  pub large: bool,
}

/// System double. Descriptor storage is real heap memory; arena and OS
/// regions are address ranges that are never touched.
pub struct MockSystem {
  cursor: AtomicUsize,
  numa_nodes: usize,
  current_node: AtomicUsize,
  large_pages: AtomicBool,
  huge_budget: AtomicUsize,
  huge_cap: AtomicUsize,
  pub huge_calls: Mutex<Vec<HugeCall>>,
  pub os_calls: Mutex<Vec<OsCall>>,
  pub os_frees: AtomicUsize,
  pub huge_frees: AtomicUsize,
  pub meta_allocs: AtomicUsize,
  pub meta_frees: AtomicUsize,
}

impl MockSystem {
  pub fn new(numa_nodes: usize) -> Self {
    Self {
      cursor: AtomicUsize::new(1 << 40),
      numa_nodes,
      current_node: AtomicUsize::new(0),
      large_pages: AtomicBool::new(true),
      huge_budget: AtomicUsize::new(usize::MAX),
      huge_cap: AtomicUsize::new(usize::MAX),
      huge_calls: Mutex::new(Vec::new()),
      os_calls: Mutex::new(Vec::new()),
      os_frees: AtomicUsize::new(0),
      huge_frees: AtomicUsize::new(0),
      meta_allocs: AtomicUsize::new(0),
      meta_frees: AtomicUsize::new(0),
    }
  }

  pub fn leaked(numa_nodes: usize) -> &'static Self {
    Box::leak(Box::new(Self::new(numa_nodes)))
  }

  pub fn set_current_node(&self, node: usize) {
    self.current_node.store(node, Ordering::Relaxed);
  }

  /// Lets the next `calls` huge page reservations succeed, then fails the rest.
  pub fn fail_huge_after(&self, calls: usize) {
    self.huge_budget.store(calls, Ordering::Relaxed);
  }

  /// Grants at most `pages` per huge reservation, as a timeout would.
  pub fn cap_huge_pages(&self, pages: usize) {
    self.huge_cap.store(pages, Ordering::Relaxed);
  }

  pub fn deny_large_pages(&self) {
    self.large_pages.store(false, Ordering::Relaxed);
  }

  pub fn huge_calls(&self) -> Vec<HugeCall> {
    self.huge_calls.lock().unwrap().clone()
  }

  pub fn os_calls(&self) -> Vec<OsCall> {
    self.os_calls.lock().unwrap().clone()
  }

  pub fn fake_region(&self, size: usize, align: usize) -> NonNull<[u8]> {
    let span = align_up(size, align).unwrap() + align;
    let base = self.cursor.fetch_add(span, Ordering::Relaxed);
    let start = align_up(base, align).unwrap();
    NonNull::slice_from_raw_parts(NonNull::new(start as *mut u8).unwrap(), size)
  }
}

unsafe impl System for MockSystem {
  unsafe fn alloc<'mem>(&self, size: usize, _options: SysOption) -> SysResult<&'mem mut [u8]> {
    let layout = Layout::from_size_align(size, META_ALIGN).map_err(|_| SysError::InvalidArgument)?;
    let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
    if ptr.is_null() {
      return Err(SysError::OutOfMemory);
    }
    self.meta_allocs.fetch_add(1, Ordering::Relaxed);
    Ok(unsafe { core::slice::from_raw_parts_mut(ptr, size) })
  }

  unsafe fn dealloc(&self, slice: &[u8]) -> SysResult<()> {
    let layout =
      Layout::from_size_align(slice.len(), META_ALIGN).map_err(|_| SysError::InvalidArgument)?;
    unsafe { std::alloc::dealloc(slice.as_ptr() as *mut u8, layout) };
    self.meta_frees.fetch_add(1, Ordering::Relaxed);
    Ok(())
  }

  unsafe fn alloc_aligned(
    &self,
    size: usize,
    align: usize,
    options: SysOption,
    large: bool,
  ) -> SysResult<Mapping> {
    self.os_calls.lock().unwrap().push(OsCall {
      size,
      align,
      options,
      large,
    });
    Ok(Mapping {
      region: self.fake_region(size, align.max(META_ALIGN)),
      large: large && self.large_pages.load(Ordering::Relaxed),
    })
  }

  unsafe fn free(&self, _region: NonNull<[u8]>) -> SysResult<()> {
    self.os_frees.fetch_add(1, Ordering::Relaxed);
    Ok(())
  }

  unsafe fn alloc_huge_pages(
    &self,
    pages: usize,
    numa_node: Option<usize>,
    timeout: Duration,
  ) -> SysResult<HugePages> {
    self.huge_calls.lock().unwrap().push(HugeCall {
      pages,
      node: numa_node,
      timeout,
    });

    let spent = self
      .huge_budget
      .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |budget| match budget {
        0 => None,
        usize::MAX => Some(usize::MAX),
        budget => Some(budget - 1),
      });
    if spent.is_err() {
      return Err(SysError::OutOfMemory);
    }

    let granted = pages.min(self.huge_cap.load(Ordering::Relaxed));
    if granted == 0 {
      return Err(SysError::OutOfMemory);
    }
    Ok(HugePages {
      region: self.fake_region(granted * HUGE_PAGE_SIZE, HUGE_PAGE_SIZE),
      pages: granted,
    })
  }

  unsafe fn free_huge_pages(&self, _region: NonNull<[u8]>) -> SysResult<()> {
    self.huge_frees.fetch_add(1, Ordering::Relaxed);
    Ok(())
  }

  fn numa_node_count(&self) -> usize {
    self.numa_nodes
  }

  fn current_numa_node(&self) -> usize {
    self.current_node.load(Ordering::Relaxed)
  }
}

pub fn arena(
  system: &'static MockSystem,
  blocks: usize,
  numa_node: NumaNode,
  is_large: bool,
  is_zero_init: bool,
) -> NonNull<Arena> {
  let region = system.fake_region(blocks * BLOCK_SIZE, SEGMENT_ALIGN);
  Arena::new(system, region, numa_node, is_large, is_zero_init).unwrap()
}

pub fn registry(system: &'static MockSystem) -> &'static Arenas {
  let options: &'static Options = Box::leak(Box::new(Options::new()));
  Box::leak(Box::new(Arenas::new(system, options)))
}
