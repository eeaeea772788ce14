use core::sync::atomic::{
  AtomicUsize,
  Ordering,
};

/// Byte counters for memory flowing through the arena layer.
#[derive(Debug, Default)]
pub struct Stats {
  os_allocated: AtomicUsize,
  os_freed: AtomicUsize,
  huge_reserved: AtomicUsize,
  arena_claimed: AtomicUsize,
  arena_released: AtomicUsize,
}

impl Stats {
  pub const fn new() -> Self {
    Self {
      os_allocated: AtomicUsize::new(0),
      os_freed: AtomicUsize::new(0),
      huge_reserved: AtomicUsize::new(0),
      arena_claimed: AtomicUsize::new(0),
      arena_released: AtomicUsize::new(0),
    }
  }

  pub fn os_allocated(&self) -> usize {
    self.os_allocated.load(Ordering::Relaxed)
  }

  pub fn os_freed(&self) -> usize {
    self.os_freed.load(Ordering::Relaxed)
  }

  pub fn huge_reserved(&self) -> usize {
    self.huge_reserved.load(Ordering::Relaxed)
  }

  pub fn arena_claimed(&self) -> usize {
    self.arena_claimed.load(Ordering::Relaxed)
  }

  pub fn arena_released(&self) -> usize {
    self.arena_released.load(Ordering::Relaxed)
  }

  pub(crate) fn record_os_alloc(&self, bytes: usize) {
    self.os_allocated.fetch_add(bytes, Ordering::Relaxed);
  }

  pub(crate) fn record_os_free(&self, bytes: usize) {
    self.os_freed.fetch_add(bytes, Ordering::Relaxed);
  }

  pub(crate) fn record_huge_reserve(&self, bytes: usize) {
    self.huge_reserved.fetch_add(bytes, Ordering::Relaxed);
  }

  pub(crate) fn record_claim(&self, bytes: usize) {
    self.arena_claimed.fetch_add(bytes, Ordering::Relaxed);
  }

  pub(crate) fn record_release(&self, bytes: usize) {
    self.arena_released.fetch_add(bytes, Ordering::Relaxed);
  }
}
