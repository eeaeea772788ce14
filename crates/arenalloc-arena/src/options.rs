use core::sync::atomic::{
  AtomicBool,
  AtomicUsize,
  Ordering,
};

use arenalloc_sys::prim::with_env;

pub const ENV_LARGE_OS_PAGES: &core::ffi::CStr = c"ARENALLOC_LARGE_OS_PAGES";
pub const ENV_RESERVE_HUGE_OS_PAGES: &core::ffi::CStr = c"ARENALLOC_RESERVE_HUGE_OS_PAGES";

/// Runtime switches consulted by the arena layer.
#[derive(Debug)]
pub struct Options {
  large_os_pages: AtomicBool,
  reserve_huge_os_pages: AtomicUsize,
}

impl Options {
  pub const fn new() -> Self {
    Self {
      large_os_pages: AtomicBool::new(false),
      reserve_huge_os_pages: AtomicUsize::new(0),
    }
  }

  #[inline]
  pub fn large_os_pages(&self) -> bool {
    self.large_os_pages.load(Ordering::Relaxed)
  }

  pub fn set_large_os_pages(&self, enabled: bool) {
    self.large_os_pages.store(enabled, Ordering::Relaxed);
  }

  #[inline]
  pub fn reserve_huge_os_pages(&self) -> usize {
    self.reserve_huge_os_pages.load(Ordering::Relaxed)
  }

  pub fn set_reserve_huge_os_pages(&self, pages: usize) {
    self.reserve_huge_os_pages.store(pages, Ordering::Relaxed);
  }

  /// Overrides the current values with whatever is set in the environment.
  pub fn load_env(&self) {
    if let Some(enabled) = with_env(ENV_LARGE_OS_PAGES, parse_bool) {
      self.set_large_os_pages(enabled);
    }
    if let Some(Some(pages)) = with_env(ENV_RESERVE_HUGE_OS_PAGES, parse_count) {
      self.set_reserve_huge_os_pages(pages);
    }
    log::debug!(
      "options: large_os_pages={}, reserve_huge_os_pages={}",
      self.large_os_pages(),
      self.reserve_huge_os_pages()
    );
  }
}

impl Default for Options {
  fn default() -> Self {
    Self::new()
  }
}

fn parse_bool(value: &str) -> bool {
  let value = value.trim();
  ["1", "true", "yes", "on"]
    .iter()
    .any(|truthy| value.eq_ignore_ascii_case(truthy))
}

fn parse_count(value: &str) -> Option<usize> {
  value.trim().parse().ok()
}
