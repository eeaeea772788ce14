use core::{
  ffi::CStr,
  sync::atomic::{
    AtomicUsize,
    Ordering,
  },
};

use crate::math::{
  align_up,
  is_aligned,
};

#[derive(Debug, PartialEq)]
pub enum PrimError {
  InvalidAlignment,
  Overflow,
}

pub type PrimResult<T> = Result<T, PrimError>;

/// Transparent large OS page (2MiB on x86_64 and aarch64 Linux).
pub const LARGE_PAGE_SIZE: usize = 2 << 20;
/// Explicitly reserved huge OS page.
pub const HUGE_PAGE_SIZE: usize = 1 << 30;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const COMMON_PAGE_SIZE: usize = 4096;

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn page_size_helper() -> usize {
  unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn page_size_helper() -> usize {
  COMMON_PAGE_SIZE
}

pub fn page_size() -> usize {
  static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

  let cached = PAGE_SIZE.load(Ordering::Relaxed);
  if cached != 0 {
    return cached;
  }

  let size = page_size_helper();
  PAGE_SIZE.store(size, Ordering::Relaxed);
  size
}

pub fn page_align(value: usize) -> PrimResult<usize> {
  align_up(value, page_size()).ok_or(PrimError::Overflow)
}

pub fn is_page_aligned(value: usize) -> PrimResult<bool> {
  is_aligned(value, page_size()).ok_or(PrimError::InvalidAlignment)
}

/// Runs `f` on the value of the environment variable `name`, if it is set
/// and valid UTF-8.
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub fn with_env<R>(name: &CStr, f: impl FnOnce(&str) -> R) -> Option<R> {
  let value = unsafe { libc::getenv(name.as_ptr()) };
  if value.is_null() {
    return None;
  }

  let value = unsafe { CStr::from_ptr(value) }.to_str().ok()?;
  Some(f(value))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn with_env<R>(name: &CStr, f: impl FnOnce(&str) -> R) -> Option<R> {
  _ = (name, f);
  None
}
