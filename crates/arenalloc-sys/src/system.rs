use core::{
  ptr::NonNull,
  time::Duration,
};

#[cfg(any(target_os = "linux", target_os = "macos"))]
use crate::unix::UNIX_SYSTEM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysError {
  Unsupported,
  OutOfMemory,
  InvalidArgument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysOption {
  Commit,
  Reserve,
}

pub type SysResult<T> = Result<T, SysError>;

/// An aligned OS mapping and whether it ended up backed by large pages.
#[derive(Debug, Clone, Copy)]
pub struct Mapping {
  pub region: NonNull<[u8]>,
  pub large: bool,
}

/// A run of huge OS pages. `pages` may be fewer than requested if the
/// reservation timed out.
#[derive(Debug, Clone, Copy)]
pub struct HugePages {
  pub region: NonNull<[u8]>,
  pub pages: usize,
}

/// Low-level system memory management trait.
///
/// # Safety
///
/// Implementors must ensure that:
/// - `alloc` returns valid, page-aligned, zeroed memory that can be safely accessed
/// - `alloc_aligned` returns a region aligned to the requested alignment
/// - `alloc_huge_pages` returns a region that is huge-page aligned and zeroed
/// - release functions only operate on memory previously handed out by this system
pub unsafe trait System
where
  Self: Send + Sync,
{
  /// Maps `size` bytes of accessible memory.
  ///
  /// # Safety
  ///
  /// Caller must ensure `size` is page-aligned.
  unsafe fn alloc<'mem>(&self, size: usize, options: SysOption) -> SysResult<&'mem mut [u8]> {
    _ = (size, options);
    Err(SysError::Unsupported)
  }

  /// Releases memory previously returned by `alloc`.
  ///
  /// # Safety
  ///
  /// Caller must ensure `slice` came from `alloc` and is not used afterwards.
  unsafe fn dealloc(&self, slice: &[u8]) -> SysResult<()> {
    _ = slice;
    Err(SysError::Unsupported)
  }

  /// Maps at least `size` bytes aligned to `align`, trying large OS pages
  /// first when `large` is set.
  ///
  /// # Safety
  ///
  /// The returned region is only committed for `SysOption::Commit`.
  unsafe fn alloc_aligned(
    &self,
    size: usize,
    align: usize,
    options: SysOption,
    large: bool,
  ) -> SysResult<Mapping> {
    _ = (size, align, options, large);
    Err(SysError::Unsupported)
  }

  /// Releases a region previously returned by `alloc_aligned`.
  ///
  /// # Safety
  ///
  /// Caller must ensure the region is not used afterwards.
  unsafe fn free(&self, region: NonNull<[u8]>) -> SysResult<()> {
    _ = region;
    Err(SysError::Unsupported)
  }

  /// Reserves up to `pages` contiguous huge pages, optionally bound to a NUMA
  /// node, giving up once `timeout` has elapsed.
  ///
  /// # Safety
  ///
  /// The returned region must be released through `free_huge_pages`.
  unsafe fn alloc_huge_pages(
    &self,
    pages: usize,
    numa_node: Option<usize>,
    timeout: Duration,
  ) -> SysResult<HugePages> {
    _ = (pages, numa_node, timeout);
    Err(SysError::Unsupported)
  }

  /// Releases a region previously returned by `alloc_huge_pages`.
  ///
  /// # Safety
  ///
  /// Caller must ensure the region is not used afterwards.
  unsafe fn free_huge_pages(&self, region: NonNull<[u8]>) -> SysResult<()> {
    _ = region;
    Err(SysError::Unsupported)
  }

  fn numa_node_count(&self) -> usize {
    1
  }

  fn current_numa_node(&self) -> usize {
    0
  }
}

pub struct UnsupportedSystem {}
unsafe impl System for UnsupportedSystem {}

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub static GLOBAL_SYSTEM: &dyn System = &UNIX_SYSTEM;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub static GLOBAL_SYSTEM: &dyn System = &UnsupportedSystem {};
