#[cfg(any(target_os = "linux", target_os = "macos"))]
use core::{
  ptr::NonNull,
  time::Duration,
};

#[cfg(any(target_os = "linux", target_os = "macos"))]
use crate::{
  math::{
    align_up,
    is_aligned,
  },
  prim::{
    HUGE_PAGE_SIZE,
    page_align,
    page_size,
  },
  system::{
    HugePages,
    Mapping,
    SysError,
    SysOption,
    SysResult,
    System,
  },
};

pub struct UnixSystem {}

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub static UNIX_SYSTEM: UnixSystem = UnixSystem {};

#[cfg(any(target_os = "linux", target_os = "macos"))]
impl UnixSystem {
  const fn prot_as(options: SysOption) -> i32 {
    match options {
      SysOption::Commit => libc::PROT_READ | libc::PROT_WRITE,
      SysOption::Reserve => libc::PROT_NONE,
    }
  }

  const fn flags() -> i32 {
    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS
  }

  #[cfg(target_os = "linux")]
  const fn reserve_flags() -> i32 {
    Self::flags() | libc::MAP_NORESERVE
  }

  #[cfg(not(target_os = "linux"))]
  const fn reserve_flags() -> i32 {
    Self::flags()
  }

  #[cfg(target_os = "linux")]
  const fn large_flags() -> Option<i32> {
    Some(libc::MAP_HUGETLB)
  }

  #[cfg(not(target_os = "linux"))]
  const fn large_flags() -> Option<i32> {
    None
  }

  const fn as_c(ptr: *mut u8) -> *mut libc::c_void {
    ptr as *mut libc::c_void
  }

  fn map(size: usize, prot: i32, flags: i32) -> SysResult<NonNull<u8>> {
    let ptr = unsafe { libc::mmap(core::ptr::null_mut(), size, prot, flags, -1, 0) };
    if ptr == libc::MAP_FAILED {
      return Err(SysError::OutOfMemory);
    }
    NonNull::new(ptr as *mut u8).ok_or(SysError::OutOfMemory)
  }

  fn unmap(ptr: *mut u8, size: usize) -> SysResult<()> {
    if size == 0 {
      return Ok(());
    }
    let result = unsafe { libc::munmap(Self::as_c(ptr), size) };
    if result == 0 {
      return Ok(());
    }

    Err(SysError::InvalidArgument)
  }

  /// Maps `size` bytes at an `align` boundary. The first attempt is a plain
  /// mapping; only if that comes back misaligned do we over-map and trim.
  fn map_aligned(size: usize, align: usize, prot: i32, flags: i32) -> SysResult<NonNull<u8>> {
    let ptr = Self::map(size, prot, flags)?;
    if is_aligned(ptr.as_ptr() as usize, align) == Some(true) {
      return Ok(ptr);
    }
    Self::unmap(ptr.as_ptr(), size)?;

    let over = size.checked_add(align).ok_or(SysError::InvalidArgument)?;
    let raw = Self::map(over, prot, flags)?;
    let base = raw.as_ptr() as usize;
    let aligned = align_up(base, align).ok_or(SysError::InvalidArgument)?;
    let pre = aligned - base;
    let post = over - pre - size;

    Self::unmap(raw.as_ptr(), pre)?;
    Self::unmap(raw.as_ptr().wrapping_add(pre + size), post)?;
    NonNull::new(aligned as *mut u8).ok_or(SysError::OutOfMemory)
  }

  fn monotonic() -> Duration {
    let mut ts = libc::timespec {
      tv_sec: 0,
      tv_nsec: 0,
    };
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
  }

  #[cfg(target_os = "linux")]
  fn map_huge_page(addr: *mut u8) -> bool {
    let flags = Self::flags() | libc::MAP_FIXED | libc::MAP_HUGETLB | libc::MAP_HUGE_1GB;
    let prot = Self::prot_as(SysOption::Commit);
    let ptr = unsafe { libc::mmap(Self::as_c(addr), HUGE_PAGE_SIZE, prot, flags, -1, 0) };
    ptr != libc::MAP_FAILED && ptr as *mut u8 == addr
  }

  #[cfg(not(target_os = "linux"))]
  fn map_huge_page(addr: *mut u8) -> bool {
    _ = addr;
    false
  }

  #[cfg(target_os = "linux")]
  fn bind(addr: *mut u8, size: usize, node: usize) {
    const MPOL_PREFERRED: libc::c_long = 1;
    if node >= u64::BITS as usize {
      return;
    }
    let mask: u64 = 1 << node;
    // best effort; the pages stay usable on any node if this fails
    let _ = unsafe {
      libc::syscall(
        libc::SYS_mbind,
        addr,
        size,
        MPOL_PREFERRED,
        &mask as *const u64,
        u64::BITS as libc::c_ulong,
        0 as libc::c_uint,
      )
    };
  }

  #[cfg(not(target_os = "linux"))]
  fn bind(addr: *mut u8, size: usize, node: usize) {
    _ = (addr, size, node);
  }

  #[cfg(target_os = "linux")]
  fn probe_numa_nodes() -> usize {
    const PREFIX: &[u8] = b"/sys/devices/system/node/node";
    const MAX_NODES: usize = 256;

    let mut count = 0;
    let mut path = [0u8; 40];
    path[..PREFIX.len()].copy_from_slice(PREFIX);
    for node in 0..MAX_NODES {
      let mut digits = [0u8; 3];
      let mut len = 0;
      let mut rest = node;
      loop {
        digits[len] = b'0' + (rest % 10) as u8;
        len += 1;
        rest /= 10;
        if rest == 0 {
          break;
        }
      }
      for i in 0..len {
        path[PREFIX.len() + i] = digits[len - 1 - i];
      }
      path[PREFIX.len() + len] = 0;

      let exists = unsafe { libc::access(path.as_ptr() as *const libc::c_char, libc::F_OK) } == 0;
      if !exists {
        break;
      }
      count = node + 1;
    }
    count.max(1)
  }

  #[cfg(not(target_os = "linux"))]
  fn probe_numa_nodes() -> usize {
    1
  }

  #[cfg(target_os = "linux")]
  fn probe_current_node() -> usize {
    let mut cpu: libc::c_uint = 0;
    let mut node: libc::c_uint = 0;
    let result = unsafe {
      libc::syscall(
        libc::SYS_getcpu,
        &mut cpu as *mut libc::c_uint,
        &mut node as *mut libc::c_uint,
        core::ptr::null_mut::<libc::c_void>(),
      )
    };
    if result != 0 {
      return 0;
    }
    node as usize
  }

  #[cfg(not(target_os = "linux"))]
  fn probe_current_node() -> usize {
    0
  }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
unsafe impl System for UnixSystem {
  unsafe fn alloc<'mem>(&self, size: usize, options: SysOption) -> SysResult<&'mem mut [u8]> {
    if crate::prim::is_page_aligned(size) != Ok(true) {
      return Err(SysError::InvalidArgument);
    }
    if size == 0 {
      return Ok(&mut []);
    }

    let ptr = Self::map(size, Self::prot_as(options), Self::flags())?;
    Ok(unsafe { core::slice::from_raw_parts_mut(ptr.as_ptr(), size) })
  }

  unsafe fn dealloc(&self, slice: &[u8]) -> SysResult<()> {
    Self::unmap(slice.as_ptr() as *mut u8, slice.len())
  }

  unsafe fn alloc_aligned(
    &self,
    size: usize,
    align: usize,
    options: SysOption,
    large: bool,
  ) -> SysResult<Mapping> {
    if size == 0 || !align.is_power_of_two() {
      return Err(SysError::InvalidArgument);
    }
    let size = page_align(size).map_err(|_| SysError::InvalidArgument)?;
    let align = align.max(page_size());
    let prot = Self::prot_as(options);
    let flags = match options {
      SysOption::Commit => Self::flags(),
      SysOption::Reserve => Self::reserve_flags(),
    };

    if large {
      if let Some(large_flags) = Self::large_flags() {
        let fits = is_aligned(size, crate::prim::LARGE_PAGE_SIZE) == Some(true)
          && is_aligned(align, crate::prim::LARGE_PAGE_SIZE) == Some(true);
        if fits {
          if let Ok(ptr) = Self::map_aligned(size, align, prot, flags | large_flags) {
            return Ok(Mapping {
              region: NonNull::slice_from_raw_parts(ptr, size),
              large: true,
            });
          }
        }
      }
    }

    let ptr = Self::map_aligned(size, align, prot, flags)?;
    Ok(Mapping {
      region: NonNull::slice_from_raw_parts(ptr, size),
      large: false,
    })
  }

  unsafe fn free(&self, region: NonNull<[u8]>) -> SysResult<()> {
    Self::unmap(region.cast::<u8>().as_ptr(), region.len())
  }

  unsafe fn alloc_huge_pages(
    &self,
    pages: usize,
    numa_node: Option<usize>,
    timeout: Duration,
  ) -> SysResult<HugePages> {
    if pages == 0 {
      return Err(SysError::InvalidArgument);
    }
    let size = pages
      .checked_mul(HUGE_PAGE_SIZE)
      .ok_or(SysError::InvalidArgument)?;

    // reserve the whole range first so the pages end up contiguous
    let base = Self::map_aligned(
      size,
      HUGE_PAGE_SIZE,
      Self::prot_as(SysOption::Reserve),
      Self::reserve_flags(),
    )?;

    let started = Self::monotonic();
    let mut reserved = 0;
    while reserved < pages {
      let addr = base.as_ptr().wrapping_add(reserved * HUGE_PAGE_SIZE);
      if !Self::map_huge_page(addr) {
        break;
      }
      if let Some(node) = numa_node {
        Self::bind(addr, HUGE_PAGE_SIZE, node);
      }
      reserved += 1;

      if Self::monotonic().saturating_sub(started) > timeout {
        break;
      }
    }

    let tail = base.as_ptr().wrapping_add(reserved * HUGE_PAGE_SIZE);
    Self::unmap(tail, (pages - reserved) * HUGE_PAGE_SIZE)?;
    if reserved == 0 {
      return Err(SysError::OutOfMemory);
    }

    Ok(HugePages {
      region: NonNull::slice_from_raw_parts(base, reserved * HUGE_PAGE_SIZE),
      pages: reserved,
    })
  }

  unsafe fn free_huge_pages(&self, region: NonNull<[u8]>) -> SysResult<()> {
    Self::unmap(region.cast::<u8>().as_ptr(), region.len())
  }

  fn numa_node_count(&self) -> usize {
    use core::sync::atomic::{
      AtomicUsize,
      Ordering,
    };
    static NODES: AtomicUsize = AtomicUsize::new(0);

    let cached = NODES.load(Ordering::Relaxed);
    if cached != 0 {
      return cached;
    }
    let nodes = Self::probe_numa_nodes();
    NODES.store(nodes, Ordering::Relaxed);
    nodes
  }

  fn current_numa_node(&self) -> usize {
    let nodes = self.numa_node_count();
    if nodes <= 1 {
      return 0;
    }
    Self::probe_current_node() % nodes
  }
}
