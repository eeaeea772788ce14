use crate::{
  prim::{
    PrimError,
    page_align,
  },
  system::{
    SysError,
    SysOption,
    System,
  },
};

#[derive(Debug)]
pub enum ExtentError {
  SystemError(SysError),
  PrimError(PrimError),
}

pub type ExtentResult<T> = Result<T, ExtentError>;

/// A page-granular OS mapping that is returned to its system on drop.
pub struct Extent {
  system: &'static dyn System,
  slice: &'static mut [u8],
}

impl Extent {
  pub fn new(size: usize, options: SysOption) -> ExtentResult<Extent> {
    Self::new_in(crate::GLOBAL_SYSTEM, size, options)
  }

  pub fn new_in(
    system: &'static dyn System,
    size: usize,
    options: SysOption,
  ) -> ExtentResult<Extent> {
    let size = page_align(size).map_err(ExtentError::PrimError)?;
    let slice = unsafe { system.alloc(size, options) }.map_err(ExtentError::SystemError)?;

    Ok(Extent { system, slice })
  }

  #[inline(always)]
  pub fn as_mut_ptr(&mut self) -> *mut u8 {
    self.slice.as_mut_ptr()
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.slice.len()
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.slice.is_empty()
  }
}

impl AsRef<[u8]> for Extent {
  fn as_ref(&self) -> &[u8] {
    self.slice
  }
}

impl AsMut<[u8]> for Extent {
  fn as_mut(&mut self) -> &mut [u8] {
    self.slice
  }
}

impl Drop for Extent {
  fn drop(&mut self) {
    let _ = unsafe { self.system.dealloc(self.slice) };
  }
}
