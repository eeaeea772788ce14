use arenalloc_sys::{
  extent::ExtentError,
  system::SysError,
};
use thiserror::Error;

/// A free request that does not match the allocator's bookkeeping. These are
/// caller bugs and are never recovered from locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Corruption {
  #[error("trying to free from non-existent arena: {ptr:#x}, size {size}, memid: {memid:#x}")]
  UnknownArena { ptr: usize, size: usize, memid: usize },

  #[error("trying to free from non-existent arena block: {ptr:#x}, size {size}, memid: {memid:#x}")]
  BlockOutOfRange { ptr: usize, size: usize, memid: usize },

  #[error("trying to free an already freed block: {ptr:#x}, size {size}, memid: {memid:#x}")]
  DoubleFree { ptr: usize, size: usize, memid: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArenaError {
  #[error("out of memory")]
  OutOfMemory,

  #[error("arena registry is full")]
  RegistryFull,

  #[error("zero-sized request")]
  InvalidSize,

  #[error("arena region is empty or not segment aligned")]
  InvalidRegion,

  #[error("system error: {0:?}")]
  System(SysError),

  #[error("{0}")]
  Corrupted(#[from] Corruption),
}

impl ArenaError {
  /// Whether this error means the allocator's state can no longer be trusted.
  pub const fn is_fatal(&self) -> bool {
    matches!(self, ArenaError::Corrupted(_))
  }
}

impl From<SysError> for ArenaError {
  fn from(err: SysError) -> Self {
    match err {
      SysError::OutOfMemory => ArenaError::OutOfMemory,
      other => ArenaError::System(other),
    }
  }
}

impl From<ExtentError> for ArenaError {
  fn from(err: ExtentError) -> Self {
    match err {
      ExtentError::SystemError(err) => err.into(),
      ExtentError::PrimError(_) => ArenaError::OutOfMemory,
    }
  }
}

pub type ArenaResult<T> = Result<T, ArenaError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_only_corruption_is_fatal() {
    let corrupt = ArenaError::from(Corruption::DoubleFree {
      ptr: 0x1000,
      size: 64,
      memid: 0x101,
    });
    assert!(corrupt.is_fatal());
    assert!(!ArenaError::OutOfMemory.is_fatal());
    assert!(!ArenaError::RegistryFull.is_fatal());
  }

  #[test]
  fn test_sys_error_mapping() {
    assert_eq!(ArenaError::from(SysError::OutOfMemory), ArenaError::OutOfMemory);
    assert_eq!(
      ArenaError::from(SysError::Unsupported),
      ArenaError::System(SysError::Unsupported)
    );
  }

  #[test]
  fn test_corruption_message() {
    let err = Corruption::UnknownArena {
      ptr: 0x2000,
      size: 32,
      memid: 0x42,
    };
    assert_eq!(
      err.to_string(),
      "trying to free from non-existent arena: 0x2000, size 32, memid: 0x42"
    );
  }
}
