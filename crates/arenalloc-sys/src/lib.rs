#![cfg_attr(not(test), no_std)]

pub mod extent;
pub mod math;
pub mod prim;
pub mod system;
pub mod unix;

pub use system::GLOBAL_SYSTEM;

pub mod prelude {
  pub use super::{
    GLOBAL_SYSTEM,
    extent::{
      Extent,
      ExtentError,
      ExtentResult,
    },
    math::{
      align_down,
      align_up,
      divide_up,
      is_aligned,
    },
    prim::{
      HUGE_PAGE_SIZE,
      LARGE_PAGE_SIZE,
      is_page_aligned,
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
}
