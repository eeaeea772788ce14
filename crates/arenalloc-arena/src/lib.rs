#![cfg_attr(not(test), no_std)]

pub mod arena;
pub mod config;
pub mod error;
pub mod huge;
pub mod memid;
pub mod options;
pub mod registry;
pub mod static_;
pub mod stats;

#[cfg(test)]
mod testing;

pub use static_::{
  arenas,
  options,
};

pub mod prelude {
  pub use super::{
    arena::{
      Allocation,
      Arena,
      NumaNode,
    },
    arenas,
    config::{
      BLOCK_SIZE,
      MAX_ARENAS,
      MAX_OBJ_SIZE,
      MIN_OBJ_SIZE,
      SEGMENT_ALIGN,
    },
    error::{
      ArenaError,
      ArenaResult,
      Corruption,
    },
    huge::interleave,
    memid::MemId,
    options,
    options::Options,
    registry::Arenas,
    stats::Stats,
  };
}
