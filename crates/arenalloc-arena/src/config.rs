use core::time::Duration;

pub use arenalloc_bitmap::FIELD_BITS;
pub use arenalloc_sys::prim::HUGE_PAGE_SIZE;

pub const SEGMENT_ALIGN: usize = 4 << 20;
pub const BLOCK_SIZE: usize = 8 * SEGMENT_ALIGN;
pub const MAX_OBJ_SIZE: usize = FIELD_BITS * BLOCK_SIZE;
pub const MIN_OBJ_SIZE: usize = BLOCK_SIZE / 2;

// the memid keeps `index + 1` in its low byte
pub const MAX_ARENAS: usize = 64;
const _: () = assert!(MAX_ARENAS < 0xFE);

/// Added to every node's share of an interleaved reservation timeout.
pub const NUMA_TIMEOUT_FLOOR: Duration = Duration::from_millis(50);
/// Timeout budget per page for reservations requested through options.
pub const RESERVE_TIMEOUT_PER_PAGE: Duration = Duration::from_millis(500);
