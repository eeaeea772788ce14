use super::*;
use crate::{
  config::FIELD_BITS,
  testing::{
    self,
    MockSystem,
  },
};
use std::{
  sync::{
    Arc,
    Barrier,
  },
  thread,
  vec::Vec,
};

fn arena_index(allocation: &Allocation) -> usize {
  match allocation.memid() {
    MemId::Arena { arena, .. } => arena,
    MemId::Os => panic!("expected arena memory"),
  }
}

#[test]
fn test_eligibility_boundaries() {
  assert!(Arenas::is_eligible(MIN_OBJ_SIZE, SEGMENT_ALIGN));
  assert!(Arenas::is_eligible(MAX_OBJ_SIZE, SEGMENT_ALIGN));
  assert!(Arenas::is_eligible(BLOCK_SIZE, 1));
  assert!(!Arenas::is_eligible(MIN_OBJ_SIZE - 1, SEGMENT_ALIGN));
  assert!(!Arenas::is_eligible(MAX_OBJ_SIZE + 1, SEGMENT_ALIGN));
  assert!(!Arenas::is_eligible(BLOCK_SIZE, 2 * SEGMENT_ALIGN));
  assert!(!Arenas::is_eligible(BLOCK_SIZE, BLOCK_SIZE));
}

#[test]
fn test_zero_size_is_rejected() {
  let arenas = testing::registry(MockSystem::leaked(1));
  assert_eq!(
    arenas.alloc_aligned(0, BLOCK_SIZE, true, false).err(),
    Some(ArenaError::InvalidSize)
  );
}

#[test]
fn test_empty_registry_falls_back_to_os() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);

  let allocation = arenas.alloc(BLOCK_SIZE, false, false).unwrap();
  assert_eq!(allocation.memid(), MemId::Os);
  assert!(allocation.zero());
  assert!(!allocation.commit());
  assert!(!allocation.large());
  assert_eq!(allocation.ptr().as_ptr() as usize % SEGMENT_ALIGN, 0);
  assert_eq!(
    system.os_calls(),
    [testing::OsCall {
      size: BLOCK_SIZE,
      align: SEGMENT_ALIGN,
      options: SysOption::Reserve,
      large: false,
    }]
  );
  assert_eq!(arenas.stats().os_allocated(), BLOCK_SIZE);

  arenas.free(allocation.ptr(), BLOCK_SIZE, allocation.memid()).unwrap();
  assert_eq!(system.os_frees.load(Ordering::Relaxed), 1);
  assert_eq!(arenas.stats().os_freed(), BLOCK_SIZE);
}

#[test]
fn test_large_os_pages_follow_options() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);

  let plain = arenas.alloc(BLOCK_SIZE, true, true).unwrap();
  assert!(!plain.large());
  assert!(plain.commit());

  arenas.options().set_large_os_pages(true);
  let large = arenas.alloc(BLOCK_SIZE, true, true).unwrap();
  assert!(large.large());

  system.deny_large_pages();
  let downgraded = arenas.alloc(BLOCK_SIZE, true, true).unwrap();
  assert!(!downgraded.large());

  let calls = system.os_calls();
  assert_eq!(
    calls.iter().map(|call| call.large).collect::<Vec<_>>(),
    [false, true, true]
  );
}

#[test]
fn test_ineligible_requests_skip_arenas() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);
  arenas
    .add(testing::arena(system, 64, NumaNode::Any, false, true))
    .unwrap();

  for (size, align) in [
    (MIN_OBJ_SIZE - 1, SEGMENT_ALIGN),
    (MAX_OBJ_SIZE + BLOCK_SIZE, SEGMENT_ALIGN),
    (BLOCK_SIZE, 2 * SEGMENT_ALIGN),
    (BLOCK_SIZE, BLOCK_SIZE),
  ] {
    let allocation = arenas.alloc_aligned(size, align, true, true).unwrap();
    assert!(allocation.memid().is_os(), "size {size} align {align}");
  }
  assert_eq!(arenas.stats().arena_claimed(), 0);
}

#[test]
fn test_size_bounds_are_served_from_arenas() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);
  let index = arenas
    .add(testing::arena(system, 2 * FIELD_BITS, NumaNode::Any, false, true))
    .unwrap();

  let smallest = arenas.alloc_aligned(MIN_OBJ_SIZE, SEGMENT_ALIGN, true, false).unwrap();
  assert_eq!(arena_index(&smallest), index);
  let largest = arenas.alloc_aligned(MAX_OBJ_SIZE, SEGMENT_ALIGN, true, false).unwrap();
  assert_eq!(arena_index(&largest), index);
  assert_eq!(largest.ptr().as_ptr() as usize % SEGMENT_ALIGN, 0);

  assert!(system.os_calls().is_empty());
  assert_eq!(
    arenas.stats().arena_claimed(),
    BLOCK_SIZE + MAX_OBJ_SIZE
  );
}

#[test]
fn test_alloc_is_served_from_arenas() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);
  let index = arenas
    .add(testing::arena(system, 64, NumaNode::Any, false, true))
    .unwrap();

  let allocation = arenas.alloc(BLOCK_SIZE, true, false).unwrap();
  assert_eq!(arena_index(&allocation), index);
  assert_eq!(allocation.ptr(), arenas.get(index).unwrap().start());
  assert!(system.os_calls().is_empty());
}

#[test]
fn test_rounds_up_to_whole_blocks() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);
  let index = arenas
    .add(testing::arena(system, 64, NumaNode::Any, false, true))
    .unwrap();

  let allocation = arenas.alloc(MIN_OBJ_SIZE, true, false).unwrap();
  assert_eq!(arena_index(&allocation), index);
  assert!(allocation.zero());

  let next = arenas.alloc(BLOCK_SIZE + 1, true, false).unwrap();
  assert_eq!(
    next.ptr().as_ptr() as usize - allocation.ptr().as_ptr() as usize,
    BLOCK_SIZE
  );
  assert_eq!(arenas.stats().arena_claimed(), 3 * BLOCK_SIZE);
  assert_eq!(arenas.get(index).unwrap().blocks_map().count_claimed(), 3);
}

#[test]
fn test_prefers_local_numa_node() {
  let system = MockSystem::leaked(2);
  let arenas = testing::registry(system);
  let remote = arenas
    .add(testing::arena(system, 64, NumaNode::At(1), false, true))
    .unwrap();
  let local = arenas
    .add(testing::arena(system, 64, NumaNode::At(0), false, true))
    .unwrap();

  system.set_current_node(0);
  let allocation = arenas.alloc(BLOCK_SIZE, true, false).unwrap();
  assert_eq!(arena_index(&allocation), local);

  system.set_current_node(1);
  let allocation = arenas.alloc(BLOCK_SIZE, true, false).unwrap();
  assert_eq!(arena_index(&allocation), remote);
}

#[test]
fn test_falls_back_to_remote_node() {
  let system = MockSystem::leaked(2);
  let arenas = testing::registry(system);
  let remote = arenas
    .add(testing::arena(system, 64, NumaNode::At(1), false, true))
    .unwrap();

  system.set_current_node(0);
  let allocation = arenas.alloc(BLOCK_SIZE, true, false).unwrap();
  assert_eq!(arena_index(&allocation), remote);
  assert!(system.os_calls().is_empty());
}

#[test]
fn test_any_node_counts_as_local() {
  let system = MockSystem::leaked(2);
  let arenas = testing::registry(system);
  arenas
    .add(testing::arena(system, 64, NumaNode::At(0), false, true))
    .unwrap();
  let any = arenas
    .add(testing::arena(system, 64, NumaNode::Any, false, true))
    .unwrap();

  system.set_current_node(1);
  let allocation = arenas.alloc(BLOCK_SIZE, true, false).unwrap();
  assert_eq!(arena_index(&allocation), any);
}

#[test]
fn test_large_arenas_need_consent() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);
  let large = arenas
    .add(testing::arena(system, 64, NumaNode::Any, true, true))
    .unwrap();

  let refused = arenas.alloc(BLOCK_SIZE, true, false).unwrap();
  assert!(refused.memid().is_os());

  let allowed = arenas.alloc(BLOCK_SIZE, true, true).unwrap();
  assert_eq!(arena_index(&allowed), large);
  assert!(allowed.large());
}

#[test]
fn test_exhausted_arena_falls_back_to_os() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);
  arenas
    .add(testing::arena(system, 2, NumaNode::Any, false, true))
    .unwrap();

  let first = arenas.alloc(2 * BLOCK_SIZE, true, false).unwrap();
  assert!(!first.memid().is_os());
  let second = arenas.alloc(BLOCK_SIZE, true, false).unwrap();
  assert!(second.memid().is_os());

  arenas.free(first.ptr(), 2 * BLOCK_SIZE, first.memid()).unwrap();
  let third = arenas.alloc(BLOCK_SIZE, true, false).unwrap();
  assert_eq!(third.ptr(), first.ptr());
  assert!(!third.zero());
}

#[test]
fn test_free_returns_blocks() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);
  let index = arenas
    .add(testing::arena(system, 64, NumaNode::Any, false, true))
    .unwrap();

  let allocation = arenas.alloc(3 * BLOCK_SIZE, true, false).unwrap();
  arenas
    .free(allocation.ptr(), 3 * BLOCK_SIZE, allocation.memid())
    .unwrap();

  assert_eq!(arenas.get(index).unwrap().blocks_map().count_claimed(), 0);
  assert_eq!(arenas.stats().arena_released(), 3 * BLOCK_SIZE);
}

#[test]
fn test_zero_size_free_is_a_no_op() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);
  let bogus = MemId::arena(42, BitmapIndex::new(0, 0));
  assert_eq!(arenas.free(NonNull::dangling(), 0, bogus), Ok(()));
}

#[test]
fn test_double_free_is_corruption() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);
  arenas
    .add(testing::arena(system, 64, NumaNode::Any, false, true))
    .unwrap();

  let allocation = arenas.alloc(BLOCK_SIZE, true, false).unwrap();
  arenas
    .free(allocation.ptr(), BLOCK_SIZE, allocation.memid())
    .unwrap();

  let err = arenas
    .free(allocation.ptr(), BLOCK_SIZE, allocation.memid())
    .unwrap_err();
  assert!(err.is_fatal());
  assert!(matches!(
    err,
    ArenaError::Corrupted(Corruption::DoubleFree { size: BLOCK_SIZE, .. })
  ));
}

#[test]
fn test_unknown_arena_is_corruption() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);
  arenas
    .add(testing::arena(system, 64, NumaNode::Any, false, true))
    .unwrap();

  let memid = MemId::arena(3, BitmapIndex::new(0, 0));
  let err = arenas.free(NonNull::dangling(), BLOCK_SIZE, memid).unwrap_err();
  assert!(matches!(err, ArenaError::Corrupted(Corruption::UnknownArena { .. })));

  let err = arenas
    .free(NonNull::dangling(), BLOCK_SIZE, MemId::from_raw(0x100))
    .unwrap_err();
  assert_eq!(
    err,
    ArenaError::Corrupted(Corruption::UnknownArena {
      ptr: NonNull::<u8>::dangling().as_ptr() as usize,
      size: BLOCK_SIZE,
      memid: 0x100,
    })
  );
}

#[test]
fn test_out_of_range_block_is_corruption() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);
  let index = arenas
    .add(testing::arena(system, 64, NumaNode::Any, false, true))
    .unwrap();

  let memid = MemId::arena(index, BitmapIndex::new(1, 0));
  let err = arenas.free(NonNull::dangling(), BLOCK_SIZE, memid).unwrap_err();
  assert!(matches!(err, ArenaError::Corrupted(Corruption::BlockOutOfRange { .. })));
}

#[test]
fn test_registry_full() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);
  for expected in 0..MAX_ARENAS {
    let index = arenas
      .add(testing::arena(system, 1, NumaNode::Any, false, true))
      .unwrap();
    assert_eq!(index, expected);
  }

  let extra = testing::arena(system, 1, NumaNode::Any, false, true);
  assert_eq!(arenas.add(extra), Err(ArenaError::RegistryFull));
  assert_eq!(arenas.count(), MAX_ARENAS);
  unsafe { Arena::release(extra) };
}

#[test]
fn test_unpublished_slot_is_skipped() {
  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);

  let hole = arenas.reserve_slot().unwrap();
  let index = arenas
    .add(testing::arena(system, 64, NumaNode::Any, false, true))
    .unwrap();
  assert_eq!((hole, index), (0, 1));
  assert_eq!(arenas.count(), 2);
  assert!(arenas.get(hole).is_none());
  assert_eq!(arenas.iter().map(|(i, _)| i).collect::<Vec<_>>(), [1]);

  let allocation = arenas.alloc(BLOCK_SIZE, true, false).unwrap();
  assert_eq!(arena_index(&allocation), index);
}

#[test]
fn test_concurrent_alloc_and_free() {
  const THREADS: usize = 8;
  const ROUNDS: usize = 64;

  let system = MockSystem::leaked(1);
  let arenas = testing::registry(system);
  for _ in 0..2 {
    arenas
      .add(testing::arena(system, 2 * FIELD_BITS, NumaNode::Any, false, true))
      .unwrap();
  }
  let barrier = Arc::new(Barrier::new(THREADS));

  let handles: Vec<_> = (0..THREADS)
    .map(|t| {
      let barrier = Arc::clone(&barrier);
      thread::spawn(move || {
        barrier.wait();
        for round in 0..ROUNDS {
          let size = (1 + (t + round) % 4) * BLOCK_SIZE;
          let allocation = arenas.alloc(size, true, false).unwrap();
          arenas.free(allocation.ptr(), size, allocation.memid()).unwrap();
        }
      })
    })
    .collect();
  for handle in handles {
    handle.join().unwrap();
  }

  for (_, arena) in arenas.iter() {
    assert_eq!(arena.blocks_map().count_claimed(), 0);
  }
  assert_eq!(
    arenas.stats().arena_claimed() + arenas.stats().os_allocated(),
    arenas.stats().arena_released() + arenas.stats().os_freed()
  );
}
