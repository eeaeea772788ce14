use core::time::Duration;

use arenalloc_sys::prim::HUGE_PAGE_SIZE;

use crate::{
  arena::{
    Arena,
    NumaNode,
  },
  config::{
    NUMA_TIMEOUT_FLOOR,
    RESERVE_TIMEOUT_PER_PAGE,
  },
  error::{
    ArenaError,
    ArenaResult,
  },
  registry::Arenas,
};

/// Splits `pages` over `nodes` as evenly as possible; the remainder goes one
/// page each to the lowest nodes.
pub fn interleave(pages: usize, nodes: usize) -> impl Iterator<Item = usize> {
  let nodes = nodes.max(1);
  let (per, rem) = (pages / nodes, pages % nodes);
  (0..nodes).map(move |node| per + usize::from(node < rem))
}

impl Arenas {
  /// Reserves `pages` huge OS pages, optionally bound to `numa_node`, and
  /// registers them as a new arena.
  pub fn reserve_huge_pages_at(
    &self,
    pages: usize,
    numa_node: NumaNode,
    timeout: Duration,
  ) -> ArenaResult<()> {
    if pages == 0 {
      return Ok(());
    }
    let system = self.system();
    let numa_node = numa_node.normalize(system.numa_node_count());

    let huge = match unsafe { system.alloc_huge_pages(pages, numa_node.as_option(), timeout) } {
      Ok(huge) if huge.pages > 0 => huge,
      _ => {
        log::warn!("failed to reserve {pages} GiB huge pages");
        return Err(ArenaError::OutOfMemory);
      }
    };
    log::info!("reserved {} GiB huge pages", huge.pages);

    let arena = match Arena::new(system, huge.region, numa_node, true, true) {
      Ok(arena) => arena,
      Err(err) => {
        let _ = unsafe { system.free_huge_pages(huge.region) };
        return Err(match err {
          ArenaError::InvalidRegion => err,
          _ => ArenaError::OutOfMemory,
        });
      }
    };

    if let Err(err) = self.add(arena) {
      log::warn!("no free arena slot for {} GiB huge pages, releasing them", huge.pages);
      let region = unsafe { Arena::release(arena) };
      let _ = unsafe { system.free_huge_pages(region) };
      return Err(err);
    }

    self.stats().record_huge_reserve(huge.pages * HUGE_PAGE_SIZE);
    Ok(())
  }

  /// Spreads `pages` over all NUMA nodes, one arena per node, giving each node
  /// an equal share of `timeout`.
  ///
  /// Stops at the first node that fails; arenas already reserved stay
  /// registered.
  pub fn reserve_huge_pages_interleaved(&self, pages: usize, timeout: Duration) -> ArenaResult<()> {
    if pages == 0 {
      return Ok(());
    }
    let nodes = self.system().numa_node_count().max(1);
    let timeout_per = (timeout / nodes as u32).saturating_add(NUMA_TIMEOUT_FLOOR);

    for (node, node_pages) in interleave(pages, nodes).enumerate() {
      self.reserve_huge_pages_at(node_pages, NumaNode::At(node), timeout_per)?;
    }
    Ok(())
  }

  /// Interleaved reservation with the timeout given in seconds. Returns the
  /// number of pages on success.
  #[deprecated(note = "use `reserve_huge_pages_interleaved` or `reserve_huge_pages_at`")]
  pub fn reserve_huge_pages(&self, pages: usize, max_secs: f64) -> ArenaResult<usize> {
    log::warn!(
      "reserve_huge_pages is deprecated: use reserve_huge_pages_interleaved or reserve_huge_pages_at instead"
    );
    let timeout = match Duration::try_from_secs_f64(max_secs) {
      Ok(timeout) => timeout,
      // too large to represent
      Err(_) if max_secs > 0.0 => Duration::MAX,
      // negative or NaN
      Err(_) => Duration::ZERO,
    };
    self.reserve_huge_pages_interleaved(pages, timeout)?;
    Ok(pages)
  }

  /// Reserves the huge pages requested through `Options`, if any.
  pub fn reserve_from_options(&self) -> ArenaResult<()> {
    let pages = self.options().reserve_huge_os_pages();
    if pages == 0 {
      return Ok(());
    }
    let timeout = RESERVE_TIMEOUT_PER_PAGE.saturating_mul(u32::try_from(pages).unwrap_or(u32::MAX));
    self
      .reserve_huge_pages_interleaved(pages, timeout)
      .inspect_err(|err| log::warn!("startup reservation of {pages} huge pages failed: {err}"))
  }
}
