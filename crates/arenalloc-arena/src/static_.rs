use spin::Once;

use crate::{
  options::Options,
  registry::Arenas,
};

#[cfg(any(target_os = "linux", target_os = "macos"))]
use arenalloc_sys::unix::UNIX_SYSTEM as SYSTEM;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
static SYSTEM: arenalloc_sys::system::UnsupportedSystem = arenalloc_sys::system::UnsupportedSystem {};

static OPTIONS: Options = Options::new();
static ARENAS: Arenas = Arenas::new(&SYSTEM, &OPTIONS);
static INIT: Once = Once::new();

fn init() {
  INIT.call_once(|| {
    OPTIONS.load_env();
    // a failed startup reservation only means running without huge pages
    let _ = ARENAS.reserve_from_options();
  });
}

/// The process-wide registry. The first call reads the environment and
/// performs any huge page reservation it asks for.
pub fn arenas() -> &'static Arenas {
  init();
  &ARENAS
}

pub fn options() -> &'static Options {
  init();
  &OPTIONS
}
