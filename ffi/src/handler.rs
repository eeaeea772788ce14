#![allow(dead_code)]
use core::fmt::{
  self,
  Write,
};

/// Formats into a fixed stack buffer; anything past the end is dropped.
struct StderrBuf {
  buf: [u8; 512],
  len: usize,
}

impl StderrBuf {
  const fn new() -> Self {
    Self {
      buf: [0; 512],
      len: 0,
    }
  }

  fn flush(&mut self) {
    let mut written = 0;
    while written < self.len {
      let rest = &self.buf[written..self.len];
      let n = unsafe { libc::write(libc::STDERR_FILENO, rest.as_ptr().cast(), rest.len()) };
      if n <= 0 {
        break;
      }
      written += n as usize;
    }
    self.len = 0;
  }
}

impl Write for StderrBuf {
  fn write_str(&mut self, s: &str) -> fmt::Result {
    let room = self.buf.len() - self.len;
    let take = s.len().min(room);
    self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
    self.len += take;
    Ok(())
  }
}

#[cfg(not(test))]
#[panic_handler]
pub fn panic_handler(info: &core::panic::PanicInfo) -> ! {
  let mut out = StderrBuf::new();
  let _ = write!(out, "arenalloc: {}", info.message());
  if let Some(loc) = info.location() {
    let _ = write!(out, " at {}:{}:{}", loc.file(), loc.line(), loc.column());
  }
  let _ = out.write_char('\n');
  out.flush();

  unsafe { libc::abort() }
}
