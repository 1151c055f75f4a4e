//! Diagnostic buffer - fixed storage for the last crash message
//!
//! Written from fault context, so nothing here allocates or calls out:
//! formatting goes straight into a fixed byte array and stops at the end.

use core::fmt;

/// Capacity of the crash message, backtrace included
pub const DIAGNOSTIC_CAPACITY: usize = 512;

/// `fmt::Write` into a borrowed byte slice, cutting at the end
///
/// Truncation happens on a char boundary so the contents stay valid UTF-8.
/// Once a write is cut every later write is dropped, so the text never has
/// holes in it.
pub struct FixedWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
    truncated: bool,
}

impl<'a> FixedWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0, truncated: false }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }
}

impl fmt::Write for FixedWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }

        let room = self.buf.len() - self.len;
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }

        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() {
            self.truncated = true;
        }

        // Never report an error: a cut message is still worth keeping
        Ok(())
    }
}

/// The last captured crash or assert message
pub struct DiagnosticBuffer {
    bytes: [u8; DIAGNOSTIC_CAPACITY],
    len: usize,
    truncated: bool,
}

impl DiagnosticBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: [0; DIAGNOSTIC_CAPACITY],
            len: 0,
            truncated: false,
        }
    }

    /// Replace the contents with `args`
    pub fn capture(&mut self, args: fmt::Arguments) -> usize {
        let mut writer = FixedWriter::new(&mut self.bytes);
        let _ = fmt::write(&mut writer, args);
        self.len = writer.len();
        self.truncated = writer.is_truncated();
        self.len
    }

    /// Let `render` fill whatever room is left after the message
    pub fn append_with(&mut self, render: impl FnOnce(&mut dyn fmt::Write)) {
        if self.truncated {
            return;
        }
        let mut writer = FixedWriter::new(&mut self.bytes[self.len..]);
        render(&mut writer);
        self.len += writer.len();
        self.truncated = writer.is_truncated();
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.truncated = false;
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or_default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl Default for DiagnosticBuffer {
    fn default() -> Self {
        Self::new()
    }
}
