//! Console - trace output over the host UART
//!
//! The platform layer hands over a sink (normally the host's own UART
//! printf). Task context uses `uart_println!`, which waits for the console
//! lock. Scheduler and fault context use `qprintln!`, which formats into a
//! line buffer on the stack and drops the line when the console is busy.

use core::fmt;
use spin::Mutex;

use crate::crash::diagnostic::FixedWriter;

/// Raw text sink provided by the platform
pub type ConsoleSink = fn(&str);

/// Longest line `qprintln!` emits, newline included
pub const QUICK_LINE: usize = 128;

/// The console: a sink that may not be attached yet
pub struct Console {
    sink: Option<ConsoleSink>,
}

impl Console {
    const fn new() -> Self {
        Self { sink: None }
    }
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(sink) = self.sink {
            sink(s);
        }
        Ok(())
    }
}

/// Global console instance
static CONSOLE: Mutex<Console> = Mutex::new(Console::new());

/// Route all trace output to `sink`
pub fn attach(sink: ConsoleSink) {
    CONSOLE.lock().sink = Some(sink);
}

/// Drop the sink; output is discarded until the next `attach`
pub fn detach() {
    CONSOLE.lock().sink = None;
}

pub fn is_attached() -> bool {
    CONSOLE.lock().sink.is_some()
}

/// Macro for console output (like print!)
#[macro_export]
macro_rules! uart_print {
    ($($arg:tt)*) => {
        $crate::console::_print(format_args!($($arg)*))
    };
}

/// Macro for console output with newline (like println!)
#[macro_export]
macro_rules! uart_println {
    () => ($crate::uart_print!("\n"));
    ($($arg:tt)*) => ($crate::uart_print!("{}\n", format_args!($($arg)*)));
}

/// One line of output that never blocks and never allocates
///
/// Safe to use from the dispatch hook and from fault handlers. Lines longer
/// than [`QUICK_LINE`] are cut.
#[macro_export]
macro_rules! qprintln {
    ($($arg:tt)*) => {
        $crate::console::_qprint(format_args!($($arg)*))
    };
}

/// Internal print function for macro
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    let _ = CONSOLE.lock().write_fmt(args);
}

/// Internal non-blocking print function for macro
#[doc(hidden)]
pub fn _qprint(args: fmt::Arguments) {
    let mut line = [0u8; QUICK_LINE];
    let len = {
        let mut writer = FixedWriter::new(&mut line[..QUICK_LINE - 1]);
        let _ = fmt::write(&mut writer, args);
        writer.len()
    };
    line[len] = b'\n';

    // FixedWriter only cuts on char boundaries
    let Ok(text) = core::str::from_utf8(&line[..=len]) else {
        return;
    };

    if let Some(console) = CONSOLE.try_lock() {
        if let Some(sink) = console.sink {
            sink(text);
        }
    }
}
