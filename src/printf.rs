use core::fmt::{self, Write};
use core::panic::PanicInfo;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::console;
use crate::cpu;
use crate::spinlock::SpinLock;

pub static PRINTER: Printer = Printer {
    out: SpinLock::new(Sink, "printer"),
    locking: AtomicBool::new(true),
    panicked: AtomicBool::new(false),
};

/// Serialized formatted output to the console.
///
/// `locking` goes false on panic so the dying hart can always get its
/// message out; `panicked` freezes the other harts' UART output so that
/// message stays on screen.
pub struct Printer {
    out: SpinLock<Sink>,
    locking: AtomicBool,
    panicked: AtomicBool,
}

impl Printer {
    pub fn is_panicked(&self) -> bool {
        self.panicked.load(Ordering::Relaxed)
    }
}

struct Sink;

impl fmt::Write for Sink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            console::putc(byte);
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>, newline: bool) {
    if PRINTER.locking.load(Ordering::Relaxed) {
        let mut out = PRINTER.out.lock();
        out.write_fmt(args).expect("printf");
        if newline {
            out.write_char('\n').expect("printf");
        }
    } else {
        // Panicking; the lock no longer matters.
        let out = unsafe { PRINTER.out.get_mut_unchecked() };
        let _ = out.write_fmt(args);
        if newline {
            let _ = out.write_char('\n');
        }
    }
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        $crate::printf::_print(format_args!($($arg)*), false);
    }};
}

#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n");
    };
    ($($arg:tt)*) => {{
        $crate::printf::_print(format_args!($($arg)*), true);
    }};
}

/// Prints the panic once and parks this hart forever. The `panicked` flag
/// makes every other hart's console output spin too, so the first message
/// survives.
pub fn handle_panic(info: &PanicInfo<'_>) -> ! {
    PRINTER.locking.store(false, Ordering::Relaxed);

    let hart = unsafe { cpu::id() };
    println!("hart {} {}", hart, info);

    PRINTER.panicked.store(true, Ordering::Relaxed);

    loop {
        core::hint::spin_loop();
    }
}
