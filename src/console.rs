//! Console input and output, layered on the UART.
//!
//! Reads hand back one line at a time and support a little editing:
//! newline ends a line, ^H or delete erases a character, ^U erases the
//! line, ^D is end-of-file, and ^P dumps the process table.

use crate::error::{KernelError, Result};
use crate::file::{self, CONSOLE, Device};
use crate::proc::{self, Addr, Chan, PROC_TABLE};
use crate::spinlock::SpinLock;
use crate::uart;

/// Control-x
const fn ctrl(c: u8) -> u8 {
    c.wrapping_sub(b'@')
}

const INPUT_BUF_SIZE: usize = 128;

static CONS: SpinLock<Cons> = SpinLock::new(Cons::new(), "cons");

struct Cons {
    buf: [u8; INPUT_BUF_SIZE],
    /// read index
    r: usize,
    /// write index: end of the last completed line
    w: usize,
    /// edit index: current editing position
    e: usize,
}

impl Cons {
    const fn new() -> Self {
        Self {
            buf: [0; INPUT_BUF_SIZE],
            r: 0,
            w: 0,
            e: 0,
        }
    }
}

/// One output byte, for printf and echo.
pub fn putc(c: u8) {
    uart::putc_sync(c);
}

/// Erase one echoed character: back up, blank it, back up again.
fn backspace() {
    putc(0x08);
    putc(b' ');
    putc(0x08);
}

/// User writes to the console land here via the device switch.
fn write(src: Addr, n: usize) -> Result<usize> {
    for i in 0..n {
        let mut c = [0u8];
        if proc::either_copy_in(&mut c, src.offset(i)).is_err() {
            return Ok(i);
        }
        uart::putc(c[0]);
    }

    Ok(n)
}

/// User reads land here; copies up to one whole input line to `dst`.
fn read(dst: Addr, n: usize) -> Result<usize> {
    let mut cons = CONS.lock();

    let target = n;
    let mut n = n;
    let mut dst = dst;

    while n > 0 {
        // until the interrupt handler has queued input
        while cons.r == cons.w {
            if proc::current().killed() {
                return Err(KernelError::Killed);
            }
            cons = proc::sleep(Chan::Input, cons);
        }

        let c = cons.buf[cons.r % INPUT_BUF_SIZE];
        cons.r += 1;

        if c == ctrl(b'D') {
            // end-of-file
            if n < target {
                // Save ^D for next time, so the caller sees a zero-byte
                // read then.
                cons.r -= 1;
            }
            break;
        }

        if proc::either_copy_out(&[c], dst).is_err() {
            break;
        }

        dst = dst.offset(1);
        n -= 1;

        if c == b'\n' {
            // a whole line has arrived; return it
            break;
        }
    }

    Ok(target - n)
}

/// Console input interrupt handler: line editing, echo, and waking
/// readers once a line (or EOF) is complete. `uart::intr` calls this for
/// each received byte.
pub fn intr(c: u8) {
    let mut cons = CONS.lock();

    match c {
        // print the process list for debugging
        c if c == ctrl(b'P') => {
            drop(cons);
            unsafe { PROC_TABLE.dump() };
            return;
        }

        // kill the whole line
        c if c == ctrl(b'U') => {
            while cons.e != cons.w && cons.buf[(cons.e - 1) % INPUT_BUF_SIZE] != b'\n' {
                cons.e -= 1;
                backspace();
            }
        }

        // backspace or delete
        c if c == ctrl(b'H') || c == 0x7f => {
            if cons.e != cons.w {
                cons.e -= 1;
                backspace();
            }
        }

        mut c => {
            if c != 0 && cons.e - cons.r < INPUT_BUF_SIZE {
                if c == b'\r' {
                    c = b'\n';
                }

                // echo back to the user
                putc(c);

                let at = cons.e % INPUT_BUF_SIZE;
                cons.buf[at] = c;
                cons.e += 1;

                if c == b'\n' || c == ctrl(b'D') || cons.e - cons.r == INPUT_BUF_SIZE {
                    cons.w = cons.e;
                    proc::wakeup(Chan::Input);
                }
            }
        }
    }
}

/// Brings up the UART and hangs the console off the device switch.
///
/// # Safety
/// Once, at boot, before anything prints.
pub unsafe fn init() {
    unsafe { uart::init() };

    file::register_device(CONSOLE, Device { read, write });
}
