//! Driver for the 16550a UART on qemu's virt board.
//! http://byterunner.com/16550.html

use core::num::Wrapping;
use core::ptr;

use crate::cpu;
use crate::memlayout::UART0;
use crate::printf::PRINTER;
use crate::proc::{self, Chan};
use crate::spinlock::SpinLock;

/// receive holding register
const RHR: usize = 0;
/// transmit holding register
const THR: usize = 0;
/// interrupt enable register
const IER: usize = 1;
const IER_RX_ENABLE: u8 = 1 << 0;
const IER_TX_ENABLE: u8 = 1 << 1;
/// FIFO control register
const FCR: usize = 2;
const FCR_FIFO_ENABLE: u8 = 1 << 0;
const FCR_FIFO_CLEAR: u8 = 3 << 1;
/// interrupt status register
const ISR: usize = 2;
/// line control register
const LCR: usize = 3;
const LCR_EIGHT_BITS: u8 = 3;
const LCR_BAUD_LATCH: u8 = 1 << 7;
/// line status register
const LSR: usize = 5;
const LSR_RX_READY: u8 = 1 << 0;
const LSR_TX_IDLE: u8 = 1 << 5;

const TX_BUF_SIZE: usize = 32;

static UART: SpinLock<Uart> = SpinLock::new(Uart::new(UART0), "uart");

pub struct Uart {
    base: usize,
    tx_buf: [u8; TX_BUF_SIZE],
    tx_w: Wrapping<usize>,
    tx_r: Wrapping<usize>,
}

impl Uart {
    const fn new(base: usize) -> Self {
        Self {
            base,
            tx_buf: [0; TX_BUF_SIZE],
            tx_w: Wrapping(0),
            tx_r: Wrapping(0),
        }
    }

    fn reg_read(&self, reg: usize) -> u8 {
        // Safety: memory-mapped UART register
        unsafe { ptr::read_volatile((self.base as *const u8).add(reg)) }
    }

    fn reg_write(&mut self, reg: usize, value: u8) {
        // Safety: memory-mapped UART register
        unsafe { ptr::write_volatile((self.base as *mut u8).add(reg), value) }
    }

    /// 38.4K baud, 8 data bits, no parity, one stop bit, FIFOs on,
    /// both interrupt directions enabled.
    fn setup(&mut self) {
        self.reg_write(IER, 0x00);
        self.reg_write(LCR, LCR_BAUD_LATCH);
        self.reg_write(0, 0x03); // baud LSB
        self.reg_write(1, 0x00); // baud MSB
        self.reg_write(LCR, LCR_EIGHT_BITS);
        self.reg_write(FCR, FCR_FIFO_ENABLE | FCR_FIFO_CLEAR);
        self.reg_write(IER, IER_TX_ENABLE | IER_RX_ENABLE);
    }

    /// Pushes buffered bytes into the transmit register while it is idle.
    /// Called with the uart lock held, from both `putc` and the interrupt.
    fn drain_tx(&mut self) {
        loop {
            if self.tx_w == self.tx_r {
                // buffer empty
                self.reg_read(ISR);
                return;
            }

            if self.reg_read(LSR) & LSR_TX_IDLE == 0 {
                // THR full; the UART will interrupt when it wants more.
                return;
            }

            let c = self.tx_buf[self.tx_r.0 % TX_BUF_SIZE];
            self.tx_r += 1;

            // putc may be waiting for room
            proc::wakeup(Chan::UartTx);

            self.reg_write(THR, c);
        }
    }
}

/// Queues an output byte, sleeping while the ring is full.
///
/// Blocks, so it serves `write()` and never the interrupt path.
pub fn putc(c: u8) {
    let mut uart = UART.lock();

    if PRINTER.is_panicked() {
        loop {
            core::hint::spin_loop();
        }
    }

    while uart.tx_w == uart.tx_r + Wrapping(TX_BUF_SIZE) {
        uart = proc::sleep(Chan::UartTx, uart);
    }

    let at = uart.tx_w.0 % TX_BUF_SIZE;
    uart.tx_buf[at] = c;
    uart.tx_w += 1;
    uart.drain_tx();
}

/// Polled output for printf and input echo: spin on THR, no interrupts,
/// no sleeping.
pub fn putc_sync(c: u8) {
    let _intr = cpu::push_off();

    if PRINTER.is_panicked() {
        loop {
            core::hint::spin_loop();
        }
    }

    // Safety: interrupts are off and we only poll status + THR.
    let uart = unsafe { UART.get_mut_unchecked() };
    while uart.reg_read(LSR) & LSR_TX_IDLE == 0 {}
    uart.reg_write(THR, c);
}

/// One waiting input byte, if any.
fn getc() -> Option<u8> {
    // Safety: read-only polling of RHR/LSR.
    let uart = unsafe { UART.get_mut_unchecked() };
    if uart.reg_read(LSR) & LSR_RX_READY != 0 {
        Some(uart.reg_read(RHR))
    } else {
        None
    }
}

/// UART interrupt: input arrived, or transmit space opened up, or both.
pub fn intr() {
    while let Some(c) = getc() {
        crate::console::intr(c);
    }

    UART.lock().drain_tx();
}

/// # Safety
/// Once, at boot, before the console is used.
pub unsafe fn init() {
    unsafe { UART.get_mut_unchecked().setup() };
}
