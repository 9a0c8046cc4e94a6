#![no_std]
#![no_main]

use ulib::*;

/// Forks and exits without waiting, so the child gets reparented to
/// init; the process listing should briefly show a zombie.
#[unsafe(no_mangle)]
fn main(_args: Args) {
    if fork() > 0 {
        // give the child a moment to outlive us
        sleep(5);
    }
}
