#![no_std]
#![no_main]

extern crate alloc;

/// `start` mret's to this symbol in supervisor mode on every hart.
#[unsafe(export_name = "main")]
extern "C" fn main() -> ! {
    kernel::kmain()
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    kernel::printf::handle_panic(info)
}
