#![no_std]
#![no_main]

use ulib::*;

#[unsafe(no_mangle)]
fn main(args: Args) {
    match args.get(1).and_then(|n| n.parse::<usize>().ok()) {
        Some(ticks) => {
            sleep(ticks);
        }
        None => {
            eprintln!("usage: sleep ticks");
            exit(1);
        }
    }
}
