#![no_std]
#![no_main]

use ulib::*;

#[unsafe(no_mangle)]
fn main(args: Args) {
    for (i, arg) in args.skip(1).enumerate() {
        if i > 0 {
            print!(" ");
        }
        print!("{}", arg);
    }
    println!();
}
