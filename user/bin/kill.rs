#![no_std]
#![no_main]

use ulib::*;

#[unsafe(no_mangle)]
fn main(args: Args) {
    let mut any = false;
    for arg in args.skip(1) {
        any = true;
        match arg.parse::<usize>() {
            Ok(pid) => {
                kill(pid);
            }
            Err(_) => eprintln!("kill: bad pid {}", arg),
        }
    }

    if !any {
        eprintln!("usage: kill pid...");
        exit(1);
    }
}
