#![no_std]
#![no_main]

use ulib::*;

fn cat(fd: usize) {
    let mut buf = [0u8; 512];

    loop {
        let n = read(fd, &mut buf);
        if n <= 0 {
            if n < 0 {
                eprintln!("cat: read error");
                exit(1);
            }
            return;
        }
        if write(STDOUT, &buf[..n as usize]) != n {
            eprintln!("cat: write error");
            exit(1);
        }
    }
}

#[unsafe(no_mangle)]
fn main(args: Args) {
    if args.len() <= 1 {
        cat(STDIN);
        return;
    }

    for path in args.skip(1) {
        let fd = open(path, O_RDONLY);
        if fd < 0 {
            eprintln!("cat: cannot open {}", path);
            exit(1);
        }
        cat(fd as usize);
        close(fd as usize);
    }
}
