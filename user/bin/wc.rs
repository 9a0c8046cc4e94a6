#![no_std]
#![no_main]

use ulib::*;

struct Counts {
    lines: usize,
    words: usize,
    bytes: usize,
}

fn wc(fd: usize) -> Counts {
    let mut counts = Counts {
        lines: 0,
        words: 0,
        bytes: 0,
    };
    let mut in_word = false;
    let mut buf = [0u8; 512];

    loop {
        let n = read(fd, &mut buf);
        if n < 0 {
            eprintln!("wc: read error");
            exit(1);
        }
        if n == 0 {
            return counts;
        }

        for &c in &buf[..n as usize] {
            counts.bytes += 1;
            if c == b'\n' {
                counts.lines += 1;
            }
            if c.is_ascii_whitespace() {
                in_word = false;
            } else if !in_word {
                in_word = true;
                counts.words += 1;
            }
        }
    }
}

fn report(counts: &Counts, bytes_only: bool, name: &str) {
    if bytes_only {
        println!("{}", counts.bytes);
    } else if name.is_empty() {
        println!("{} {} {}", counts.lines, counts.words, counts.bytes);
    } else {
        println!("{} {} {} {}", counts.lines, counts.words, counts.bytes, name);
    }
}

#[unsafe(no_mangle)]
fn main(args: Args) {
    let mut files = args;
    files.next(); // program name

    let bytes_only = files.clone().next() == Some("-c");
    if bytes_only {
        files.next();
    }

    let mut any = false;
    for path in files.clone() {
        any = true;
        let fd = open(path, O_RDONLY);
        if fd < 0 {
            eprintln!("wc: cannot open {}", path);
            exit(1);
        }
        report(&wc(fd as usize), bytes_only, path);
        close(fd as usize);
    }

    if !any {
        report(&wc(STDIN), bytes_only, "");
    }
}
