#![no_std]
#![no_main]

extern crate alloc;

use alloc::vec::Vec;

use ulib::*;

/// A small shell: whitespace-separated words, `|` pipelines, `<` and `>`
/// redirections, and a built-in cd.
#[unsafe(no_mangle)]
fn main(_args: Args) {
    // make sure fds 0..2 exist, in case init didn't
    loop {
        let fd = open("console", O_RDWR);
        if fd < 0 {
            break;
        }
        if fd >= 3 {
            close(fd as usize);
            break;
        }
    }

    let mut buf = [0u8; 128];

    loop {
        print!("$ ");
        let line = read_line(&mut buf);

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        // cd must run in the shell itself, not a child
        if let Some(dir) = trimmed.strip_prefix("cd ") {
            if chdir(dir.trim()) < 0 {
                eprintln!("cannot cd {}", dir.trim());
            }
            continue;
        }

        if fork() == 0 {
            run(trimmed);
        }
        wait(&mut 0);
    }
}

/// Executes `cmd` in this (child) process; never returns.
fn run(cmd: &str) -> ! {
    // a pipeline: left | right, each side in its own process
    if let Some((left, right)) = cmd.split_once('|') {
        let mut fds = [0i32; 2];
        if pipe(&mut fds) < 0 {
            eprintln!("pipe failed");
            exit(1);
        }

        if fork() == 0 {
            // left side writes the pipe as stdout
            close(STDOUT);
            dup(fds[1] as usize);
            close(fds[0] as usize);
            close(fds[1] as usize);
            run(left.trim());
        }

        if fork() == 0 {
            // right side reads the pipe as stdin
            close(STDIN);
            dup(fds[0] as usize);
            close(fds[0] as usize);
            close(fds[1] as usize);
            run(right.trim());
        }

        close(fds[0] as usize);
        close(fds[1] as usize);
        wait(&mut 0);
        wait(&mut 0);
        exit(0);
    }

    // plain command: words, with redirections picked out
    let mut argv: Vec<&str> = Vec::new();
    let mut words = cmd.split_whitespace();

    while let Some(word) = words.next() {
        match word {
            "<" => {
                let Some(path) = words.next() else {
                    eprintln!("missing < file");
                    exit(1);
                };
                close(STDIN);
                if open(path, O_RDONLY) < 0 {
                    eprintln!("cannot open {}", path);
                    exit(1);
                }
            }
            ">" => {
                let Some(path) = words.next() else {
                    eprintln!("missing > file");
                    exit(1);
                };
                close(STDOUT);
                if open(path, O_WRONLY | O_CREATE | O_TRUNC) < 0 {
                    eprintln!("cannot create {}", path);
                    exit(1);
                }
            }
            word => argv.push(word),
        }
    }

    if argv.is_empty() {
        exit(0);
    }

    exec(argv[0], &argv);

    // exec only returns on failure; try /name for bare commands
    if !argv[0].starts_with('/') {
        let mut path = alloc::string::String::from("/");
        path.push_str(argv[0]);
        exec(&path, &argv);
    }

    eprintln!("exec {} failed", argv[0]);
    exit(1)
}
