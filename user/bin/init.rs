#![no_std]
#![no_main]

use ulib::*;

/// First user program: wires up the console, then keeps a shell running
/// and reaps whatever orphans get handed down.
#[unsafe(no_mangle)]
fn main(_args: Args) {
    if open("console", O_RDWR) < 0 {
        mknod("console", CONSOLE, 0);
        open("console", O_RDWR); // fd 0
    }
    dup(STDIN); // fd 1
    dup(STDIN); // fd 2

    loop {
        println!("init: starting sh");

        let pid = fork();
        if pid < 0 {
            eprintln!("init: fork failed");
            exit(1);
        }

        if pid == 0 {
            exec("/sh", &["sh"]);
            eprintln!("init: exec sh failed");
            exit(1);
        }

        loop {
            // returns when the shell dies, or for any reparented zombie
            let wpid = wait(&mut 0);
            if wpid == pid {
                // restart the shell
                break;
            }
            if wpid < 0 {
                eprintln!("init: wait failed");
                exit(1);
            }
            // an orphan; keep reaping
        }
    }
}
