#![no_std]
#![no_main]

extern crate alloc;

use ulib::*;

const DIRSIZE: usize = 14;

#[repr(C)]
struct DirEntry {
    inum: u16,
    name: [u8; DIRSIZE],
}

fn entry_name(entry: &DirEntry) -> &str {
    let len = entry.name.iter().position(|&c| c == 0).unwrap_or(DIRSIZE);
    core::str::from_utf8(&entry.name[..len]).unwrap_or("?")
}

fn ls(path: &str) {
    let fd = open(path, O_RDONLY);
    if fd < 0 {
        eprintln!("ls: cannot open {}", path);
        return;
    }
    let fd = fd as usize;

    let mut stat = Stat::default();
    if fstat(fd, &mut stat) < 0 {
        eprintln!("ls: cannot stat {}", path);
        close(fd);
        return;
    }

    if stat.kind == KIND_DIR {
        let mut bytes = [0u8; size_of::<DirEntry>()];
        while read(fd, &mut bytes) == bytes.len() as isize {
            let entry: &DirEntry = unsafe { &*(bytes.as_ptr() as *const DirEntry) };
            if entry.inum == 0 {
                continue;
            }

            let name = entry_name(entry);
            let full = alloc::format!("{}/{}", path, name);

            let mut child = Stat::default();
            let cfd = open(&full, O_RDONLY);
            if cfd >= 0 {
                fstat(cfd as usize, &mut child);
                close(cfd as usize);
            }

            println!("{:14} {} {} {}", name, child.kind, child.ino, child.size);
        }
    } else {
        println!("{:14} {} {} {}", path, stat.kind, stat.ino, stat.size);
    }

    close(fd);
}

#[unsafe(no_mangle)]
fn main(args: Args) {
    let mut any = false;
    for path in args.skip(1) {
        any = true;
        ls(path);
    }
    if !any {
        ls(".");
    }
}
