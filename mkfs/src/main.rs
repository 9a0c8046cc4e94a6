//! Builds a minnow file system image on the host.
//!
//! Disk layout, in blocks:
//! [ boot | superblock | log | inodes | free bitmap | data ]
//!
//! The geometry constants must match the kernel's fs module.

use std::fs;
use std::path::PathBuf;

use bytemuck::{Pod, Zeroable};
use clap::Parser;

const BSIZE: usize = 1024;
const FSSIZE: u32 = 2000;
const MAXOPBLOCKS: u32 = 10;
const LOGBLOCKS: u32 = MAXOPBLOCKS * 3;
const NINODES: u32 = 200;

const FSMAGIC: u32 = 0x10203040;
const ROOTINO: u32 = 1;
const NDIRECT: usize = 12;
const NINDIRECT: usize = BSIZE / size_of::<u32>();
const DIRSIZE: usize = 14;

const KIND_DIR: u16 = 1;
const KIND_FILE: u16 = 2;

const IPB: u32 = (BSIZE / size_of::<DiskInode>()) as u32;
const BPB: u32 = (BSIZE * 8) as u32;

/// header block plus the staged blocks
const NLOG: u32 = LOGBLOCKS + 1;
const NINODEBLOCKS: u32 = NINODES / IPB + 1;
const NBITMAP: u32 = FSSIZE / BPB + 1;
/// boot, superblock, log, inodes, bitmap
const NMETA: u32 = 2 + NLOG + NINODEBLOCKS + NBITMAP;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SuperBlock {
    magic: u32,
    size: u32,
    nblocks: u32,
    ninodes: u32,
    nlog: u32,
    logstart: u32,
    inodestart: u32,
    bmapstart: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DiskInode {
    kind: u16,
    major: u16,
    minor: u16,
    nlink: u16,
    size: u32,
    addrs: [u32; NDIRECT + 1],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DirEntry {
    inum: u16,
    name: [u8; DIRSIZE],
}

#[derive(Parser)]
#[command(about = "build a minnow file system image")]
struct Args {
    /// output image path
    image: PathBuf,
    /// files to install in the root directory; a leading '_' in the
    /// file name is stripped, mirroring the build's binary naming
    files: Vec<PathBuf>,
}

struct Image {
    blocks: Vec<u8>,
    sb: SuperBlock,
    next_inum: u32,
    next_block: u32,
}

impl Image {
    fn new() -> Self {
        let sb = SuperBlock {
            magic: FSMAGIC,
            size: FSSIZE,
            nblocks: FSSIZE - NMETA,
            ninodes: NINODES,
            nlog: NLOG,
            logstart: 2,
            inodestart: 2 + NLOG,
            bmapstart: 2 + NLOG + NINODEBLOCKS,
        };

        let mut image = Self {
            blocks: vec![0u8; FSSIZE as usize * BSIZE],
            sb,
            next_inum: ROOTINO,
            next_block: NMETA,
        };

        let mut sb_block = [0u8; BSIZE];
        sb_block[..size_of::<SuperBlock>()].copy_from_slice(bytemuck::bytes_of(&sb));
        image.write_block(1, &sb_block);

        image
    }

    fn write_block(&mut self, blockno: u32, data: &[u8; BSIZE]) {
        let at = blockno as usize * BSIZE;
        self.blocks[at..at + BSIZE].copy_from_slice(data);
    }

    fn read_block(&self, blockno: u32) -> [u8; BSIZE] {
        let at = blockno as usize * BSIZE;
        self.blocks[at..at + BSIZE].try_into().unwrap()
    }

    fn read_inode(&self, inum: u32) -> DiskInode {
        let block = self.read_block(self.sb.inodestart + inum / IPB);
        let at = (inum % IPB) as usize * size_of::<DiskInode>();
        bytemuck::pod_read_unaligned(&block[at..at + size_of::<DiskInode>()])
    }

    fn write_inode(&mut self, inum: u32, dinode: &DiskInode) {
        let mut block = self.read_block(self.sb.inodestart + inum / IPB);
        let at = (inum % IPB) as usize * size_of::<DiskInode>();
        block[at..at + size_of::<DiskInode>()].copy_from_slice(bytemuck::bytes_of(dinode));
        self.write_block(self.sb.inodestart + inum / IPB, &block);
    }

    fn alloc_inode(&mut self, kind: u16) -> u32 {
        let inum = self.next_inum;
        self.next_inum += 1;
        assert!(inum < NINODES, "out of inodes");

        self.write_inode(
            inum,
            &DiskInode {
                kind,
                major: 0,
                minor: 0,
                nlink: 1,
                size: 0,
                addrs: [0; NDIRECT + 1],
            },
        );
        inum
    }

    fn alloc_block(&mut self) -> u32 {
        let b = self.next_block;
        self.next_block += 1;
        assert!(b < FSSIZE, "out of blocks");
        b
    }

    /// Appends `data` to inode `inum`, growing through the direct blocks
    /// and then the single indirect block.
    fn append(&mut self, inum: u32, data: &[u8]) {
        let mut dinode = self.read_inode(inum);
        let mut off = dinode.size as usize;

        let mut remaining = data;
        while !remaining.is_empty() {
            let fbn = off / BSIZE;
            assert!(fbn < NDIRECT + NINDIRECT, "file too large");

            let blockno = if fbn < NDIRECT {
                if dinode.addrs[fbn] == 0 {
                    dinode.addrs[fbn] = self.alloc_block();
                }
                dinode.addrs[fbn]
            } else {
                if dinode.addrs[NDIRECT] == 0 {
                    dinode.addrs[NDIRECT] = self.alloc_block();
                }
                let ind_addr = dinode.addrs[NDIRECT];
                let mut ind = self.read_block(ind_addr);
                let at = (fbn - NDIRECT) * size_of::<u32>();
                let mut slot = u32::from_le_bytes(ind[at..at + 4].try_into().unwrap());
                if slot == 0 {
                    slot = self.alloc_block();
                    ind[at..at + 4].copy_from_slice(&slot.to_le_bytes());
                    self.write_block(ind_addr, &ind);
                }
                slot
            };

            let n = remaining.len().min(BSIZE - off % BSIZE);
            let mut block = self.read_block(blockno);
            block[off % BSIZE..off % BSIZE + n].copy_from_slice(&remaining[..n]);
            self.write_block(blockno, &block);

            off += n;
            remaining = &remaining[n..];
        }

        dinode.size = off as u32;
        self.write_inode(inum, &dinode);
    }

    fn dir_link(&mut self, dir_inum: u32, name: &str, inum: u32) {
        let mut entry = DirEntry {
            inum: inum as u16,
            name: [0; DIRSIZE],
        };
        let bytes = name.as_bytes();
        assert!(bytes.len() <= DIRSIZE, "name too long: {name}");
        entry.name[..bytes.len()].copy_from_slice(bytes);

        self.append(dir_inum, bytemuck::bytes_of(&entry));
    }

    /// Marks every block below `next_block` used in the free bitmap.
    fn write_bitmap(&mut self) {
        let used = self.next_block;
        assert!(used < BPB, "bitmap spans blocks");

        let mut block = [0u8; BSIZE];
        for b in 0..used {
            block[b as usize / 8] |= 1 << (b % 8);
        }

        println!("mkfs: {} blocks in use of {}", used, FSSIZE);
        self.write_block(self.sb.bmapstart, &block);
    }
}

fn main() {
    let args = Args::parse();

    let mut image = Image::new();

    // the root directory refers to itself both ways
    let root = image.alloc_inode(KIND_DIR);
    assert_eq!(root, ROOTINO);
    image.dir_link(root, ".", root);
    image.dir_link(root, "..", root);

    for path in &args.files {
        let data = fs::read(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()));

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("file name");
        let name = name.strip_prefix('_').unwrap_or(name);

        let inum = image.alloc_inode(KIND_FILE);
        image.dir_link(root, name, inum);
        image.append(inum, &data);

        println!("mkfs: /{name} ({} bytes)", data.len());
    }

    // ".." is a second link to the root
    let mut root_inode = image.read_inode(root);
    root_inode.nlink += 1;
    image.write_inode(root, &root_inode);

    image.write_bitmap();

    fs::write(&args.image, &image.blocks)
        .unwrap_or_else(|e| panic!("write {}: {e}", args.image.display()));
}
