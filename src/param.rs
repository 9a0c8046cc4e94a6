/// maximum number of harts
pub const NCPU: usize = 8;
/// maximum number of processes
pub const NPROC: usize = 64;
/// open files per process
pub const NOFILE: usize = 16;
/// maximum number of active inodes
pub const NINODE: usize = 50;
/// maximum major device number
pub const NDEV: usize = 10;
/// device number of the file system root disk
pub const ROOTDEV: u32 = 1;
/// max exec arguments
pub const MAXARG: usize = 32;
/// max # of blocks any FS op writes
pub const MAXOPBLOCKS: usize = 10;
/// max data blocks in the on-disk log
pub const LOGBLOCKS: usize = MAXOPBLOCKS * 3;
/// size of the disk block cache
pub const NBUF: usize = MAXOPBLOCKS * 3;
/// size of the file system image in blocks
pub const FSSIZE: usize = 2000;
/// maximum length of a file path
pub const MAXPATH: usize = 128;
/// user stack pages
pub const USERSTACK: usize = 1;
