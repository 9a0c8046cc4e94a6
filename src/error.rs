use core::fmt;

/// Every failure the kernel can report to a caller.
///
/// Syscall handlers bubble these up with `?`; the dispatch layer collapses
/// them to -1 in the user's a0. Invariant violations panic instead and
/// never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// no free page or heap block
    OutOfMemory,
    /// process table is full
    OutOfProcs,
    /// user address unmapped, not user-accessible, or out of range
    BadAddress,
    /// user string without a terminator in range
    StringTooLong,
    /// process was killed while blocked
    Killed,
    /// wait() with nothing to reap
    NoChildren,
    /// no such pid
    NoProcess,
    /// malformed syscall argument
    BadArgument,
    /// file descriptor out of range or not open
    BadFileDescriptor,
    /// per-process or system file table is full
    TooManyFiles,
    /// path lookup failed
    NotFound,
    /// create() found an existing entry of the wrong type
    Exists,
    /// path component is not a directory
    NotADirectory,
    /// unlink() on a non-empty directory
    DirectoryNotEmpty,
    /// link() across devices
    CrossDevice,
    /// file grew past MAXFILE blocks
    FileTooLarge,
    /// no free inodes on disk
    OutOfInodes,
    /// no free data blocks on disk
    OutOfBlocks,
    /// not an executable the loader understands
    BadExecutable,
    /// write to a pipe with no readers
    BrokenPipe,
    /// device major number with no registered driver
    NoDevice,
}

pub type Result<T> = core::result::Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::OutOfMemory => "out of memory",
            KernelError::OutOfProcs => "process table full",
            KernelError::BadAddress => "bad address",
            KernelError::StringTooLong => "string too long",
            KernelError::Killed => "killed",
            KernelError::NoChildren => "no children",
            KernelError::NoProcess => "no such process",
            KernelError::BadArgument => "bad argument",
            KernelError::BadFileDescriptor => "bad file descriptor",
            KernelError::TooManyFiles => "too many open files",
            KernelError::NotFound => "no such file or directory",
            KernelError::Exists => "file exists",
            KernelError::NotADirectory => "not a directory",
            KernelError::DirectoryNotEmpty => "directory not empty",
            KernelError::CrossDevice => "cross-device link",
            KernelError::FileTooLarge => "file too large",
            KernelError::OutOfInodes => "out of inodes",
            KernelError::OutOfBlocks => "out of blocks",
            KernelError::BadExecutable => "exec format error",
            KernelError::BrokenPipe => "broken pipe",
            KernelError::NoDevice => "no such device",
        };
        f.write_str(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn display_is_stable() {
        assert_eq!(
            alloc::format!("{}", KernelError::BadAddress),
            "bad address"
        );
        assert_eq!(alloc::format!("{}", KernelError::Killed), "killed");
    }
}
