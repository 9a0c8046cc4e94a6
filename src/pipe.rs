use alloc::sync::Arc;

use crate::error::{KernelError, Result};
use crate::file::File;
use crate::proc::{self, Chan};
use crate::spinlock::SpinLock;
use crate::vm::VirtAddr;

const PIPESIZE: usize = 512;

struct PipeBuf {
    data: [u8; PIPESIZE],
    /// bytes read so far
    nread: usize,
    /// bytes written so far
    nwrite: usize,
    read_open: bool,
    write_open: bool,
}

/// A byte channel between processes: a fixed ring with sleeping readers
/// and writers. The two `File` ends share one `Arc<Pipe>`; the ring is
/// freed when both ends have dropped.
pub struct Pipe {
    inner: SpinLock<PipeBuf>,
}

impl Pipe {
    /// Builds the ring and both of its file ends.
    pub fn new_pair() -> Result<(File, File)> {
        let pipe = Arc::try_new(Pipe {
            inner: SpinLock::new(
                PipeBuf {
                    data: [0; PIPESIZE],
                    nread: 0,
                    nwrite: 0,
                    read_open: true,
                    write_open: true,
                },
                "pipe",
            ),
        })
        .map_err(|_| KernelError::OutOfMemory)?;

        let read_end = File::new_pipe_end(Arc::clone(&pipe), false)?;
        let write_end = File::new_pipe_end(pipe, true)?;

        Ok((read_end, write_end))
    }

    /// Stable identity for sleep channels.
    fn chan_id(&self) -> usize {
        self as *const Pipe as usize
    }

    /// Marks one end closed and wakes the peer so it can notice.
    pub fn close(&self, write_end: bool) {
        let mut inner = self.inner.lock();

        if write_end {
            inner.write_open = false;
            proc::wakeup(Chan::PipeRead(self.chan_id()));
        } else {
            inner.read_open = false;
            proc::wakeup(Chan::PipeWrite(self.chan_id()));
        }
    }

    /// Writes `n` bytes from user memory, sleeping whenever the ring is
    /// full. Fails once the read end closes or the writer is killed.
    pub fn write(&self, addr: VirtAddr, n: usize) -> Result<usize> {
        let proc = proc::current();
        let mut inner = self.inner.lock();

        let mut i = 0;
        while i < n {
            if !inner.read_open {
                return Err(KernelError::BrokenPipe);
            }
            if proc.killed() {
                return Err(KernelError::Killed);
            }

            if inner.nwrite == inner.nread + PIPESIZE {
                // full: let readers drain it
                proc::wakeup(Chan::PipeRead(self.chan_id()));
                inner = proc::sleep(Chan::PipeWrite(self.chan_id()), inner);
                continue;
            }

            let mut byte = [0u8];
            if proc::copy_in_user(&mut byte, addr.add(i)).is_err() {
                break;
            }

            let at = inner.nwrite % PIPESIZE;
            inner.data[at] = byte[0];
            inner.nwrite += 1;
            i += 1;
        }

        proc::wakeup(Chan::PipeRead(self.chan_id()));
        Ok(i)
    }

    /// Reads up to `n` bytes into user memory, sleeping while the ring
    /// is empty and the write end is still open.
    pub fn read(&self, addr: VirtAddr, n: usize) -> Result<usize> {
        let proc = proc::current();
        let mut inner = self.inner.lock();

        while inner.nread == inner.nwrite && inner.write_open {
            if proc.killed() {
                return Err(KernelError::Killed);
            }
            inner = proc::sleep(Chan::PipeRead(self.chan_id()), inner);
        }

        let mut i = 0;
        while i < n && inner.nread != inner.nwrite {
            let byte = [inner.data[inner.nread % PIPESIZE]];
            if proc::copy_out_user(&byte, addr.add(i)).is_err() {
                break;
            }
            inner.nread += 1;
            i += 1;
        }

        proc::wakeup(Chan::PipeWrite(self.chan_id()));
        Ok(i)
    }
}
