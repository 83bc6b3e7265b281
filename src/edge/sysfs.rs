use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use crate::edge::{EdgeSource, Wait, Waker};
use crate::error::GpioError;

const DRAIN_CHUNK: usize = 64;

/// Waits for `POLLPRI` on a pin's sysfs `value` file.
///
/// Owns its own read-write handle, independent of the per-call handles the
/// accessors open, so offsets are never shared. A self-pipe is polled
/// alongside the value handle so the wait can be interrupted.
pub struct SysfsEdgeSource {
    path: PathBuf,
    value: File,
    wake_rx: Arc<File>,
    wake_tx: Arc<File>,
}

impl SysfsEdgeSource {
    /// Opens the value file non-blocking and discards any pending state so
    /// the first wait does not fire on a stale latch.
    pub fn open(path: &Path) -> Result<Self, GpioError> {
        let mut value = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| GpioError::io(path, e))?;

        let drained = drain(&mut value).map_err(|e| GpioError::io(path, e))?;
        debug!("drained {drained} pending bytes from {}", path.display());

        let (rx, tx) = nix::unistd::pipe()
            .map_err(|e| GpioError::InterruptSetup(format!("wake pipe: {e}")))?;

        Ok(Self {
            path: path.to_path_buf(),
            value,
            wake_rx: Arc::new(File::from(rx)),
            wake_tx: Arc::new(File::from(tx)),
        })
    }

    fn consume_latch(&mut self) -> Result<(), GpioError> {
        let mut byte = [0u8; 1];
        self.value
            .seek(SeekFrom::Start(0))
            .map_err(|e| GpioError::io(&self.path, e))?;
        match self.value.read(&mut byte) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(GpioError::io(&self.path, e)),
        }
    }

    fn pipe_waker(&self) -> PipeWaker {
        PipeWaker {
            tx: self.wake_tx.clone(),
            _rx: self.wake_rx.clone(),
        }
    }
}

fn drain(file: &mut File) -> std::io::Result<usize> {
    let mut buf = [0u8; DRAIN_CHUNK];
    let mut total = 0;
    loop {
        match file.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(total),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

impl EdgeSource for SysfsEdgeSource {
    fn wait(&mut self) -> Result<Wait, GpioError> {
        let (value_events, wake_events) = {
            let mut fds = [
                PollFd::new(self.value.as_fd(), PollFlags::POLLPRI),
                PollFd::new(self.wake_rx.as_fd(), PollFlags::POLLIN),
            ];
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => return Ok(Wait::Spurious),
                Err(e) => {
                    return Err(GpioError::Worker(format!(
                        "poll {}: {e}",
                        self.path.display()
                    )));
                }
            }
            (
                fds[0].revents().unwrap_or(PollFlags::empty()),
                fds[1].revents().unwrap_or(PollFlags::empty()),
            )
        };

        if wake_events.contains(PollFlags::POLLIN) {
            let mut buf = [0u8; DRAIN_CHUNK];
            let _ = (&*self.wake_rx).read(&mut buf);
            return Ok(Wait::Woken);
        }

        if value_events.contains(PollFlags::POLLNVAL) {
            return Err(GpioError::Worker(format!(
                "value handle for {} is no longer valid",
                self.path.display()
            )));
        }

        if value_events.contains(PollFlags::POLLPRI) {
            self.consume_latch()?;
            return Ok(Wait::Edge);
        }

        Ok(Wait::Spurious)
    }

    fn waker(&self) -> Box<dyn Waker> {
        Box::new(self.pipe_waker())
    }
}

/// Holds the read end too, so a wake after the worker is gone never hits a
/// reader-less pipe.
struct PipeWaker {
    tx: Arc<File>,
    _rx: Arc<File>,
}

impl PipeWaker {
    fn send(&self) -> std::io::Result<usize> {
        (&*self.tx).write(&[1])
    }
}

impl Waker for PipeWaker {
    fn wake(&self) {
        let _ = self.send();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn open_fails_on_missing_value_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SysfsEdgeSource::open(&dir.path().join("value")).err().unwrap();
        assert!(matches!(err, GpioError::Io { .. }));
    }

    #[test]
    fn waker_interrupts_wait() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");
        fs::write(&path, "0\n").unwrap();

        let mut source = SysfsEdgeSource::open(&path).unwrap();
        source.waker().wake();

        // a regular file never raises POLLPRI, so only the wake can end this
        assert_eq!(source.wait().unwrap(), Wait::Woken);
    }

    #[test]
    fn wake_after_source_dropped_still_has_a_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");
        fs::write(&path, "1").unwrap();

        let source = SysfsEdgeSource::open(&path).unwrap();
        let waker = source.pipe_waker();
        drop(source);

        assert_eq!(waker.send().unwrap(), 1);
        waker.wake();
    }
}
