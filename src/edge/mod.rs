pub mod mock;
pub mod sysfs;

pub use mock::{MockEdgeSource, MockEdgeTrigger};
pub use sysfs::SysfsEdgeSource;

use log::{error, info, trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::config::GpioName;
use crate::error::GpioError;

/// User work run on every observed transition.
pub type EdgeCallback = Box<dyn FnMut() + Send + 'static>;

/// Result of one blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// The configured edge fired and the latch was consumed.
    Edge,
    /// Woke without a matching transition.
    Spurious,
    /// Interrupted through the source's waker.
    Woken,
}

/// Interrupts a blocked [`EdgeSource::wait`] from another thread.
pub trait Waker: Send + Sync {
    fn wake(&self);
}

/// A readiness primitive the worker can block on.
pub trait EdgeSource: Send + 'static {
    /// Blocks with no timeout until a transition or a wake.
    fn wait(&mut self) -> Result<Wait, GpioError>;

    fn waker(&self) -> Box<dyn Waker>;
}

/// Dedicated thread looping wait -> callback until dropped.
pub struct EventWorker {
    cancel: Arc<AtomicBool>,
    waker: Box<dyn Waker>,
    handle: Option<JoinHandle<()>>,
}

impl EventWorker {
    pub fn spawn<S: EdgeSource>(
        name: GpioName,
        mut source: S,
        mut callback: EdgeCallback,
    ) -> Result<Self, GpioError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();
        let waker = source.waker();

        let handle = thread::Builder::new()
            .name(format!("{name}-edge"))
            .spawn(move || {
                raise_priority(name);

                while !cancel_flag.load(Ordering::Acquire) {
                    match source.wait() {
                        Ok(Wait::Edge) => {
                            if cancel_flag.load(Ordering::Acquire) {
                                break;
                            }
                            callback();
                        }
                        Ok(Wait::Spurious) => trace!("spurious wake on {name}"),
                        Ok(Wait::Woken) => {}
                        Err(e) => {
                            error!("edge wait on {name} failed, stopping worker: {e}");
                            return;
                        }
                    }
                }
                info!("edge worker for {name} stopped");
            })
            .map_err(|e| GpioError::Worker(format!("spawn edge worker for {name}: {e}")))?;

        Ok(Self {
            cancel,
            waker,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for EventWorker {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return;
        };

        // dropped from inside the callback: the loop exits once it returns
        if handle.thread().id() == thread::current().id() {
            return;
        }

        self.waker.wake();
        let _ = handle.join();
    }
}

/// Best effort: needs CAP_SYS_NICE to go below nice 0.
///
/// nix has no `setpriority` wrapper, so this goes through its libc re-export.
fn raise_priority(name: GpioName) {
    const EDGE_WORKER_NICE: nix::libc::c_int = -10;

    let tid = nix::unistd::gettid().as_raw() as nix::libc::id_t;
    // SAFETY: takes no pointers; only changes the nice value of this thread.
    let rc = unsafe { nix::libc::setpriority(nix::libc::PRIO_PROCESS, tid, EDGE_WORKER_NICE) };
    if rc != 0 {
        warn!(
            "could not raise priority of {name} edge worker: {}",
            std::io::Error::last_os_error()
        );
    }
}
