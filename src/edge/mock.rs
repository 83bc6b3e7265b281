use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::edge::{EdgeSource, Wait, Waker};
use crate::error::GpioError;

enum Signal {
    Edge,
    Spurious,
    Fail,
    Wake,
}

/// Channel-driven stand-in for a value handle, for exercising the worker
/// without kernel edge support.
pub struct MockEdgeSource {
    rx: Receiver<Signal>,
    tx: Sender<Signal>,
    waits: Arc<AtomicUsize>,
    detached: Arc<AtomicBool>,
}

/// Test-side handle that injects transitions into a [`MockEdgeSource`].
#[derive(Clone)]
pub struct MockEdgeTrigger {
    tx: Sender<Signal>,
    waits: Arc<AtomicUsize>,
    detached: Arc<AtomicBool>,
}

impl MockEdgeSource {
    pub fn new() -> (Self, MockEdgeTrigger) {
        let (tx, rx) = mpsc::channel();
        let waits = Arc::new(AtomicUsize::new(0));
        let detached = Arc::new(AtomicBool::new(false));
        let trigger = MockEdgeTrigger {
            tx: tx.clone(),
            waits: waits.clone(),
            detached: detached.clone(),
        };
        (
            Self {
                rx,
                tx,
                waits,
                detached,
            },
            trigger,
        )
    }
}

impl Drop for MockEdgeSource {
    fn drop(&mut self) {
        self.detached.store(true, Ordering::Release);
    }
}

impl EdgeSource for MockEdgeSource {
    fn wait(&mut self) -> Result<Wait, GpioError> {
        self.waits.fetch_add(1, Ordering::AcqRel);
        match self.rx.recv() {
            Ok(Signal::Edge) => Ok(Wait::Edge),
            Ok(Signal::Spurious) => Ok(Wait::Spurious),
            Ok(Signal::Wake) => Ok(Wait::Woken),
            Ok(Signal::Fail) | Err(_) => {
                Err(GpioError::Worker("mock value handle closed".into()))
            }
        }
    }

    fn waker(&self) -> Box<dyn Waker> {
        Box::new(MockWaker(self.tx.clone()))
    }
}

struct MockWaker(Sender<Signal>);

impl Waker for MockWaker {
    fn wake(&self) {
        let _ = self.0.send(Signal::Wake);
    }
}

impl MockEdgeTrigger {
    /// Latch one transition matching the configured edge.
    pub fn fire(&self) {
        let _ = self.tx.send(Signal::Edge);
    }

    pub fn spurious(&self) {
        let _ = self.tx.send(Signal::Spurious);
    }

    /// Make the next wait fail as if the handle had been closed.
    pub fn fail(&self) {
        let _ = self.tx.send(Signal::Fail);
    }

    /// Number of times the worker has entered a wait.
    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::Acquire)
    }

    /// True once the source has been dropped by its worker.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }
}
