#![cfg(feature = "std")]

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::boxed::Box;
use std::string::ToString;

use log::{debug, warn};

use crate::DeferredQueue;

pub const WORKER_THREAD_NAME: &str = "nvb-dfr";

/// Dedicated consumer thread for a `DeferredQueue`.
///
/// Parks while the queue is empty. Shutdown drains every accepted job
/// before the thread exits.
pub struct Worker<T: Send + Sync + 'static> {
    queue: Arc<DeferredQueue<T>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> Worker<T> {
    pub fn spawn(queue: Arc<DeferredQueue<T>>, target: Arc<T>) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));

        let q = queue.clone();
        let s = stop.clone();
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                debug!("dfr: worker online");
                loop {
                    q.run_pending(&target);
                    if s.load(Ordering::Acquire) {
                        // Accepted jobs always run.
                        q.run_pending(&target);
                        break;
                    }
                    thread::park();
                }
                debug!("dfr: worker offline ({} jobs done)", q.completed());
            })?;

        let thread = handle.thread().clone();
        queue.set_waker(Box::new(move || thread.unpark()));
        // A push that landed before the waker was installed found nobody to
        // wake. The park token makes the next park() return at once.
        handle.thread().unpark();

        Ok(Self { queue, stop, handle: Some(handle) })
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        self.handle.as_ref().map(|h| h.thread().id())
    }

    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop.store(true, Ordering::Release);
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("dfr: worker panicked");
            }
            self.queue.clear_waker();
        }
    }
}

impl<T: Send + Sync + 'static> Drop for Worker<T> {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
