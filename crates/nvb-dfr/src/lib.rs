//! Deferred write pipeline.
//!
//! Callers on the radio/event path hand over a payload copy and a handler;
//! the handler runs later on a dedicated worker context, in submission
//! order, one job at a time. The caller never waits on storage.

#![no_std]
#![forbid(unsafe_code)]
#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

#[cfg(feature = "std")]
pub mod worker;
#[cfg(feature = "std")]
pub use worker::{Worker, WORKER_THREAD_NAME};

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use log::warn;
use spin::Mutex;

use nvb_core::{BondError, BondResult, ConnHandle, Ediv, Role};
use nvb_mem::{Payload, PayloadPool};

/// Small values that travel alongside a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobContext {
    pub role: Role,
    pub conn_hdl: ConnHandle,
    pub ediv: Ediv,
}

/// Executed on the worker with the shared target, the job context and the
/// payload copy, if one was submitted.
pub type Handler<T> = fn(&T, &JobContext, Option<&[u8]>);

/// Wakes the consumer after a push.
pub type Waker = Box<dyn Fn() + Send + Sync>;

pub struct DeferredJob<T> {
    handler: Handler<T>,
    ctx: JobContext,
    payload: Option<Payload>,
}

impl<T> DeferredJob<T> {
    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    /// Runs the handler. The payload slot goes back to its pool when the
    /// job is dropped at the end of this call.
    pub fn run(self, target: &T) {
        let payload = self.payload.as_ref().map(|p| p.as_slice());
        (self.handler)(target, &self.ctx, payload);
    }
}

pub struct DeferredQueue<T> {
    jobs: Mutex<VecDeque<DeferredJob<T>>>,
    pool: Arc<PayloadPool>,
    depth: usize,
    waker: Mutex<Option<Waker>>,
    accepted: AtomicU32,
    completed: AtomicU32,
}

impl<T> DeferredQueue<T> {
    pub fn new(pool: Arc<PayloadPool>, depth: usize) -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(VecDeque::with_capacity(depth)),
            pool,
            depth,
            waker: Mutex::new(None),
            accepted: AtomicU32::new(0),
            completed: AtomicU32::new(0),
        })
    }

    /// Accept a job for later execution. Never runs `handler` itself.
    ///
    /// The payload is copied before this returns; the caller may reuse its
    /// buffer immediately. On error nothing was queued.
    pub fn enqueue(&self, payload: Option<&[u8]>, handler: Handler<T>, ctx: JobContext) -> BondResult<()> {
        let payload = match payload {
            Some(bytes) => Some(self.pool.copy_in(bytes).map_err(|e| {
                warn!("dfr: {} byte payload not copied ({} free): {}", bytes.len(), self.pool.available(), e);
                e
            })?),
            None => None,
        };
        self.push(payload, handler, ctx)
    }

    /// Same as `enqueue`, for a payload already staged in this queue's pool.
    pub fn enqueue_payload(&self, payload: Payload, handler: Handler<T>, ctx: JobContext) -> BondResult<()> {
        self.push(Some(payload), handler, ctx)
    }

    fn push(&self, payload: Option<Payload>, handler: Handler<T>, ctx: JobContext) -> BondResult<()> {
        // 1. Queue (the slot goes back to the pool if we bail out here)
        {
            let mut jobs = self.jobs.lock();
            if jobs.len() >= self.depth {
                warn!("dfr: queue full ({} jobs)", jobs.len());
                return Err(BondError::QueueFull);
            }
            self.accepted.fetch_add(1, Ordering::AcqRel);
            jobs.push_back(DeferredJob { handler, ctx, payload });
        }

        // 2. Kick the consumer
        if let Some(wake) = self.waker.lock().as_ref() {
            wake();
        }
        Ok(())
    }

    pub fn pool(&self) -> &Arc<PayloadPool> {
        &self.pool
    }

    pub fn pop(&self) -> Option<DeferredJob<T>> {
        self.jobs.lock().pop_front()
    }

    /// Consumer side: run everything queued so far, oldest first.
    /// Returns the number of jobs executed.
    pub fn run_pending(&self, target: &T) -> usize {
        let mut ran = 0;
        while let Some(job) = self.pop() {
            job.run(target);
            self.completed.fetch_add(1, Ordering::AcqRel);
            ran += 1;
        }
        ran
    }

    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// True once every accepted job has finished running.
    pub fn is_idle(&self) -> bool {
        self.accepted.load(Ordering::Acquire) == self.completed.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::Acquire)
    }

    pub fn set_waker(&self, waker: Waker) {
        *self.waker.lock() = Some(waker);
    }

    pub fn clear_waker(&self) {
        *self.waker.lock() = None;
    }
}
