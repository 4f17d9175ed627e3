//! Deferred request queue
//!
//! All bus traffic runs on a single [`Worker`]. Other contexts enqueue [`Deferred`] requests;
//! the worker executes them one at a time in arrival order. A request holds a plain function
//! and one word of argument, so enqueueing never allocates and is safe in interrupt context.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;

use crate::error::DispatchError;

/// A unit of work for the worker context `C`
///
/// The request runs exactly once; the queue never retries it.
pub struct Deferred<C> {
    handler: fn(&mut C, usize),
    arg: usize,
}

impl<C> Deferred<C> {
    pub const fn new(handler: fn(&mut C, usize), arg: usize) -> Self {
        Self { handler, arg }
    }

    pub fn arg(&self) -> usize {
        self.arg
    }

    fn run(self, context: &mut C) {
        (self.handler)(context, self.arg)
    }
}

impl<C> Clone for Deferred<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Deferred<C> {}

/// Bounded FIFO of deferred requests
pub struct Dispatcher<M: RawMutex, C, const N: usize> {
    channel: Channel<M, Deferred<C>, N>,
}

impl<M: RawMutex, C, const N: usize> Default for Dispatcher<M, C, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, C, const N: usize> Dispatcher<M, C, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Enqueues from task context, waiting for a free slot.
    pub async fn request(&self, request: Deferred<C>) {
        self.channel.send(request).await
    }

    /// Enqueues without waiting.
    pub fn try_request(&self, request: Deferred<C>) -> Result<(), DispatchError> {
        self.channel
            .try_send(request)
            .map_err(|_| DispatchError::Full)
    }

    /// Enqueues from interrupt context.
    ///
    /// # Panics
    ///
    /// Panics when the queue is full. A lost interrupt service request would leave
    /// acknowledged and pending interrupt flags out of step.
    pub fn request_from_isr(&self, request: Deferred<C>) {
        if self.channel.try_send(request).is_err() {
            error!("dispatch queue overflow");
            panic!("dispatch queue overflow");
        }
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

/// The sole consumer of a [`Dispatcher`]
///
/// Owns the context the requests operate on, typically the bus-owning
/// [`Station`](crate::interface::Station).
pub struct Worker<'a, M: RawMutex, C, const N: usize> {
    queue: &'a Dispatcher<M, C, N>,
    context: C,
}

impl<'a, M: RawMutex, C, const N: usize> Worker<'a, M, C, N> {
    pub fn new(queue: &'a Dispatcher<M, C, N>, context: C) -> Self {
        Self { queue, context }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            let request = self.queue.channel.receive().await;
            request.run(&mut self.context);
        }
    }

    /// Executes the oldest queued request, if any.
    pub fn try_run_one(&mut self) -> bool {
        match self.queue.channel.try_receive() {
            Ok(request) => {
                request.run(&mut self.context);
                true
            }
            Err(_) => false,
        }
    }

    /// Executes queued requests until the queue is empty and returns their count.
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while self.try_run_one() {
            count += 1;
        }
        count
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn into_context(self) -> C {
        self.context
    }
}
