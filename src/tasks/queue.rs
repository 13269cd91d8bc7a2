use std::collections::VecDeque;
use std::os::unix::io::RawFd;

use parking_lot::{Condvar, Mutex};

/// The state of a queue after pushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Queue has space for more items before throttling.
    HasSpace,
    /// Queue is nearly full (>= throttle_size items in it).
    LowSpace,
    /// Queue is full; the item was not enqueued.
    Full,
    /// Queue is closed; the item was not enqueued.
    Closed,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    closed: bool,
    nudge_fd: Option<RawFd>,
    nudge_byte: u8,
}

/// A threadsafe bounded queue with throttling.
///
/// Pushes never block: above the soft cap (`throttle_size`) throttled
/// pushes are refused, above the hard cap (`max_size`) all pushes are.
/// When configured, a nudge byte is written to a file descriptor whenever
/// a pop drops the size below the soft cap.
pub struct ThreadsafeQueue<T> {
    inner: Mutex<QueueInner<T>>,
    cond: Condvar,
    throttle_size: usize,
    max_size: usize,
}

impl<T> ThreadsafeQueue<T> {
    pub fn new(throttle_size: usize, max_size: usize) -> Self {
        ThreadsafeQueue {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                closed: false,
                nudge_fd: None,
                nudge_byte: b'Q',
            }),
            cond: Condvar::new(),
            throttle_size,
            max_size,
        }
    }

    /// Set the nudge file descriptor and byte; `None` disables nudges.
    pub fn set_nudge(&self, nudge_fd: Option<RawFd>, nudge_byte: u8) {
        let mut inner = self.inner.lock();
        inner.nudge_fd = nudge_fd;
        inner.nudge_byte = nudge_byte;
    }

    /// Close the queue: further pushes return `Closed`, and pops on an
    /// empty queue return immediately rather than blocking.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.cond.notify_all();
    }

    /// Push an item. Ownership transfers on every return value: on
    /// `Full` and `Closed` the item is dropped.
    pub fn push(&self, item: T, allow_throttle: bool) -> QueueState {
        let mut inner = self.inner.lock();
        if inner.closed {
            return QueueState::Closed;
        }
        let cap = if allow_throttle {
            self.throttle_size
        } else {
            self.max_size
        };
        if inner.items.len() >= cap {
            return QueueState::Full;
        }
        inner.items.push_back(item);
        // When the soft and hard caps coincide there is no has-space
        // band; every accepted push reports low space.
        let state = if inner.items.len() < self.throttle_size && self.throttle_size < self.max_size
        {
            QueueState::HasSpace
        } else {
            QueueState::LowSpace
        };
        self.cond.notify_one();
        state
    }

    /// Pop the oldest item, blocking while the queue is empty and open.
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut nudge: Option<(RawFd, u8)> = None;
        let result = {
            let mut inner = self.inner.lock();
            while !inner.closed && inner.items.is_empty() {
                self.cond.wait(&mut inner);
            }
            if inner.items.is_empty() {
                return None;
            }
            if inner.items.len() == self.throttle_size {
                // The size is about to drop below the throttle point.
                nudge = inner.nudge_fd.map(|fd| (fd, inner.nudge_byte));
            }
            let item = inner.items.pop_front();
            self.cond.notify_one();
            item
        };
        if let Some((fd, byte)) = nudge {
            // The write happens outside the lock; a lost nudge only
            // delays the mainloop wakeup.
            unsafe {
                libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}
