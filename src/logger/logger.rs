use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use parking_lot::{Condvar, Mutex};

const MAX_QUEUE_SIZE: usize = 100;

struct LogMsg {
    timestamp: chrono::DateTime<Utc>,
    message: String,
    /// Messages dropped while this record was the newest in a full
    /// queue.
    queue_full_count: u64,
}

struct LoggerState {
    queue: VecDeque<LogMsg>,
    stop: bool,
}

struct LoggerInner {
    state: Mutex<LoggerState>,
    cond: Condvar,
    output: Mutex<Box<dyn Write + Send>>,
}

impl LoggerInner {
    /// Drain the queue into the output. The state lock is dropped while
    /// the buffer is written out.
    fn process_queue(&self, state: &mut parking_lot::MutexGuard<'_, LoggerState>) {
        let mut buf = String::new();
        while let Some(item) = state.queue.pop_front() {
            buf.push_str(&format!(
                "{}: {}\n",
                item.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                item.message
            ));
            if item.queue_full_count != 0 {
                buf.push_str(&format!(
                    "{}: LOG OVERLOADED - missing {} entries\n",
                    item.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                    item.queue_full_count
                ));
            }
        }

        if !buf.is_empty() {
            parking_lot::MutexGuard::unlocked(state, || {
                let mut output = self.output.lock();
                let _ = output.write_all(buf.as_bytes());
                let _ = output.flush();
            });
        }
    }

    fn run(&self) {
        let mut state = self.state.lock();
        loop {
            self.process_queue(&mut state);
            if state.stop {
                break;
            }
            if state.queue.is_empty() {
                self.cond.wait(&mut state);
            }
        }
    }
}

/// Thread-safe logger: a single background thread drains a bounded queue
/// of records. When the queue is full, new messages increment the newest
/// record's overflow counter instead of being enqueued.
///
/// Handles clone cheaply; pass one to each worker at construction.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    /// Start the logger thread, writing to the given output.
    pub fn spawn(output: Box<dyn Write + Send>) -> (Logger, LoggerHandle) {
        let inner = Arc::new(LoggerInner {
            state: Mutex::new(LoggerState {
                queue: VecDeque::new(),
                stop: false,
            }),
            cond: Condvar::new(),
            output: Mutex::new(output),
        });
        let thread_inner = inner.clone();
        let thread = thread::spawn(move || thread_inner.run());
        (
            Logger { inner: inner.clone() },
            LoggerHandle {
                inner,
                thread: Some(thread),
            },
        )
    }

    /// A logger writing to stderr.
    pub fn stderr() -> (Logger, LoggerHandle) {
        Logger::spawn(Box::new(std::io::stderr()))
    }

    fn log(&self, message: String) {
        let mut state = self.inner.state.lock();
        if state.queue.len() >= MAX_QUEUE_SIZE {
            if let Some(newest) = state.queue.back_mut() {
                newest.queue_full_count += 1;
            }
        } else {
            state.queue.push_back(LogMsg {
                timestamp: Utc::now(),
                message,
                queue_full_count: 0,
            });
            self.inner.cond.notify_all();
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(format!("D:{}", message.as_ref()));
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(format!("I:{}", message.as_ref()));
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(format!("W:{}", message.as_ref()));
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(format!("E:{}", message.as_ref()));
    }

    pub fn error_with(&self, context: &str, err: &dyn std::fmt::Display) {
        self.log(format!("E:{}: {}", context, err));
    }
}

/// Owns the logger thread; joining flushes any remaining records.
pub struct LoggerHandle {
    inner: Arc<LoggerInner>,
    thread: Option<thread::JoinHandle<()>>,
}

impl LoggerHandle {
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        {
            let mut state = self.inner.state.lock();
            state.stop = true;
            self.inner.cond.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        // Flush anything logged after the thread observed the stop flag.
        let mut state = self.inner.state.lock();
        self.inner.process_queue(&mut state);
    }
}

impl Drop for LoggerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}
