//! Bounded FIFO channels.
//!
//! State lives behind a `parking_lot` mutex with two condition variables;
//! blocked senders and receivers release the lock while they wait.

use std::{collections::VecDeque, fmt, sync::Arc};

use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    log::LogCategory,
    log_debug,
    value::Value,
};

#[derive(Debug)]
struct ChannelState {
    queue: VecDeque<Value>,
    open: bool,
    /// Items sent but not yet received.
    count: usize,
}

#[derive(Debug)]
struct ChannelInner {
    id: Uuid,
    size: usize,
    state: Mutex<ChannelState>,
    not_empty: Condvar,
    not_full: Condvar,
}

/// A shared handle to a channel.
#[derive(Debug, Clone)]
pub struct Channel(Arc<ChannelInner>);

impl Channel {
    /// Creates a channel buffering up to `size` items; sizes below one become one.
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let channel = Self(Arc::new(ChannelInner {
            id: Uuid::new_v4(),
            size,
            state: Mutex::new(ChannelState {
                queue: VecDeque::with_capacity(size),
                open: true,
                count: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }));
        log_debug!(LogCategory::Trace, "--> created {channel}");
        channel
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.0.size
    }

    /// Enqueues `value`, blocking while the buffer is full.
    pub fn send(&self, value: Value) -> RunResult<()> {
        let mut state = self.0.state.lock();
        if !state.open {
            return Err(EgoError::new(ErrorKind::ChannelNotOpen).context(self.0.id));
        }
        while state.queue.len() >= self.0.size {
            self.0.not_full.wait(&mut state);
            if !state.open {
                return Err(EgoError::new(ErrorKind::ChannelNotOpen).context(self.0.id));
            }
        }
        log_debug!(LogCategory::Trace, "--> sending on {}", self.0.id);
        state.queue.push_back(value);
        state.count += 1;
        self.0.not_empty.notify_one();
        Ok(())
    }

    /// Dequeues a value, blocking until one arrives.
    ///
    /// A closed channel drains its remaining items before failing `ChannelNotOpen`.
    pub fn receive(&self) -> RunResult<Value> {
        let mut state = self.0.state.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                state.count -= 1;
                self.0.not_full.notify_one();
                log_debug!(LogCategory::Trace, "--> received on {}", self.0.id);
                return Ok(value);
            }
            if !state.open {
                return Err(EgoError::new(ErrorKind::ChannelNotOpen).context(self.0.id));
            }
            self.0.not_empty.wait(&mut state);
        }
    }

    /// Closes the channel, waking every waiter. Returns whether it was open.
    pub fn close(&self) -> bool {
        let mut state = self.0.state.lock();
        let was_open = state.open;
        state.open = false;
        self.0.not_empty.notify_all();
        self.0.not_full.notify_all();
        log_debug!(LogCategory::Trace, "--> closing {}", self.0.id);
        was_open
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.0.state.lock().open
    }

    /// Items waiting to be received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.state.lock().count
    }

    /// True once the channel is closed and drained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let state = self.0.state.lock();
        !state.open && state.count == 0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.lock();
        let status = if state.open { "open" } else { "closed" };
        write!(f, "chan({status}, size {}({}), id {})", self.0.size, state.count, self.0.id)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_send_then_receive() {
        let c = Channel::new(2);
        c.send(Value::Int(7)).unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c.receive().unwrap(), Value::Int(7));
    }

    #[test]
    fn test_close_drains_then_fails() {
        let c = Channel::new(3);
        c.send(Value::Int(1)).unwrap();
        c.send(Value::Int(2)).unwrap();
        assert!(c.close());
        assert!(!c.close());
        assert!(!c.is_empty());
        assert_eq!(c.send(Value::Int(3)).unwrap_err().kind(), ErrorKind::ChannelNotOpen);
        assert_eq!(c.receive().unwrap(), Value::Int(1));
        assert_eq!(c.receive().unwrap(), Value::Int(2));
        assert!(c.is_empty());
        assert_eq!(c.receive().unwrap_err().kind(), ErrorKind::ChannelNotOpen);
    }

    #[test]
    fn test_zero_size_is_clamped() {
        assert_eq!(Channel::new(0).size(), 1);
    }

    #[test]
    fn test_blocked_sender_resumes_after_receive() {
        let c = Channel::new(1);
        c.send(Value::Int(1)).unwrap();
        let sender = {
            let c = c.clone();
            thread::spawn(move || c.send(Value::Int(2)))
        };
        assert_eq!(c.receive().unwrap(), Value::Int(1));
        sender.join().unwrap().unwrap();
        assert_eq!(c.receive().unwrap(), Value::Int(2));
    }

    #[test]
    fn test_display() {
        let c = Channel::new(4);
        let text = c.to_string();
        assert!(text.starts_with("chan(open, size 4(0), id "), "{text}");
    }
}
