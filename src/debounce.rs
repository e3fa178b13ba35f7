//! Debouncing of rapid inputs.

use crate::error::Result;
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Runs an action with the last pushed value once input has been quiet for
/// `delay`. Every push restarts the timer, so only the final value of a
/// burst is acted on.
///
/// Dropping the debouncer discards a pending value and stops its thread.
pub struct Debouncer<T: Send + 'static> {
    sender: Option<Sender<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(delay: Duration, mut action: F) -> Result<Self>
    where
        F: FnMut(T) + Send + 'static,
    {
        let (sender, receiver) = unbounded::<T>();

        let thread = thread::Builder::new()
            .name("debouncer".into())
            .spawn(move || {
                while let Ok(first) = receiver.recv() {
                    let mut pending = first;
                    loop {
                        match receiver.recv_timeout(delay) {
                            Ok(newer) => pending = newer,
                            Err(RecvTimeoutError::Timeout) => {
                                action(pending);
                                break;
                            }
                            Err(RecvTimeoutError::Disconnected) => return,
                        }
                    }
                }
            })?;

        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    /// Queue a value, superseding any value still waiting out the delay.
    pub fn push(&self, value: T) {
        if let Some(ref sender) = self.sender {
            let _ = sender.send(value);
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_last_value_runs() {
        let (tx, rx) = unbounded();
        let debouncer = Debouncer::new(Duration::from_millis(50), move |v: u32| {
            let _ = tx.send(v);
        })
        .unwrap();

        for v in 1..=5 {
            debouncer.push(v);
        }

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 5);
        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    }

    #[test]
    fn test_separate_bursts_each_run() {
        let (tx, rx) = unbounded();
        let debouncer = Debouncer::new(Duration::from_millis(20), move |v: &'static str| {
            let _ = tx.send(v);
        })
        .unwrap();

        debouncer.push("jo");
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "jo");
        debouncer.push("john");
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "john");
    }

    #[test]
    fn test_drop_discards_pending() {
        let (tx, rx) = unbounded();
        let debouncer = Debouncer::new(Duration::from_secs(5), move |v: u32| {
            let _ = tx.send(v);
        })
        .unwrap();

        debouncer.push(1);
        drop(debouncer);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
