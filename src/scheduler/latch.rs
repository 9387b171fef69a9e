use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct CountDownLatch {
    remaining: Mutex<usize>,
    zero: Condvar,
}
impl CountDownLatch {
    pub fn new(count: usize) -> Self {
        Self { remaining: Mutex::new(count), zero: Condvar::new() }
    }
    pub fn count_down(&self) {
        let mut remaining = self.remaining.lock();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.zero.notify_all();
        }
    }
    pub fn remaining(&self) -> usize {
        *self.remaining.lock()
    }
    /// Returns false if `timeout` passed before the count reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            if self.zero.wait_until(&mut remaining, deadline).timed_out() {
                return *remaining == 0;
            }
        }
        true
    }
}
