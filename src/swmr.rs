//! Single-writer, multiple-reader lock with a priority-access escape hatch.
//!
//! Threads that acquired priority access make every *new* lock request from
//! non-priority threads wait, while already-held reads and writes drain
//! normally. Maintenance passes (migrations, rescans) use this to starve
//! ordinary access for a bounded window. The lock is strictly not recursive,
//! and priority access itself is not recursive either.

use std::thread::ThreadId;

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct State {
    readers: usize,
    waiting_readers: usize,
    waiting_writers: usize,
    writing: bool,
    priority_owners: Vec<ThreadId>,
}

impl State {
    fn has_priority(&self, tid: ThreadId) -> bool {
        self.priority_owners.contains(&tid)
    }

    fn must_give_way(&self, tid: ThreadId) -> bool {
        !self.priority_owners.is_empty() && !self.has_priority(tid)
    }
}

#[derive(Default)]
pub struct SwmrLock {
    state: Mutex<State>,
    cond: Condvar,
}

impl SwmrLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_read(&self) -> ReadGuard<'_> {
        let tid = std::thread::current().id();
        let mut state = self.state.lock();
        state.waiting_readers += 1;
        while state.must_give_way(tid) || state.writing {
            self.cond.wait(&mut state);
        }
        state.waiting_readers -= 1;
        state.readers += 1;
        ReadGuard { lock: self }
    }

    pub fn lock_write(&self) -> WriteGuard<'_> {
        let tid = std::thread::current().id();
        let mut state = self.state.lock();
        state.waiting_writers += 1;
        while state.must_give_way(tid) || state.writing || state.readers > 0 {
            self.cond.wait(&mut state);
        }
        state.waiting_writers -= 1;
        state.writing = true;
        WriteGuard { lock: self }
    }

    /// Register the calling thread as a priority owner. While any owner is
    /// registered, lock requests from other threads block.
    pub fn acquire_priority_access(&self) -> PriorityGuard<'_> {
        let tid = std::thread::current().id();
        let mut state = self.state.lock();
        assert!(
            !state.has_priority(tid),
            "priority access is not recursive"
        );
        state.priority_owners.push(tid);
        PriorityGuard { lock: self }
    }

    fn unlock_read(&self) {
        let mut state = self.state.lock();
        state.readers -= 1;
        if state.readers == 0 && state.waiting_writers > 0 {
            self.cond.notify_one();
        }
    }

    fn unlock_write(&self) {
        let mut state = self.state.lock();
        state.writing = false;
        if state.waiting_readers > 0 || state.waiting_writers > 0 {
            self.cond.notify_all();
        }
    }

    fn release_priority_access(&self) {
        let tid = std::thread::current().id();
        let mut state = self.state.lock();
        let before = state.priority_owners.len();
        state.priority_owners.retain(|t| *t != tid);
        assert_ne!(before, state.priority_owners.len(), "thread held no priority access");
        if state.priority_owners.is_empty() {
            self.cond.notify_all();
        }
    }
}

pub struct ReadGuard<'a> {
    lock: &'a SwmrLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_read();
    }
}

pub struct WriteGuard<'a> {
    lock: &'a SwmrLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_write();
    }
}

pub struct PriorityGuard<'a> {
    lock: &'a SwmrLock,
}

impl Drop for PriorityGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_priority_access();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn concurrent_readers() {
        let lock = SwmrLock::new();
        let r1 = lock.lock_read();
        let r2 = lock.lock_read();
        drop(r1);
        drop(r2);
    }

    #[test]
    fn writer_excludes_readers() {
        let lock = Arc::new(SwmrLock::new());
        let acquired = Arc::new(AtomicUsize::new(0));

        let w = lock.lock_write();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                let acquired = acquired.clone();
                std::thread::spawn(move || {
                    let _r = lock.lock_read();
                    acquired.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(acquired.load(Ordering::SeqCst), 0);
        drop(w);
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(acquired.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn priority_starves_new_requests() {
        let lock = Arc::new(SwmrLock::new());
        let acquired = Arc::new(AtomicUsize::new(0));

        let prio = lock.acquire_priority_access();

        let handle = {
            let lock = lock.clone();
            let acquired = acquired.clone();
            std::thread::spawn(move || {
                let _r = lock.lock_read();
                acquired.fetch_add(1, Ordering::SeqCst);
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        // A non-priority reader must wait while priority access is held.
        assert_eq!(acquired.load(Ordering::SeqCst), 0);

        // The priority owner itself still gets through.
        {
            let _w = lock.lock_write();
        }

        drop(prio);
        handle.join().unwrap();
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "not recursive")]
    fn priority_access_is_not_recursive() {
        let lock = SwmrLock::new();
        let _a = lock.acquire_priority_access();
        let _b = lock.acquire_priority_access();
    }

    #[test]
    fn writers_drain_before_priority_writer() {
        let lock = Arc::new(SwmrLock::new());
        // A held read lock acquired before priority registration must drain
        // normally: the priority writer waits for it.
        let r = lock.lock_read();
        let prio = lock.acquire_priority_access();
        std::thread::scope(|s| {
            s.spawn(|| {
                // Simulate the read finishing while the priority writer waits.
                std::thread::sleep(Duration::from_millis(50));
                drop(r);
            });
            let _w = lock.lock_write();
        });
        drop(prio);
    }
}
