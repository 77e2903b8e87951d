//! Platform Module
//!
//! Portable events and threads used by fence tests. Events are auto-reset
//! and start unsignaled. On Windows they are Win32 event objects; elsewhere
//! a mutex/condvar pair provides the same contract.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::harness::report;

/// Timeout value that blocks until the event is signaled.
pub const INFINITE: u32 = u32::MAX;

/// Outcome of [`wait_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Signaled,
    Timeout,
    Failed,
}

/// An auto-reset synchronization event.
///
/// Clones refer to the same underlying event, which lets a fence hold on to
/// an event while the test keeps waiting on it.
#[derive(Clone)]
pub struct Event {
    inner: Arc<imp::RawEvent>,
}

impl Event {
    /// Set the event. At most one wait is released per signal.
    pub fn signal(&self) {
        self.inner.signal();
    }

    /// Wait for the event, consuming the signal on success.
    pub fn wait(&self, timeout_ms: u32) -> WaitResult {
        self.inner.wait(timeout_ms)
    }

    /// True if both values refer to the same event object.
    pub fn same_event(&self, other: &Event) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// True if this is the last handle, so no one can wait on the event.
    pub fn is_orphaned(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("ptr", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

pub fn create_event() -> io::Result<Event> {
    Ok(Event {
        inner: Arc::new(imp::RawEvent::new()?),
    })
}

pub fn signal_event(event: &Event) {
    event.signal();
}

pub fn wait_event(event: &Event, timeout_ms: u32) -> WaitResult {
    event.wait(timeout_ms)
}

pub fn destroy_event(event: Event) {
    drop(event);
}

/// A host thread started by [`create_thread`].
pub struct ThreadHandle {
    handle: JoinHandle<()>,
}

/// Start a host thread.
///
/// The thread reports its checks into the diagnostics collector of the
/// thread that created it.
pub fn create_thread<F>(f: F) -> io::Result<ThreadHandle>
where
    F: FnOnce() + Send + 'static,
{
    let body = report::inherit(f);
    let handle = thread::Builder::new()
        .name("conformance-worker".to_string())
        .spawn(body)?;
    debug!("Started worker thread {:?}", handle.thread().id());
    Ok(ThreadHandle { handle })
}

/// Wait for a thread to finish. Returns false if it panicked.
pub fn join_thread(thread: ThreadHandle) -> bool {
    match thread.handle.join() {
        Ok(()) => true,
        Err(_) => {
            warn!("Worker thread panicked");
            false
        }
    }
}

#[cfg(windows)]
mod imp {
    use std::io;

    use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
    use windows::Win32::System::Threading::{CreateEventW, SetEvent, WaitForSingleObject};

    use super::WaitResult;

    pub struct RawEvent {
        handle: HANDLE,
    }

    // SAFETY: Win32 event handles may be used from any thread.
    unsafe impl Send for RawEvent {}
    unsafe impl Sync for RawEvent {}

    impl RawEvent {
        pub fn new() -> io::Result<Self> {
            // Auto-reset, initially unsignaled.
            let handle = unsafe { CreateEventW(None, false, false, None) }
                .map_err(|e| io::Error::from_raw_os_error(e.code().0))?;
            Ok(Self { handle })
        }

        pub fn signal(&self) {
            unsafe {
                let _ = SetEvent(self.handle);
            }
        }

        pub fn wait(&self, timeout_ms: u32) -> WaitResult {
            let ret = unsafe { WaitForSingleObject(self.handle, timeout_ms) };
            if ret == WAIT_OBJECT_0 {
                WaitResult::Signaled
            } else if ret == WAIT_TIMEOUT {
                WaitResult::Timeout
            } else {
                WaitResult::Failed
            }
        }
    }

    impl Drop for RawEvent {
        fn drop(&mut self) {
            if !self.handle.is_invalid() {
                unsafe {
                    let _ = CloseHandle(self.handle);
                }
            }
        }
    }
}

#[cfg(not(windows))]
mod imp {
    use std::io;
    use std::time::{Duration, Instant};

    use parking_lot::{Condvar, Mutex};

    use super::{WaitResult, INFINITE};

    pub struct RawEvent {
        signaled: Mutex<bool>,
        cond: Condvar,
    }

    impl RawEvent {
        pub fn new() -> io::Result<Self> {
            Ok(Self {
                signaled: Mutex::new(false),
                cond: Condvar::new(),
            })
        }

        pub fn signal(&self) {
            let mut signaled = self.signaled.lock();
            *signaled = true;
            self.cond.notify_one();
        }

        pub fn wait(&self, timeout_ms: u32) -> WaitResult {
            let mut signaled = self.signaled.lock();
            if timeout_ms == INFINITE {
                while !*signaled {
                    self.cond.wait(&mut signaled);
                }
            } else {
                let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
                while !*signaled {
                    if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                        break;
                    }
                }
                if !*signaled {
                    return WaitResult::Timeout;
                }
            }
            *signaled = false;
            WaitResult::Signaled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_event_starts_unsignaled() {
        let event = create_event().unwrap();
        assert_eq!(wait_event(&event, 0), WaitResult::Timeout);
        destroy_event(event);
    }

    #[test]
    fn test_last_handle_is_orphaned() {
        let event = create_event().unwrap();
        assert!(event.is_orphaned());
        let held = event.clone();
        assert!(!held.is_orphaned());
        destroy_event(event);
        assert!(held.is_orphaned());
    }

    #[test]
    fn test_event_is_auto_reset() {
        let event = create_event().unwrap();
        signal_event(&event);
        assert_eq!(wait_event(&event, 0), WaitResult::Signaled);
        assert_eq!(wait_event(&event, 0), WaitResult::Timeout);
    }

    #[test]
    fn test_signal_wakes_infinite_wait() {
        let event = create_event().unwrap();
        let waiter = event.clone();
        let thread = create_thread(move || {
            assert_eq!(waiter.wait(INFINITE), WaitResult::Signaled);
        })
        .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        event.signal();
        assert!(join_thread(thread));
    }

    #[test]
    fn test_join_reports_thread_result() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let thread = create_thread(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert!(join_thread(thread));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let a = create_event().unwrap();
        let b = a.clone();
        assert!(a.same_event(&b));
        a.signal();
        assert_eq!(b.wait(0), WaitResult::Signaled);
    }
}
