//! Single-reader lease for a connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::error::ClientError;

#[derive(Debug, Default)]
struct Readers {
    /// Thread holding the lease right now.
    holder: Option<ThreadId>,
    /// Thread that last polled. Between polls nobody reads, so it stays the
    /// reader until another thread takes over.
    poller: Option<ThreadId>,
}

/// Tracks which thread, if any, is draining the connection.
#[derive(Debug, Default)]
pub(crate) struct ReaderSlot {
    active: AtomicBool,
    readers: Mutex<Readers>,
}

impl ReaderSlot {
    /// Claims the reader role for the current thread for a reader loop.
    pub(crate) fn acquire(&self) -> Result<ReaderGuard<'_>, ClientError> {
        self.claim(false)
    }

    /// Claims the reader role for one poll; the current thread remains the
    /// reader after the lease ends.
    pub(crate) fn acquire_for_poll(&self) -> Result<ReaderGuard<'_>, ClientError> {
        self.claim(true)
    }

    /// Returns `true` when called from the thread holding the lease, or from
    /// the thread that polled last while no other thread has read since.
    pub(crate) fn is_current(&self) -> bool {
        let current = Some(thread::current().id());
        let readers = self.lock();
        readers.holder == current || readers.poller == current
    }

    fn claim(&self, polling: bool) -> Result<ReaderGuard<'_>, ClientError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ClientError::ConcurrentRead);
        }
        let current = thread::current().id();
        let mut readers = self.lock();
        readers.holder = Some(current);
        readers.poller = polling.then_some(current);
        drop(readers);
        Ok(ReaderGuard { slot: self })
    }

    fn lock(&self) -> MutexGuard<'_, Readers> {
        self.readers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the reader lease when dropped.
#[derive(Debug)]
pub(crate) struct ReaderGuard<'a> {
    slot: &'a ReaderSlot,
}

impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        self.slot.lock().holder = None;
        self.slot.active.store(false, Ordering::Release);
    }
}
