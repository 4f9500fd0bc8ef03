//! Bounded readiness wait across many descriptors, on [`mio::Poll`].
//!
//! One call waits on every open handle at once, so the monitor loop reacts as soon as
//! any keyboard has input and still wakes up at least once per timeout to check its
//! running flag.
//!
//! The working set changes between calls, so each call registers every descriptor with
//! the poller, waits once and deregisters them again. A descriptor that already has
//! input when it is registered is reported by that same wait.
//!
//! ## Readiness rules
//! - readable → ready.
//! - error / read side closed (hangup) → also ready: the following read surfaces the
//!   failure as a per-device read error, which only drops that one handle.
//! - a descriptor the poller rejects as closed (`EBADF`), or a negative one →
//!   [`MultiplexError::Invalidated`]: the set is stale and the caller must discard and
//!   rebuild it.
//! - interrupted wait → empty ready set.

use crate::device::HandleId;
use crate::error::MultiplexError;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Reusable poller for [`wait_readable`](Self::wait_readable).
#[derive(Debug)]
pub struct Multiplexer {
    poll: Poll,
    events: Events,
}

impl Multiplexer {
    pub fn new() -> Result<Self, MultiplexError> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(16),
        })
    }

    /// Wait up to `timeout` for any of `fds` to become readable.
    ///
    /// Ready handles come back in the order of `fds`.
    pub fn wait_readable(
        &mut self,
        fds: &[(HandleId, RawFd)],
        timeout: Duration,
    ) -> Result<Vec<HandleId>, MultiplexError> {
        if fds.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(&(handle, _)) = fds.iter().find(|(_, fd)| *fd < 0) {
            return Err(MultiplexError::Invalidated {
                handle: handle.get(),
            });
        }
        if self.events.capacity() < fds.len() {
            self.events = Events::with_capacity(fds.len());
        }

        let mut registered = 0;
        let mut outcome = Ok(());
        for (i, &(handle, fd)) in fds.iter().enumerate() {
            let added = self
                .poll
                .registry()
                .register(&mut SourceFd(&fd), Token(i), Interest::READABLE);
            if let Err(e) = added {
                outcome = Err(match e.raw_os_error() {
                    Some(libc::EBADF) => MultiplexError::Invalidated {
                        handle: handle.get(),
                    },
                    _ => MultiplexError::Os(e),
                });
                break;
            }
            registered += 1;
        }

        let ready = outcome.and_then(|()| self.poll_once(fds, timeout));

        // The descriptor may have been closed meanwhile; the kernel then already dropped it.
        for &(_, fd) in &fds[..registered] {
            let _ = self.poll.registry().deregister(&mut SourceFd(&fd));
        }
        ready
    }

    fn poll_once(
        &mut self,
        fds: &[(HandleId, RawFd)],
        timeout: Duration,
    ) -> Result<Vec<HandleId>, MultiplexError> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(MultiplexError::Os(e)),
        }

        let mut hit = vec![false; fds.len()];
        for event in self.events.iter() {
            if event.is_readable() || event.is_read_closed() || event.is_error() {
                if let Some(slot) = hit.get_mut(event.token().0) {
                    *slot = true;
                }
            }
        }
        Ok(fds
            .iter()
            .zip(hit)
            .filter_map(|(&(handle, _), ready)| ready.then_some(handle))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::Instant;

    fn mux() -> Multiplexer {
        Multiplexer::new().unwrap()
    }

    #[test]
    fn empty_set_returns_immediately() {
        let start = Instant::now();
        assert!(mux().wait_readable(&[], Duration::from_secs(5)).unwrap().is_empty());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn times_out_with_nothing_ready() {
        let (_a, b) = UnixStream::pair().unwrap();
        let h = HandleId::next();
        let ready = mux()
            .wait_readable(&[(h, b.as_raw_fd())], Duration::from_millis(20))
            .unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn reports_only_the_readable_subset() {
        let (mut a1, b1) = UnixStream::pair().unwrap();
        let (_a2, b2) = UnixStream::pair().unwrap();
        let (h1, h2) = (HandleId::next(), HandleId::next());

        a1.write_all(b"x").unwrap();
        let ready = mux()
            .wait_readable(
                &[(h1, b1.as_raw_fd()), (h2, b2.as_raw_fd())],
                Duration::from_millis(200),
            )
            .unwrap();
        assert_eq!(ready, vec![h1]);
    }

    #[test]
    fn unread_input_is_reported_again_on_the_next_wait() {
        let (mut a, b) = UnixStream::pair().unwrap();
        let h = HandleId::next();
        let mut mux = mux();

        a.write_all(b"x").unwrap();
        let set = [(h, b.as_raw_fd())];
        assert_eq!(mux.wait_readable(&set, Duration::from_millis(200)).unwrap(), vec![h]);
        // Nothing was read in between.
        assert_eq!(mux.wait_readable(&set, Duration::from_millis(200)).unwrap(), vec![h]);
    }

    #[test]
    fn hangup_counts_as_ready() {
        let (a, b) = UnixStream::pair().unwrap();
        let h = HandleId::next();
        drop(a);
        let ready = mux()
            .wait_readable(&[(h, b.as_raw_fd())], Duration::from_millis(200))
            .unwrap();
        assert_eq!(ready, vec![h]);
    }

    #[test]
    fn negative_descriptor_invalidates_the_set() {
        let h = HandleId::next();
        let err = mux().wait_readable(&[(h, -1)], Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, MultiplexError::Invalidated { handle } if handle == h.get()));
    }

    #[test]
    fn closed_descriptor_invalidates_the_set() {
        let (_a, b) = UnixStream::pair().unwrap();
        let live = HandleId::next();
        let stale = HandleId::next();
        let mut mux = mux();
        // Far above anything the test process has open.
        let err = mux
            .wait_readable(
                &[(live, b.as_raw_fd()), (stale, 900_000)],
                Duration::from_millis(10),
            )
            .unwrap_err();
        assert!(matches!(err, MultiplexError::Invalidated { handle } if handle == stale.get()));

        // The live descriptor was released again, so the poller is reusable.
        let ready = mux
            .wait_readable(&[(live, b.as_raw_fd())], Duration::from_millis(10))
            .unwrap();
        assert!(ready.is_empty());
    }
}
