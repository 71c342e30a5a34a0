//! Minimal single-threaded epoll reactor.
//!
//! Unlike the source's `ae` package, this reactor does not store a
//! per-event callback closure itself: [`EventLoop::poll`] returns
//! which file descriptors became ready and which time events fired,
//! and the caller (`emberkv-engine`'s `Server`) dispatches them
//! against its own client table. Storing `FileProc`/`TimeProc`
//! closures directly on the loop, as the source does, fights the
//! borrow checker once those closures need mutable access to state
//! the loop is itself being polled from; returning readiness and
//! letting the owner dispatch sidesteps that without losing the
//! source's wait/process split.

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_NEAREST_DELTA_MS: i64 = 1000;
const DEFAULT_EPOLL_WAIT_MS: i64 = 10;
const MAX_EPOLL_EVENTS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
    Readable,
    Writable,
}

struct TimeEvent {
    id: i64,
    recurring: bool,
    when_ms: i64,
    interval_ms: i64,
}

/// The file descriptors and timers that became ready in one
/// [`EventLoop::poll`] call.
pub struct ReadyEvents {
    pub files: Vec<(RawFd, FileEventKind)>,
    pub timers: Vec<i64>,
}

pub struct EventLoop {
    epoll_fd: RawFd,
    registered: HashMap<RawFd, u32>,
    time_events: Vec<TimeEvent>,
    next_time_id: i64,
    stop: bool,
}

impl EventLoop {
    pub fn new() -> io::Result<Self> {
        let epoll_fd = unsafe { libc::epoll_create1(0) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(EventLoop {
            epoll_fd,
            registered: HashMap::new(),
            time_events: Vec::new(),
            next_time_id: 0,
            stop: false,
        })
    }

    pub fn add_file_event(&mut self, fd: RawFd, kind: FileEventKind) -> io::Result<()> {
        let prev = *self.registered.get(&fd).unwrap_or(&0);
        let bit = epoll_bit(kind);
        if prev & bit != 0 {
            return Ok(());
        }
        let new_mask = prev | bit;
        let op = if prev == 0 { libc::EPOLL_CTL_ADD } else { libc::EPOLL_CTL_MOD };
        let mut ev = libc::epoll_event {
            events: new_mask,
            u64: fd as u64,
        };
        if unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, &mut ev) } < 0 {
            return Err(io::Error::last_os_error());
        }
        self.registered.insert(fd, new_mask);
        Ok(())
    }

    pub fn remove_file_event(&mut self, fd: RawFd, kind: FileEventKind) -> io::Result<()> {
        let prev = match self.registered.get(&fd) {
            Some(&m) => m,
            None => return Ok(()),
        };
        let new_mask = prev & !epoll_bit(kind);
        if new_mask == 0 {
            if unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) } < 0 {
                return Err(io::Error::last_os_error());
            }
            self.registered.remove(&fd);
        } else {
            let mut ev = libc::epoll_event {
                events: new_mask,
                u64: fd as u64,
            };
            if unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_MOD, fd, &mut ev) } < 0 {
                return Err(io::Error::last_os_error());
            }
            self.registered.insert(fd, new_mask);
        }
        Ok(())
    }

    /// Clears every registration for `fd`, used when a client is freed.
    pub fn remove_all_file_events(&mut self, fd: RawFd) {
        if self.registered.remove(&fd).is_some() {
            unsafe {
                libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut());
            }
        }
    }

    /// Registers a timer. `recurring` timers re-fire every
    /// `interval_ms`; one-shot timers must be removed by the caller
    /// (via [`EventLoop::remove_time_event`]) once handled, mirroring
    /// the source's `TypeTimeEventOnce` cleanup in `processEvents`.
    pub fn add_time_event(&mut self, interval_ms: i64, recurring: bool) -> i64 {
        let id = self.next_time_id;
        self.next_time_id += 1;
        self.time_events.push(TimeEvent {
            id,
            recurring,
            when_ms: now_ms() + interval_ms,
            interval_ms,
        });
        id
    }

    pub fn remove_time_event(&mut self, id: i64) {
        self.time_events.retain(|te| te.id != id);
    }

    pub fn stop(&mut self) {
        self.stop = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stop
    }

    /// Waits for ready file descriptors, sleeping at most until the
    /// nearest time event is due (§4.1's ordering: time events are
    /// collected based on wall-clock time sampled once per `poll`
    /// call, then file events, matching the source's `wait`).
    pub fn poll(&mut self) -> io::Result<ReadyEvents> {
        let nearest = self.nearest_time_ms();
        let mut timeout = nearest - now_ms();
        if timeout <= 0 {
            timeout = DEFAULT_EPOLL_WAIT_MS;
        }

        let mut events: Vec<libc::epoll_event> =
            std::iter::repeat_with(|| unsafe { std::mem::zeroed() })
                .take(MAX_EPOLL_EVENTS)
                .collect();
        let n = unsafe {
            libc::epoll_wait(self.epoll_fd, events.as_mut_ptr(), MAX_EPOLL_EVENTS as i32, timeout as i32)
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        let mut files = Vec::new();
        for ev in events.iter().take(n.max(0) as usize) {
            let fd = ev.u64 as RawFd;
            if ev.events & libc::EPOLLIN as u32 != 0 {
                files.push((fd, FileEventKind::Readable));
            }
            if ev.events & libc::EPOLLOUT as u32 != 0 {
                files.push((fd, FileEventKind::Writable));
            }
        }

        let now = now_ms();
        let mut timers = Vec::new();
        for te in &self.time_events {
            if te.when_ms <= now {
                timers.push(te.id);
            }
        }
        for te in &mut self.time_events {
            if te.when_ms <= now && te.recurring {
                te.when_ms = now + te.interval_ms;
            }
        }

        Ok(ReadyEvents { files, timers })
    }

    fn nearest_time_ms(&self) -> i64 {
        self.time_events
            .iter()
            .map(|te| te.when_ms)
            .min()
            .unwrap_or(now_ms() + DEFAULT_NEAREST_DELTA_MS)
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}

fn epoll_bit(kind: FileEventKind) -> u32 {
    match kind {
        FileEventKind::Readable => libc::EPOLLIN as u32,
        FileEventKind::Writable => libc::EPOLLOUT as u32,
    }
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_file_event_round_trips_registration() {
        let mut el = EventLoop::new().expect("epoll_create1");
        let (r, w) = make_pipe();
        el.add_file_event(r, FileEventKind::Readable).unwrap();
        assert!(el.registered.contains_key(&r));
        el.remove_file_event(r, FileEventKind::Readable).unwrap();
        assert!(!el.registered.contains_key(&r));
        unsafe {
            libc::close(r);
            libc::close(w);
        }
    }

    #[test]
    fn time_event_fires_after_interval_elapses() {
        let mut el = EventLoop::new().expect("epoll_create1");
        let id = el.add_time_event(1, false);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let ready = el.poll().unwrap();
        assert!(ready.timers.contains(&id));
    }

    fn make_pipe() -> (RawFd, RawFd) {
        let mut fds = [0i32; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        (fds[0], fds[1])
    }
}
