//! Per-connection state: the incremental request parser, pending
//! reply queue, and raw socket I/O for one client file descriptor.

use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;

use emberkv_core::limits::{MAX_WRITE_PER_EVENT, READ_BUF_CHUNK};
use emberkv_proto::RequestParser;

use crate::socket;

/// What happened after a single `flush_replies` attempt.
pub enum FlushOutcome {
    /// Every queued reply was fully written.
    Drained,
    /// Some bytes remain queued; caller should keep the writable
    /// file event registered and try again later.
    Pending,
    /// The peer is gone (`EPIPE`/`ECONNRESET`); free the client.
    PeerGone,
}

pub struct Client {
    pub fd: RawFd,
    pub db_index: usize,
    pub authenticated: bool,
    parser: RequestParser,
    reply_queue: VecDeque<Vec<u8>>,
    sent_len: usize,
}

impl Client {
    pub fn new(fd: RawFd) -> Self {
        Client {
            fd,
            db_index: 0,
            authenticated: false,
            parser: RequestParser::new(),
            reply_queue: VecDeque::new(),
            sent_len: 0,
        }
    }

    pub fn queue_reply(&mut self, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            self.reply_queue.push_back(bytes);
        }
    }

    pub fn has_pending_reply(&self) -> bool {
        !self.reply_queue.is_empty()
    }

    /// Reads whatever is available into the parser and returns every
    /// complete command found. Blank inline lines (empty `args`) are
    /// dropped, matching the source's `client.reset()` on an empty
    /// parse. Returns `Err(UnexpectedEof)` when the peer closed the
    /// connection, so the caller frees the client.
    pub fn read_commands(&mut self) -> io::Result<Vec<Vec<Vec<u8>>>> {
        let mut buf = [0u8; READ_BUF_CHUNK];
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            return if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) {
                Ok(Vec::new())
            } else {
                Err(err)
            };
        }
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer"));
        }

        self.parser.feed(&buf[..n as usize]);

        let mut commands = Vec::new();
        loop {
            match self
                .parser
                .next_command()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?
            {
                Some(args) => {
                    if !args.is_empty() {
                        commands.push(args);
                    }
                }
                None => break,
            }
        }
        Ok(commands)
    }

    /// Writes as much of the pending reply queue as the socket will
    /// accept right now, capped at `MAX_WRITE_PER_EVENT` bytes so one
    /// client with a huge reply (`KEYS *`) can't starve the others
    /// sharing this single-threaded loop.
    pub fn flush_replies(&mut self) -> io::Result<FlushOutcome> {
        let mut total_written = 0usize;
        while let Some(front) = self.reply_queue.front() {
            if self.sent_len >= front.len() {
                self.sent_len = 0;
                self.reply_queue.pop_front();
                continue;
            }

            let remaining = &front[self.sent_len..];
            let n = unsafe { libc::write(self.fd, remaining.as_ptr() as *const libc::c_void, remaining.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                return match err.raw_os_error() {
                    Some(libc::EPIPE) | Some(libc::ECONNRESET) => Ok(FlushOutcome::PeerGone),
                    _ if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                        Ok(FlushOutcome::Pending)
                    }
                    _ => Err(err),
                };
            }

            self.sent_len += n as usize;
            total_written += n as usize;
            if total_written > MAX_WRITE_PER_EVENT {
                return Ok(FlushOutcome::Pending);
            }
        }

        Ok(FlushOutcome::Drained)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        socket::close(self.fd);
    }
}
