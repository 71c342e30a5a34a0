//! Incremental RESP request parser.
//!
//! Bytes arrive off a socket in arbitrary chunks; [`RequestParser`]
//! accumulates them and yields complete commands one at a time,
//! mirroring the three wire shapes a client may send: an inline
//! command, a single bulk string, or a multi-bulk array of bulk
//! strings (the shape every real client uses).

use emberkv_core::limits::MAX_INLINE_SIZE;
use emberkv_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandType {
    Unknown,
    Inline,
    Bulk,
    MultiBulk,
}

/// Accumulates bytes from one connection and yields complete commands.
///
/// Call [`RequestParser::feed`] with newly read bytes, then call
/// [`RequestParser::next_command`] in a loop until it returns
/// `Ok(None)`, at which point wait for more data to arrive.
pub struct RequestParser {
    buf: Vec<u8>,
    cmd_type: CommandType,
    multi_bulk_len: i64,
    bulk_len: i64,
    args: Vec<Vec<u8>>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        RequestParser {
            buf: Vec::new(),
            cmd_type: CommandType::Unknown,
            multi_bulk_len: 0,
            bulk_len: 0,
            args: Vec::new(),
        }
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// True once the buffer has grown past what a line-oriented frame
    /// may occupy before completing; callers should drop the
    /// connection rather than keep buffering forever.
    pub fn is_over_limit(&self) -> bool {
        self.buf.len() > MAX_INLINE_SIZE
    }

    fn crlf_index(&self) -> Option<usize> {
        self.buf.windows(2).position(|w| w == b"\r\n")
    }

    fn consume_line(&mut self, crlf: usize) -> Vec<u8> {
        let line = self.buf[..crlf].to_vec();
        self.buf.drain(..crlf + 2);
        line
    }

    fn parse_int_line(line: &[u8]) -> Result<i64, Error> {
        std::str::from_utf8(line)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| Error::Protocol("invalid integer in request".into()))
    }

    /// Attempts to parse one full command out of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed, `Ok(Some(args))`
    /// once a complete command has been consumed (an empty `Vec`
    /// means a blank line that the caller should silently discard),
    /// and `Err` on a protocol violation the caller should treat as
    /// fatal to the connection.
    pub fn next_command(&mut self) -> Result<Option<Vec<Vec<u8>>>, Error> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        if self.cmd_type == CommandType::Unknown {
            self.cmd_type = match self.buf[0] {
                b'*' => CommandType::MultiBulk,
                b'$' => CommandType::Bulk,
                _ => CommandType::Inline,
            };
        }

        let done = match self.cmd_type {
            CommandType::Inline => self.process_inline()?,
            CommandType::Bulk => self.process_bulk()?,
            CommandType::MultiBulk => self.process_multi_bulk()?,
            CommandType::Unknown => unreachable!(),
        };

        if !done {
            return Ok(None);
        }

        let args = std::mem::take(&mut self.args);
        self.cmd_type = CommandType::Unknown;
        self.multi_bulk_len = 0;
        self.bulk_len = 0;
        Ok(Some(args))
    }

    fn process_inline(&mut self) -> Result<bool, Error> {
        let crlf = match self.crlf_index() {
            Some(i) => i,
            None => return self.need_more_or_fail(),
        };
        let line = self.consume_line(crlf);
        self.args = line
            .split(|&b| b == b' ')
            .filter(|w| !w.is_empty())
            .map(|w| w.to_vec())
            .collect();
        Ok(true)
    }

    fn process_bulk(&mut self) -> Result<bool, Error> {
        if self.bulk_len == 0 {
            let crlf = match self.crlf_index() {
                Some(i) => i,
                None => return self.need_more_or_fail(),
            };
            let line = self.consume_line(crlf);
            let num = Self::parse_int_line(&line[1..])?;
            if num == 0 {
                return Ok(true);
            }
            self.bulk_len = num;
        }

        if (self.buf.len() as i64) < self.bulk_len + 2 {
            return Ok(false);
        }

        let n = self.bulk_len as usize;
        self.args.push(self.buf[..n].to_vec());
        self.buf.drain(..n + 2);
        self.bulk_len = 0;
        Ok(true)
    }

    fn process_multi_bulk(&mut self) -> Result<bool, Error> {
        if self.multi_bulk_len == 0 {
            let crlf = match self.crlf_index() {
                Some(i) => i,
                None => return self.need_more_or_fail(),
            };
            let line = self.consume_line(crlf);
            let num = Self::parse_int_line(&line[1..])?;
            if num == 0 {
                return Ok(true);
            }
            self.multi_bulk_len = num;
            self.args = Vec::with_capacity(num.max(0) as usize);
        }

        while self.multi_bulk_len > 0 {
            if self.bulk_len == 0 {
                let crlf = match self.crlf_index() {
                    Some(i) => i,
                    None => return self.need_more_or_fail(),
                };
                if self.buf[0] != b'$' {
                    return Err(Error::Protocol("expected '$' for bulk length".into()));
                }
                let line = self.consume_line(crlf);
                self.bulk_len = Self::parse_int_line(&line[1..])?;
            }

            let n = self.bulk_len as usize;
            if self.buf.len() < n + 2 {
                return Ok(false);
            }
            if &self.buf[n..n + 2] != b"\r\n" {
                return Err(Error::Protocol("expected CRLF for end of bulk string".into()));
            }
            self.args.push(self.buf[..n].to_vec());
            self.buf.drain(..n + 2);
            self.bulk_len = 0;
            self.multi_bulk_len -= 1;
        }

        Ok(true)
    }

    fn need_more_or_fail(&self) -> Result<bool, Error> {
        if self.is_over_limit() {
            Err(Error::Protocol("too big inline request".into()))
        } else {
            Ok(false)
        }
    }
}

/// Encodes `args` as a RESP multi-bulk array, the shape every
/// property test below feeds the parser in arbitrarily-sized chunks.
#[cfg(test)]
fn encode_multi_bulk(args: &[Vec<u8>]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_inline_command() {
        let mut p = RequestParser::new();
        p.feed(b"PING\r\n");
        let args = p.next_command().unwrap().unwrap();
        assert_eq!(args, vec![b"PING".to_vec()]);
    }

    #[test]
    fn parses_multi_bulk_command() {
        let mut p = RequestParser::new();
        p.feed(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
        let args = p.next_command().unwrap().unwrap();
        assert_eq!(args, vec![b"GET".to_vec(), b"foo".to_vec()]);
    }

    #[test]
    fn waits_for_more_data_on_partial_frame() {
        let mut p = RequestParser::new();
        p.feed(b"*2\r\n$3\r\nGET\r\n");
        assert_eq!(p.next_command().unwrap(), None);
        p.feed(b"$3\r\nfoo\r\n");
        let args = p.next_command().unwrap().unwrap();
        assert_eq!(args, vec![b"GET".to_vec(), b"foo".to_vec()]);
    }

    #[test]
    fn splits_multi_bulk_frame_fed_byte_by_byte() {
        let mut p = RequestParser::new();
        for &b in b"*1\r\n$4\r\nPING\r\n" {
            p.feed(&[b]);
        }
        let args = p.next_command().unwrap().unwrap();
        assert_eq!(args, vec![b"PING".to_vec()]);
    }

    #[test]
    fn rejects_multi_bulk_missing_dollar_prefix() {
        let mut p = RequestParser::new();
        p.feed(b"*1\r\nPING\r\n");
        assert!(p.next_command().is_err());
    }

    #[test]
    fn pipelines_back_to_back_commands() {
        let mut p = RequestParser::new();
        p.feed(b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n");
        assert_eq!(p.next_command().unwrap().unwrap(), vec![b"PING".to_vec()]);
        assert_eq!(p.next_command().unwrap().unwrap(), vec![b"PING".to_vec()]);
        assert_eq!(p.next_command().unwrap(), None);
    }

    proptest! {
        /// For any byte stream that is a concatenation of valid multi-bulk
        /// frames, split at arbitrary byte offsets and fed one chunk at a
        /// time, the parser yields exactly those frames back in order,
        /// regardless of where the chunk boundaries happen to land.
        #[test]
        fn recovers_frames_across_arbitrary_chunk_boundaries(
            commands in proptest::collection::vec(
                proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..8), 1..4),
                1..6,
            ),
            cut_points in proptest::collection::vec(1usize..7, 0..40),
        ) {
            let mut wire = Vec::new();
            for command in &commands {
                wire.extend_from_slice(&encode_multi_bulk(command));
            }

            let mut parser = RequestParser::new();
            let mut offset = 0;
            for cut in &cut_points {
                if offset >= wire.len() {
                    break;
                }
                let end = (offset + cut).min(wire.len());
                parser.feed(&wire[offset..end]);
                offset = end;
            }
            if offset < wire.len() {
                parser.feed(&wire[offset..]);
            }

            let mut received = Vec::new();
            while let Some(args) = parser.next_command().unwrap() {
                received.push(args);
            }
            prop_assert_eq!(received, commands);
        }
    }
}
