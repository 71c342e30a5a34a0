//! RESP reply encoding.
//!
//! Every command handler produces a [`Reply`]; [`Reply::write_to`]
//! serializes it to the wire shape a RESP client expects.

use std::io::{self, Write};

/// The shapes a command's result can take on the wire.
pub enum Reply {
    /// `+OK\r\n`-style simple string. Must not contain CR or LF.
    Simple(String),
    /// `-ERR message\r\n`-style error.
    Error(String),
    /// `:123\r\n`-style signed integer.
    Integer(i64),
    /// `$3\r\nfoo\r\n`-style bulk string.
    Bulk(Vec<u8>),
    /// `$-1\r\n`: a bulk reply with no value (missing key).
    NullBulk,
    /// `*-1\r\n`: an array reply with no value.
    NullArray,
    /// `*N\r\n` followed by each element's own encoding.
    Array(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::Simple("OK".to_string())
    }

    pub fn bulk_from(bytes: impl Into<Vec<u8>>) -> Reply {
        Reply::Bulk(bytes.into())
    }

    /// An array of bulk strings, the shape most collection commands
    /// (`LRANGE`, `SMEMBERS`, `KEYS`, ...) reply with.
    pub fn bulk_array(items: Vec<Vec<u8>>) -> Reply {
        Reply::Array(items.into_iter().map(Reply::Bulk).collect())
    }

    /// An array alternating member and score bulk strings, the shape
    /// `ZRANGE ... WITHSCORES` replies with.
    pub fn zset_with_scores(items: Vec<(String, f64)>) -> Reply {
        let mut out = Vec::with_capacity(items.len() * 2);
        for (member, score) in items {
            out.push(Reply::Bulk(member.into_bytes()));
            out.push(Reply::Bulk(format_score(score).into_bytes()));
        }
        Reply::Array(out)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Reply::Simple(s) => write!(w, "+{s}\r\n"),
            Reply::Error(s) => write!(w, "-{s}\r\n"),
            Reply::Integer(n) => write!(w, ":{n}\r\n"),
            Reply::Bulk(b) => {
                write!(w, "${}\r\n", b.len())?;
                w.write_all(b)?;
                w.write_all(b"\r\n")
            }
            Reply::NullBulk => w.write_all(b"$-1\r\n"),
            Reply::NullArray => w.write_all(b"*-1\r\n"),
            Reply::Array(items) => {
                write!(w, "*{}\r\n", items.len())?;
                for item in items {
                    item.write_to(w)?;
                }
                Ok(())
            }
        }
    }

    /// Convenience for tests and for feeding a reply into the AOF
    /// rewrite path's in-memory command buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf).expect("writing to a Vec never fails");
        buf
    }
}

/// Formats a float the way `ZSCORE`/`ZRANGE WITHSCORES` do: integral
/// scores print without a trailing `.0`. Also used by the AOF writer
/// when it serializes a `ZADD` for a rewrite, since scores there must
/// round-trip through the same textual form a client would send.
pub fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.is_finite() {
        format!("{}", score as i64)
    } else {
        format!("{score}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_and_error_replies_match_resp_shape() {
        assert_eq!(Reply::ok().to_bytes(), b"+OK\r\n");
        assert_eq!(Reply::Error("ERR boom".into()).to_bytes(), b"-ERR boom\r\n");
    }

    #[test]
    fn integer_reply_matches_resp_shape() {
        assert_eq!(Reply::Integer(42).to_bytes(), b":42\r\n");
        assert_eq!(Reply::Integer(-1).to_bytes(), b":-1\r\n");
    }

    #[test]
    fn bulk_and_null_bulk_match_resp_shape() {
        assert_eq!(Reply::bulk_from("foo").to_bytes(), b"$3\r\nfoo\r\n");
        assert_eq!(Reply::NullBulk.to_bytes(), b"$-1\r\n");
    }

    #[test]
    fn bulk_array_nests_each_element() {
        let reply = Reply::bulk_array(vec![b"a".to_vec(), b"bb".to_vec()]);
        assert_eq!(reply.to_bytes(), b"*2\r\n$1\r\na\r\n$2\r\nbb\r\n");
    }

    #[test]
    fn zset_with_scores_interleaves_member_and_score() {
        let reply = Reply::zset_with_scores(vec![("a".into(), 1.0), ("b".into(), 2.5)]);
        assert_eq!(
            reply.to_bytes(),
            b"*4\r\n$1\r\na\r\n$1\r\n1\r\n$1\r\nb\r\n$3\r\n2.5\r\n"
        );
    }
}
