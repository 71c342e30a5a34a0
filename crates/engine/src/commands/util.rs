//! Shared argument parsing and error-to-reply conversion used by every
//! command handler.

use emberkv_core::Error;
use emberkv_proto::Reply;

/// Converts an [`Error`] into the RESP error reply it maps to.
/// Variants whose `Display` already carries a RESP error code
/// (`WRONGTYPE`, `NOAUTH`) are passed through verbatim; everything
/// else gets the generic `ERR` prefix.
pub fn error_reply(err: Error) -> Reply {
    let msg = err.to_string();
    if msg.starts_with("WRONGTYPE") || msg.starts_with("NOAUTH") {
        Reply::Error(msg)
    } else {
        Reply::Error(format!("ERR {msg}"))
    }
}

/// Interprets an argument as UTF-8 text (key names, field names,
/// members — the parts of a command that are semantically strings
/// rather than opaque byte payloads).
pub fn arg_str(bytes: &[u8]) -> Result<&str, Reply> {
    std::str::from_utf8(bytes).map_err(|_| error_reply(Error::Protocol("argument is not valid UTF-8".into())))
}

pub fn parse_i64(bytes: &[u8]) -> Result<i64, Reply> {
    arg_str(bytes)?.parse::<i64>().map_err(|_| error_reply(Error::NotAnInteger))
}

pub fn parse_f64(bytes: &[u8]) -> Result<f64, Reply> {
    arg_str(bytes)?.parse::<f64>().map_err(|_| error_reply(Error::NotAFloat))
}
