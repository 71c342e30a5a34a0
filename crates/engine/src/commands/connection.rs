//! `PING` / `SELECT` / `AUTH`: commands that act on the connection
//! itself rather than the keyspace.

use emberkv_core::Error;
use emberkv_proto::Reply;

use super::util::{arg_str, error_reply, parse_i64};
use crate::dispatch::CommandContext;

pub fn ping(_ctx: &mut CommandContext) -> Reply {
    Reply::Simple("PONG".to_string())
}

/// Validates the target index and signals the switch via
/// `ctx.select_db`; the caller applies it to the client's `db_index`
/// after the handler returns, since a handler only ever sees the
/// database it was dispatched against.
pub fn select(ctx: &mut CommandContext) -> Reply {
    let index = match parse_i64(&ctx.args[1]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    if index < 0 || index as usize >= ctx.dbs_len {
        return error_reply(Error::Protocol("invalid db index".into()));
    }
    ctx.select_db = Some(index as usize);
    Reply::ok()
}

/// An empty `requirepass` accepts any password, matching the source's
/// `requirePassword == "" || requirePassword == given`.
pub fn auth(ctx: &mut CommandContext) -> Reply {
    let given = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match ctx.requirepass {
        None => {
            *ctx.authenticated = true;
            Reply::ok()
        }
        Some(pass) if pass == given => {
            *ctx.authenticated = true;
            Reply::ok()
        }
        Some(_) => {
            *ctx.authenticated = false;
            error_reply(Error::InvalidPassword)
        }
    }
}

#[cfg(test)]
mod tests {
    use emberkv_storage::Database;

    use super::*;
    use crate::dispatch::CommandContext;

    fn ctx_for<'a>(db: &'a mut Database, args: &'a [Vec<u8>], authenticated: &'a mut bool) -> CommandContext<'a> {
        CommandContext {
            db,
            args,
            authenticated,
            requirepass: None,
            dbs_len: 16,
            select_db: None,
            dirty: 0,
            rewrite_in_progress: false,
            request_rewrite: false,
        }
    }

    #[test]
    fn select_rejects_out_of_range_index() {
        let mut db = Database::new(0);
        let args = vec![b"select".to_vec(), b"99".to_vec()];
        let mut authed = false;
        let mut ctx = ctx_for(&mut db, &args, &mut authed);
        let reply = select(&mut ctx);
        assert!(matches!(reply, Reply::Error(_)));
        assert!(ctx.select_db.is_none());
    }

    #[test]
    fn select_in_range_sets_select_db() {
        let mut db = Database::new(0);
        let args = vec![b"select".to_vec(), b"3".to_vec()];
        let mut authed = false;
        let mut ctx = ctx_for(&mut db, &args, &mut authed);
        select(&mut ctx);
        assert_eq!(ctx.select_db, Some(3));
    }

    #[test]
    fn auth_with_no_password_configured_always_succeeds() {
        let mut db = Database::new(0);
        let args = vec![b"auth".to_vec(), b"anything".to_vec()];
        let mut authed = false;
        let mut ctx = ctx_for(&mut db, &args, &mut authed);
        let reply = auth(&mut ctx);
        assert!(matches!(reply, Reply::Simple(_)));
        assert!(authed);
    }

    #[test]
    fn auth_with_wrong_password_is_rejected() {
        let mut db = Database::new(0);
        let args = vec![b"auth".to_vec(), b"wrong".to_vec()];
        let mut authed = true;
        let mut ctx = ctx_for(&mut db, &args, &mut authed);
        ctx.requirepass = Some("secret");
        let reply = auth(&mut ctx);
        assert!(matches!(reply, Reply::Error(_)));
        assert!(!authed);
    }
}
