//! `BGREWRITEAOF`: the only command that talks to the background
//! rewrite machinery rather than a database.

use emberkv_proto::Reply;

use crate::dispatch::CommandContext;

/// Only *requests* a rewrite — the server's dispatcher decides
/// whether one is already in progress and actually starts the worker
/// (§4.8: the CAS on the background task tag lives in `Server`, not
/// here, since only `Server` owns the databases to snapshot).
pub fn bgrewriteaof(ctx: &mut CommandContext) -> Reply {
    if ctx.rewrite_in_progress {
        return Reply::Simple("Background append only file rewriting already in progress".to_string());
    }
    ctx.request_rewrite = true;
    Reply::Simple("Background append only file rewriting started".to_string())
}

#[cfg(test)]
mod tests {
    use emberkv_storage::Database;

    use super::*;

    fn ctx_for<'a>(db: &'a mut Database, args: &'a [Vec<u8>], authed: &'a mut bool) -> CommandContext<'a> {
        CommandContext {
            db,
            args,
            authenticated: authed,
            requirepass: None,
            dbs_len: 16,
            select_db: None,
            dirty: 0,
            rewrite_in_progress: false,
            request_rewrite: false,
        }
    }

    #[test]
    fn requests_a_rewrite_when_none_in_progress() {
        let mut db = Database::new(0);
        let mut authed = true;
        let mut ctx = ctx_for(&mut db, &[b"bgrewriteaof".to_vec()], &mut authed);
        bgrewriteaof(&mut ctx);
        assert!(ctx.request_rewrite);
    }

    #[test]
    fn reports_already_in_progress_without_requesting_another() {
        let mut db = Database::new(0);
        let mut authed = true;
        let mut ctx = ctx_for(&mut db, &[b"bgrewriteaof".to_vec()], &mut authed);
        ctx.rewrite_in_progress = true;
        bgrewriteaof(&mut ctx);
        assert!(!ctx.request_rewrite);
    }
}
