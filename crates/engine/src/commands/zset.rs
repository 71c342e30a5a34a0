//! Sorted-set commands. The source uses one shared "missing key"
//! helper across every zset read, replying `NullBulk` uniformly —
//! even for `ZCARD`, which would more naturally reply `Integer(0)`.
//! Preserved literally (see DESIGN.md).

use emberkv_core::Error;
use emberkv_datastruct::Zset;
use emberkv_proto::Reply;
use emberkv_storage::{Database, Value};

use super::util::{arg_str, error_reply, parse_f64, parse_i64};
use crate::dispatch::CommandContext;

fn get_zset<'a>(db: &'a mut Database, key: &str) -> Result<&'a mut Zset, Reply> {
    if !db.contains(key) {
        db.set(key.to_string(), Value::Zset(Zset::new()));
    }
    match db.get_mut(key) {
        Some(Value::Zset(z)) => Ok(z),
        Some(_) => Err(error_reply(Error::WrongType)),
        None => unreachable!("just inserted"),
    }
}

fn get_zset_if_exist<'a>(db: &'a mut Database, key: &str) -> Result<&'a mut Zset, Reply> {
    match db.get_mut(key) {
        None => Err(Reply::NullBulk),
        Some(Value::Zset(z)) => Ok(z),
        Some(_) => Err(error_reply(Error::WrongType)),
    }
}

/// `key (score member)+`. Replies `OK` unconditionally, matching the
/// source's `zAddCommand`, which never counts new-vs-updated members.
pub fn zadd(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let zset = match get_zset(ctx.db, key) {
        Ok(z) => z,
        Err(r) => return r,
    };
    let mut i = 2;
    while i + 1 < ctx.args.len() {
        let score = match parse_f64(&ctx.args[i]) {
            Ok(s) => s,
            Err(r) => return r,
        };
        let member = match arg_str(&ctx.args[i + 1]) {
            Ok(s) => s.to_string(),
            Err(r) => return r,
        };
        zset.add(score, member);
        i += 2;
    }
    ctx.dirty += 1;
    Reply::ok()
}

pub fn zcard(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match get_zset_if_exist(ctx.db, key) {
        Ok(zset) => Reply::Integer(zset.len()),
        Err(r) => r,
    }
}

pub fn zscore(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let member = match arg_str(&ctx.args[2]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match get_zset_if_exist(ctx.db, key) {
        Ok(zset) => match zset.score(member) {
            Some(score) => Reply::Bulk(emberkv_proto::format_score(score).into_bytes()),
            None => Reply::NullBulk,
        },
        Err(r) => r,
    }
}

pub fn zcount(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let min = match parse_f64(&ctx.args[2]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    let max = match parse_f64(&ctx.args[3]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    match get_zset_if_exist(ctx.db, key) {
        Ok(zset) => Reply::Integer(zset.count(min, max)),
        Err(r) => r,
    }
}

/// Always includes scores — the source has no `WITHSCORES` flag at
/// all, so every `ZRANGE`/`ZRANGEBYSCORE` reply already carries them.
pub fn zrange(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let start = match parse_i64(&ctx.args[2]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    let stop = match parse_i64(&ctx.args[3]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    match get_zset_if_exist(ctx.db, key) {
        Ok(zset) => {
            let elements = zset.range_by_rank(start, stop, false);
            Reply::zset_with_scores(elements.into_iter().map(|e| (e.member, e.score)).collect())
        }
        Err(r) => r,
    }
}

pub fn zrangebyscore(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let min = match parse_f64(&ctx.args[2]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    let max = match parse_f64(&ctx.args[3]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    match get_zset_if_exist(ctx.db, key) {
        Ok(zset) => {
            let elements = zset.range_by_score(min, max, None, false);
            Reply::zset_with_scores(elements.into_iter().map(|e| (e.member, e.score)).collect())
        }
        Err(r) => r,
    }
}

/// Variadic over members; replies `OK` unconditionally, matching the
/// source's `zRemCommand`.
pub fn zrem(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match get_zset_if_exist(ctx.db, key) {
        Ok(zset) => {
            for member in &ctx.args[2..] {
                let member = match arg_str(member) {
                    Ok(s) => s,
                    Err(r) => return r,
                };
                zset.remove(member);
            }
            ctx.dirty += 1;
            Reply::ok()
        }
        Err(r) => r,
    }
}

pub fn zremrangebyrank(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let start = match parse_i64(&ctx.args[2]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    let stop = match parse_i64(&ctx.args[3]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    match get_zset_if_exist(ctx.db, key) {
        Ok(zset) => {
            zset.delete_range_by_rank(start, stop);
            ctx.dirty += 1;
            Reply::ok()
        }
        Err(r) => r,
    }
}

pub fn zremrangebyscore(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let min = match parse_f64(&ctx.args[2]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    let max = match parse_f64(&ctx.args[3]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    match get_zset_if_exist(ctx.db, key) {
        Ok(zset) => {
            zset.delete_range_by_score(min, max);
            ctx.dirty += 1;
            Reply::ok()
        }
        Err(r) => r,
    }
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
    fn zadd_then_zscore_round_trips() {
        let mut db = Database::new(0);
        let mut authed = true;
        zadd(&mut ctx_for(&mut db, &[b"zadd".to_vec(), b"z".to_vec(), b"1.5".to_vec(), b"a".to_vec()], &mut authed));
        let reply = zscore(&mut ctx_for(&mut db, &[b"zscore".to_vec(), b"z".to_vec(), b"a".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::Bulk(b) if b == b"1.5"));
    }

    #[test]
    fn zcard_on_missing_key_is_null_bulk_not_zero() {
        let mut db = Database::new(0);
        let mut authed = true;
        let reply = zcard(&mut ctx_for(&mut db, &[b"zcard".to_vec(), b"missing".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::NullBulk));
    }

    #[test]
    fn zrange_includes_scores() {
        let mut db = Database::new(0);
        let mut authed = true;
        zadd(&mut ctx_for(&mut db, &[b"zadd".to_vec(), b"z".to_vec(), b"1".to_vec(), b"a".to_vec(), b"2".to_vec(), b"b".to_vec()], &mut authed));
        let reply = zrange(&mut ctx_for(&mut db, &[b"zrange".to_vec(), b"z".to_vec(), b"0".to_vec(), b"-1".to_vec()], &mut authed));
        let Reply::Array(items) = reply else { panic!("expected array") };
        assert_eq!(items.len(), 4);
    }

    #[test]
    fn zrem_replies_ok_unconditionally() {
        let mut db = Database::new(0);
        let mut authed = true;
        zadd(&mut ctx_for(&mut db, &[b"zadd".to_vec(), b"z".to_vec(), b"1".to_vec(), b"a".to_vec()], &mut authed));
        let reply = zrem(&mut ctx_for(&mut db, &[b"zrem".to_vec(), b"z".to_vec(), b"nonexistent".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::Simple(_)));
    }
}
