//! List commands. Unlike the hash/zset families, each of these
//! inlines its own "missing key" check in the source, so the sentinel
//! reply genuinely varies per command — preserved here rather than
//! forced through one shared helper.

use emberkv_core::Error;
use emberkv_datastruct::Quicklist;
use emberkv_proto::Reply;
use emberkv_storage::{Database, Value};

use super::util::{arg_str, error_reply, parse_i64};
use crate::dispatch::CommandContext;

fn get_list<'a>(db: &'a mut Database, key: &str) -> Result<&'a mut Quicklist<Vec<u8>>, Reply> {
    if !db.contains(key) {
        db.set(key.to_string(), Value::List(Quicklist::new()));
    }
    match db.get_mut(key) {
        Some(Value::List(l)) => Ok(l),
        Some(_) => Err(error_reply(Error::WrongType)),
        None => unreachable!("just inserted"),
    }
}

fn get_list_if_exist<'a>(db: &'a mut Database, key: &str) -> Result<Option<&'a mut Quicklist<Vec<u8>>>, Reply> {
    match db.get_mut(key) {
        None => Ok(None),
        Some(Value::List(l)) => Ok(Some(l)),
        Some(_) => Err(error_reply(Error::WrongType)),
    }
}

pub fn lpush(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let list = match get_list(ctx.db, key) {
        Ok(l) => l,
        Err(r) => return r,
    };
    for v in &ctx.args[2..] {
        list.push_front(v.clone());
    }
    let len = list.len();
    ctx.dirty += 1;
    Reply::Integer(len as i64)
}

pub fn rpush(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let list = match get_list(ctx.db, key) {
        Ok(l) => l,
        Err(r) => return r,
    };
    for v in &ctx.args[2..] {
        list.push_back(v.clone());
    }
    let len = list.len();
    ctx.dirty += 1;
    Reply::Integer(len as i64)
}

pub fn lpop(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match get_list_if_exist(ctx.db, key) {
        Ok(None) => Reply::NullBulk,
        Ok(Some(list)) => match list.pop_front() {
            Some(v) => {
                ctx.dirty += 1;
                Reply::Bulk(v)
            }
            None => Reply::NullBulk,
        },
        Err(r) => r,
    }
}

pub fn rpop(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match get_list_if_exist(ctx.db, key) {
        Ok(None) => Reply::NullBulk,
        Ok(Some(list)) => match list.pop_back() {
            Some(v) => {
                ctx.dirty += 1;
                Reply::Bulk(v)
            }
            None => Reply::NullBulk,
        },
        Err(r) => r,
    }
}

pub fn llen(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match get_list_if_exist(ctx.db, key) {
        Ok(None) => Reply::Integer(0),
        Ok(Some(list)) => Reply::Integer(list.len() as i64),
        Err(r) => r,
    }
}

/// Negative indices are not accepted here (only [`lrange`] normalizes
/// them), matching the source's `Quicklist.Get`.
pub fn lindex(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let index = match parse_i64(&ctx.args[2]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    match get_list_if_exist(ctx.db, key) {
        Ok(None) => Reply::NullBulk,
        Ok(Some(list)) => {
            if index < 0 {
                return Reply::NullBulk;
            }
            match list.get(index as usize) {
                Some(v) => Reply::Bulk(v.clone()),
                None => Reply::NullBulk,
            }
        }
        Err(r) => r,
    }
}

/// An empty result (start past stop, or start at/past the list's
/// length) replies `NullArray`, not an empty array — the source
/// returns a nil slice for this case and a nil slice renders as a
/// null multi-bulk.
pub fn lrange(ctx: &mut CommandContext) -> Reply {
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
    match get_list_if_exist(ctx.db, key) {
        Ok(None) => Reply::NullArray,
        Ok(Some(list)) => {
            let values = list.range(start, stop);
            if values.is_empty() {
                Reply::NullArray
            } else {
                Reply::bulk_array(values)
            }
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

    fn bulks(reply: Reply) -> Vec<Vec<u8>> {
        match reply {
            Reply::Array(items) => items
                .into_iter()
                .map(|r| match r {
                    Reply::Bulk(b) => b,
                    _ => panic!("expected bulk element"),
                })
                .collect(),
            _ => panic!("expected array reply"),
        }
    }

    #[test]
    fn rpush_then_lrange_preserves_order() {
        let mut db = Database::new(0);
        let mut authed = true;
        rpush(&mut ctx_for(&mut db, &[b"rpush".to_vec(), b"l".to_vec(), b"a".to_vec(), b"b".to_vec()], &mut authed));
        let reply = lrange(&mut ctx_for(&mut db, &[b"lrange".to_vec(), b"l".to_vec(), b"0".to_vec(), b"-1".to_vec()], &mut authed));
        assert_eq!(bulks(reply), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn lpush_reverses_relative_order_of_pushed_batch() {
        let mut db = Database::new(0);
        let mut authed = true;
        lpush(&mut ctx_for(&mut db, &[b"lpush".to_vec(), b"l".to_vec(), b"a".to_vec(), b"b".to_vec()], &mut authed));
        let reply = lrange(&mut ctx_for(&mut db, &[b"lrange".to_vec(), b"l".to_vec(), b"0".to_vec(), b"-1".to_vec()], &mut authed));
        assert_eq!(bulks(reply), vec![b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn lpop_on_missing_key_is_null_bulk() {
        let mut db = Database::new(0);
        let mut authed = true;
        let reply = lpop(&mut ctx_for(&mut db, &[b"lpop".to_vec(), b"missing".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::NullBulk));
    }

    #[test]
    fn llen_on_missing_key_is_zero() {
        let mut db = Database::new(0);
        let mut authed = true;
        let reply = llen(&mut ctx_for(&mut db, &[b"llen".to_vec(), b"missing".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::Integer(0)));
    }

    #[test]
    fn lindex_rejects_negative_index_outright() {
        let mut db = Database::new(0);
        let mut authed = true;
        rpush(&mut ctx_for(&mut db, &[b"rpush".to_vec(), b"l".to_vec(), b"a".to_vec()], &mut authed));
        let reply = lindex(&mut ctx_for(&mut db, &[b"lindex".to_vec(), b"l".to_vec(), b"-1".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::NullBulk));
    }

    #[test]
    fn lrange_with_start_past_stop_is_null_array_not_empty_array() {
        let mut db = Database::new(0);
        let mut authed = true;
        rpush(&mut ctx_for(&mut db, &[b"rpush".to_vec(), b"l".to_vec(), b"a".to_vec()], &mut authed));
        let reply = lrange(&mut ctx_for(&mut db, &[b"lrange".to_vec(), b"l".to_vec(), b"5".to_vec(), b"1".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::NullArray));
    }
}
