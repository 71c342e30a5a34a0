//! Hash commands. The source shares one "missing key" helper across
//! every hash read, so every one of these replies `Integer(0)` on a
//! missing key regardless of whether that's the most natural reply
//! for that particular command (see DESIGN.md).

use emberkv_core::Error;
use emberkv_datastruct::Dict;
use emberkv_proto::Reply;
use emberkv_storage::{Database, Value};

use super::util::{arg_str, error_reply};
use crate::dispatch::CommandContext;

/// Fetches the hash at `key`, creating an empty one if absent or
/// returning `WRONGTYPE` if it holds something else.
fn get_hash<'a>(db: &'a mut Database, key: &str) -> Result<&'a mut Dict<String, Vec<u8>>, Reply> {
    if !db.contains(key) {
        db.set(key.to_string(), Value::Hash(Dict::new()));
    }
    match db.get_mut(key) {
        Some(Value::Hash(h)) => Ok(h),
        Some(_) => Err(error_reply(Error::WrongType)),
        None => unreachable!("just inserted"),
    }
}

/// Fetches the hash at `key` without creating it. `Ok(None)` means
/// the key is absent; the caller decides the sentinel reply.
fn get_hash_if_exist<'a>(db: &'a mut Database, key: &str) -> Result<Option<&'a mut Dict<String, Vec<u8>>>, Reply> {
    match db.get_mut(key) {
        None => Ok(None),
        Some(Value::Hash(h)) => Ok(Some(h)),
        Some(_) => Err(error_reply(Error::WrongType)),
    }
}

/// Always replies `1`, even when overwriting an existing field — the
/// source never inspects `Dict::Set`'s return value here (see
/// DESIGN.md).
pub fn hset(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let field = match arg_str(&ctx.args[2]) {
        Ok(s) => s.to_string(),
        Err(r) => return r,
    };
    let hash = match get_hash(ctx.db, key) {
        Ok(h) => h,
        Err(r) => return r,
    };
    hash.set(field, ctx.args[3].clone());
    ctx.dirty += 1;
    Reply::Integer(1)
}

pub fn hget(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let field = match arg_str(&ctx.args[2]) {
        Ok(s) => s.to_string(),
        Err(r) => return r,
    };
    match get_hash_if_exist(ctx.db, key) {
        Ok(None) => Reply::Integer(0),
        Ok(Some(hash)) => match hash.get(&field) {
            Some(v) => Reply::Bulk(v.clone()),
            None => Reply::NullBulk,
        },
        Err(r) => r,
    }
}

/// Variadic: deletes every listed field, replying with the count that
/// actually existed.
pub fn hdel(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let fields: Vec<&str> = match ctx.args[2..].iter().map(|a| arg_str(a)).collect() {
        Ok(fields) => fields,
        Err(r) => return r,
    };
    match get_hash_if_exist(ctx.db, key) {
        Ok(None) => Reply::Integer(0),
        Ok(Some(hash)) => {
            let mut deleted = 0;
            for field in fields {
                if hash.delete(&field.to_string()).is_ok() {
                    deleted += 1;
                }
            }
            if deleted > 0 {
                ctx.dirty += 1;
            }
            Reply::Integer(deleted)
        }
        Err(r) => r,
    }
}

pub fn hexists(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let field = match arg_str(&ctx.args[2]) {
        Ok(s) => s.to_string(),
        Err(r) => return r,
    };
    match get_hash_if_exist(ctx.db, key) {
        Ok(None) => Reply::Integer(0),
        Ok(Some(hash)) => Reply::Integer(hash.contains_key(&field) as i64),
        Err(r) => r,
    }
}

pub fn hkeys(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match get_hash_if_exist(ctx.db, key) {
        Ok(None) => Reply::Integer(0),
        Ok(Some(hash)) => {
            let keys = hash.iter().map(|(k, _)| k.clone().into_bytes()).collect();
            Reply::bulk_array(keys)
        }
        Err(r) => r,
    }
}

pub fn hlen(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match get_hash_if_exist(ctx.db, key) {
        Ok(None) => Reply::Integer(0),
        Ok(Some(hash)) => Reply::Integer(hash.len() as i64),
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
    fn hset_then_hget_round_trips() {
        let mut db = Database::new(0);
        let mut authed = true;
        hset(&mut ctx_for(&mut db, &[b"hset".to_vec(), b"h".to_vec(), b"f".to_vec(), b"v".to_vec()], &mut authed));
        let reply = hget(&mut ctx_for(&mut db, &[b"hget".to_vec(), b"h".to_vec(), b"f".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::Bulk(b) if b == b"v"));
    }

    #[test]
    fn hget_on_missing_key_returns_integer_zero_not_null() {
        let mut db = Database::new(0);
        let mut authed = true;
        let reply = hget(&mut ctx_for(&mut db, &[b"hget".to_vec(), b"missing".to_vec(), b"f".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::Integer(0)));
    }

    #[test]
    fn hset_always_reports_one_even_on_overwrite() {
        let mut db = Database::new(0);
        let mut authed = true;
        let r1 = hset(&mut ctx_for(&mut db, &[b"hset".to_vec(), b"h".to_vec(), b"f".to_vec(), b"v".to_vec()], &mut authed));
        let r2 = hset(&mut ctx_for(&mut db, &[b"hset".to_vec(), b"h".to_vec(), b"f".to_vec(), b"v2".to_vec()], &mut authed));
        assert!(matches!(r1, Reply::Integer(1)));
        assert!(matches!(r2, Reply::Integer(1)));
    }

    #[test]
    fn hdel_removes_field_and_reports_count() {
        let mut db = Database::new(0);
        let mut authed = true;
        hset(&mut ctx_for(&mut db, &[b"hset".to_vec(), b"h".to_vec(), b"f".to_vec(), b"v".to_vec()], &mut authed));
        let reply = hdel(&mut ctx_for(&mut db, &[b"hdel".to_vec(), b"h".to_vec(), b"f".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::Integer(1)));
        let reply = hget(&mut ctx_for(&mut db, &[b"hget".to_vec(), b"h".to_vec(), b"f".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::NullBulk));
    }
}
