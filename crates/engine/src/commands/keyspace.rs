//! String-value and whole-keyspace commands: `SET`/`GET`/`SETEX`,
//! expiry, `KEYS`, and the ambient diagnostics (`DBSIZE`, `FLUSHDB`,
//! `TYPE`).

use emberkv_core::Error;
use emberkv_proto::Reply;
use emberkv_storage::{now_ms, Value};
use regex::Regex;

use super::util::{arg_str, error_reply, parse_i64};
use crate::dispatch::CommandContext;

pub fn set(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s.to_string(),
        Err(r) => return r,
    };
    ctx.db.set(key, Value::String(ctx.args[2].clone()));
    ctx.dirty += 1;
    Reply::ok()
}

/// `SETEX key seconds value`. Feeding this to the AOF translates it
/// into `SET` + `EXPIREAT` so replay is time-independent (§4.7).
pub fn setex(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s.to_string(),
        Err(r) => return r,
    };
    let seconds = match parse_i64(&ctx.args[2]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    ctx.db.set(key.clone(), Value::String(ctx.args[3].clone()));
    ctx.db.set_expire_at_ms(key, now_ms() + seconds * 1000);
    ctx.dirty += 1;
    Reply::ok()
}

pub fn get(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match ctx.db.get(key) {
        None => Reply::NullBulk,
        Some(Value::String(s)) => Reply::Bulk(s.clone()),
        Some(_) => error_reply(Error::WrongType),
    }
}

/// Returns a random live key's name (not its value), skipping expired
/// entries as `Database::random_key` already does.
pub fn randomget(ctx: &mut CommandContext) -> Reply {
    match ctx.db.random_key() {
        Some(k) => Reply::Bulk(k.into_bytes()),
        None => Reply::NullBulk,
    }
}

/// `*` matches every key without compiling a pattern; anything else is
/// compiled as a regular expression, matching the source's actual
/// `KEYS` behaviour rather than Redis's glob syntax (an explicit
/// "preserve the source" decision — see DESIGN.md).
pub fn keys(ctx: &mut CommandContext) -> Reply {
    let pattern = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let live = ctx.db.keys();
    if pattern == "*" {
        return Reply::bulk_array(live.into_iter().map(|k| k.into_bytes()).collect());
    }
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => return error_reply(Error::InvalidPattern(e.to_string())),
    };
    let matched = live.into_iter().filter(|k| re.is_match(k)).map(|k| k.into_bytes()).collect();
    Reply::bulk_array(matched)
}

pub fn expire(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s.to_string(),
        Err(r) => return r,
    };
    let seconds = match parse_i64(&ctx.args[2]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    if !ctx.db.contains(&key) {
        return Reply::Integer(0);
    }
    ctx.db.set_expire_at_ms(key, now_ms() + seconds * 1000);
    ctx.dirty += 1;
    Reply::Integer(1)
}

pub fn expireat(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s.to_string(),
        Err(r) => return r,
    };
    let epoch_sec = match parse_i64(&ctx.args[2]) {
        Ok(n) => n,
        Err(r) => return r,
    };
    if !ctx.db.contains(&key) {
        return Reply::Integer(0);
    }
    ctx.db.set_expire_at_ms(key, epoch_sec * 1000);
    ctx.dirty += 1;
    Reply::Integer(1)
}

pub fn ttl(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    Reply::Integer(ctx.db.ttl_seconds(key))
}

pub fn dbsize(ctx: &mut CommandContext) -> Reply {
    Reply::Integer(ctx.db.len() as i64)
}

pub fn flushdb(ctx: &mut CommandContext) -> Reply {
    ctx.db.flush();
    ctx.dirty += 1;
    Reply::ok()
}

pub fn type_cmd(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match ctx.db.get(key) {
        None => Reply::Simple("none".to_string()),
        Some(v) => Reply::Simple(v.kind().as_str().to_string()),
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
    fn set_then_get_round_trips() {
        let mut db = Database::new(0);
        let mut authed = true;
        set(&mut ctx_for(&mut db, &[b"set".to_vec(), b"k".to_vec(), b"v".to_vec()], &mut authed));
        let reply = get(&mut ctx_for(&mut db, &[b"get".to_vec(), b"k".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::Bulk(b) if b == b"v"));
    }

    #[test]
    fn get_on_wrong_type_reports_wrongtype() {
        let mut db = Database::new(0);
        let mut authed = true;
        db.set("k".into(), Value::Hash(emberkv_datastruct::Dict::new()));
        let reply = get(&mut ctx_for(&mut db, &[b"get".to_vec(), b"k".to_vec()], &mut authed));
        match reply {
            Reply::Error(msg) => assert!(msg.contains("WRONGTYPE")),
            _ => panic!("expected an error reply"),
        }
    }

    #[test]
    fn expire_on_missing_key_returns_zero_without_creating() {
        let mut db = Database::new(0);
        let mut authed = true;
        let reply = expire(&mut ctx_for(&mut db, &[b"expire".to_vec(), b"missing".to_vec(), b"10".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::Integer(0)));
        assert!(!db.contains("missing"));
    }

    #[test]
    fn setex_sets_value_and_ttl() {
        let mut db = Database::new(0);
        let mut authed = true;
        setex(&mut ctx_for(&mut db, &[b"setex".to_vec(), b"k".to_vec(), b"100".to_vec(), b"v".to_vec()], &mut authed));
        let ttl = db.ttl_seconds("k");
        assert!((95..=100).contains(&ttl), "ttl was {ttl}");
    }

    #[test]
    fn keys_star_lists_everything_non_star_uses_regex() {
        let mut db = Database::new(0);
        let mut authed = true;
        db.set("foo".into(), Value::String(b"1".to_vec()));
        db.set("bar".into(), Value::String(b"2".to_vec()));

        let reply = keys(&mut ctx_for(&mut db, &[b"keys".to_vec(), b"*".to_vec()], &mut authed));
        let Reply::Array(items) = reply else { panic!("expected array") };
        assert_eq!(items.len(), 2);

        let reply = keys(&mut ctx_for(&mut db, &[b"keys".to_vec(), b"^f".to_vec()], &mut authed));
        let Reply::Array(items) = reply else { panic!("expected array") };
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Reply::Bulk(b) if b == b"foo"));
    }

    #[test]
    fn type_reports_none_for_missing_key() {
        let mut db = Database::new(0);
        let mut authed = true;
        let reply = type_cmd(&mut ctx_for(&mut db, &[b"type".to_vec(), b"missing".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::Simple(s) if s == "none"));
    }
}
