//! Set commands. Each command inlines its own "missing key" handling
//! (see `commandset.go`), and the multi-key commands (`SDIFF`/`SINTER`/
//! `SUNION`) diverge further in how a missing *non-base* key behaves.

use emberkv_core::Error;
use emberkv_datastruct::Set;
use emberkv_proto::Reply;
use emberkv_storage::{Database, Value};

use super::util::{arg_str, error_reply};
use crate::dispatch::CommandContext;

fn get_set<'a>(db: &'a mut Database, key: &str) -> Result<&'a mut Set, Reply> {
    if !db.contains(key) {
        db.set(key.to_string(), Value::Set(Set::new()));
    }
    match db.get_mut(key) {
        Some(Value::Set(s)) => Ok(s),
        Some(_) => Err(error_reply(Error::WrongType)),
        None => unreachable!("just inserted"),
    }
}

fn get_set_if_exist<'a>(db: &'a mut Database, key: &str) -> Result<Option<&'a mut Set>, Reply> {
    match db.get_mut(key) {
        None => Ok(None),
        Some(Value::Set(s)) => Ok(Some(s)),
        Some(_) => Err(error_reply(Error::WrongType)),
    }
}

/// Owned clone of a set's members, for the multi-key commands that
/// need two sets borrowed from the same database at once.
fn set_members_if_exist(db: &mut Database, key: &str) -> Result<Option<Vec<String>>, Reply> {
    get_set_if_exist(db, key).map(|opt| opt.map(|s| s.members()))
}

/// `dirty` increments once per genuinely new member, not once per
/// argument processed — a deliberate correction of the source's
/// `client.srv.dirty++` inside the loop body (see DESIGN.md).
pub fn sadd(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let set = match get_set(ctx.db, key) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let mut created = 0i64;
    for member in &ctx.args[2..] {
        let member = match arg_str(member) {
            Ok(s) => s.to_string(),
            Err(r) => return r,
        };
        if set.add(member) {
            created += 1;
        }
    }
    if created > 0 {
        ctx.dirty += created;
    }
    Reply::Integer(created)
}

pub fn srem(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match get_set_if_exist(ctx.db, key) {
        Ok(None) => Reply::Integer(0),
        Ok(Some(set)) => {
            let mut deleted = 0i64;
            for member in &ctx.args[2..] {
                let member = match arg_str(member) {
                    Ok(s) => s,
                    Err(r) => return r,
                };
                if set.remove(member) {
                    deleted += 1;
                }
            }
            if deleted > 0 {
                ctx.dirty += deleted;
            }
            Reply::Integer(deleted)
        }
        Err(r) => r,
    }
}

pub fn spop(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match get_set_if_exist(ctx.db, key) {
        Ok(None) => Reply::NullBulk,
        Ok(Some(set)) => match set.random_member() {
            None => Reply::NullBulk,
            Some(member) => {
                set.remove(&member);
                ctx.dirty += 1;
                Reply::Bulk(member.into_bytes())
            }
        },
        Err(r) => r,
    }
}

pub fn scard(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match get_set_if_exist(ctx.db, key) {
        Ok(None) => Reply::Integer(0),
        Ok(Some(set)) => Reply::Integer(set.len() as i64),
        Err(r) => r,
    }
}

pub fn sismember(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    let member = match arg_str(&ctx.args[2]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match get_set_if_exist(ctx.db, key) {
        Ok(None) => Reply::Integer(0),
        Ok(Some(set)) => Reply::Integer(set.contains(member) as i64),
        Err(r) => r,
    }
}

pub fn smembers(ctx: &mut CommandContext) -> Reply {
    let key = match arg_str(&ctx.args[1]) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match get_set_if_exist(ctx.db, key) {
        Ok(None) => Reply::bulk_array(Vec::new()),
        Ok(Some(set)) => Reply::bulk_array(set.members().into_iter().map(|m| m.into_bytes()).collect()),
        Err(r) => r,
    }
}

/// A missing key other than the first is skipped (treated as empty),
/// matching `errors.Is(err, errNotExist) { continue }` in the source.
pub fn sdiff(ctx: &mut CommandContext) -> Reply {
    let base_key = match arg_str(&ctx.args[1]) {
        Ok(s) => s.to_string(),
        Err(r) => return r,
    };
    let mut acc = match set_members_if_exist(ctx.db, &base_key) {
        Ok(None) => return Reply::bulk_array(Vec::new()),
        Ok(Some(members)) => members,
        Err(r) => return r,
    };
    for other_key in &ctx.args[2..] {
        let other_key = match arg_str(other_key) {
            Ok(s) => s.to_string(),
            Err(r) => return r,
        };
        match set_members_if_exist(ctx.db, &other_key) {
            Ok(None) => continue,
            Ok(Some(other_members)) => {
                let other: std::collections::HashSet<String> = other_members.into_iter().collect();
                acc.retain(|m| !other.contains(m));
            }
            Err(r) => return r,
        }
    }
    Reply::bulk_array(acc.into_iter().map(|m| m.into_bytes()).collect())
}

/// Short-circuits to empty on a missing non-base key, matching
/// `errors.Is(err, errNotExist) { return addReplyEmpty() }`.
pub fn sinter(ctx: &mut CommandContext) -> Reply {
    let base_key = match arg_str(&ctx.args[1]) {
        Ok(s) => s.to_string(),
        Err(r) => return r,
    };
    let mut acc = match set_members_if_exist(ctx.db, &base_key) {
        Ok(None) => return Reply::bulk_array(Vec::new()),
        Ok(Some(members)) => members,
        Err(r) => return r,
    };
    for other_key in &ctx.args[2..] {
        let other_key = match arg_str(other_key) {
            Ok(s) => s.to_string(),
            Err(r) => return r,
        };
        match set_members_if_exist(ctx.db, &other_key) {
            Ok(None) => return Reply::bulk_array(Vec::new()),
            Ok(Some(other_members)) => {
                let other: std::collections::HashSet<String> = other_members.into_iter().collect();
                acc.retain(|m| other.contains(m));
            }
            Err(r) => return r,
        }
    }
    Reply::bulk_array(acc.into_iter().map(|m| m.into_bytes()).collect())
}

/// A missing key other than the first is skipped, matching
/// `errors.Is(err, errNotExist) { continue }` in the source.
pub fn sunion(ctx: &mut CommandContext) -> Reply {
    let base_key = match arg_str(&ctx.args[1]) {
        Ok(s) => s.to_string(),
        Err(r) => return r,
    };
    let mut acc: std::collections::HashSet<String> = match set_members_if_exist(ctx.db, &base_key) {
        Ok(None) => std::collections::HashSet::new(),
        Ok(Some(members)) => members.into_iter().collect(),
        Err(r) => return r,
    };
    for other_key in &ctx.args[2..] {
        let other_key = match arg_str(other_key) {
            Ok(s) => s.to_string(),
            Err(r) => return r,
        };
        match set_members_if_exist(ctx.db, &other_key) {
            Ok(None) => continue,
            Ok(Some(other_members)) => acc.extend(other_members),
            Err(r) => return r,
        }
    }
    Reply::bulk_array(acc.into_iter().map(|m| m.into_bytes()).collect())
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
    fn sadd_dirty_counts_only_genuinely_new_members() {
        let mut db = Database::new(0);
        let mut authed = true;
        let mut ctx = ctx_for(&mut db, &[b"sadd".to_vec(), b"s".to_vec(), b"a".to_vec(), b"a".to_vec(), b"b".to_vec()], &mut authed);
        let reply = sadd(&mut ctx);
        assert!(matches!(reply, Reply::Integer(2)));
        assert_eq!(ctx.dirty, 2);
    }

    #[test]
    fn srem_on_missing_key_is_zero() {
        let mut db = Database::new(0);
        let mut authed = true;
        let reply = srem(&mut ctx_for(&mut db, &[b"srem".to_vec(), b"missing".to_vec(), b"a".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::Integer(0)));
    }

    #[test]
    fn spop_on_missing_key_is_null_bulk() {
        let mut db = Database::new(0);
        let mut authed = true;
        let reply = spop(&mut ctx_for(&mut db, &[b"spop".to_vec(), b"missing".to_vec()], &mut authed));
        assert!(matches!(reply, Reply::NullBulk));
    }

    #[test]
    fn sdiff_skips_missing_non_base_key() {
        let mut db = Database::new(0);
        let mut authed = true;
        sadd(&mut ctx_for(&mut db, &[b"sadd".to_vec(), b"a".to_vec(), b"x".to_vec(), b"y".to_vec()], &mut authed));
        let reply = sdiff(&mut ctx_for(&mut db, &[b"sdiff".to_vec(), b"a".to_vec(), b"missing".to_vec()], &mut authed));
        let Reply::Array(items) = reply else { panic!("expected array") };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn sinter_short_circuits_to_empty_on_missing_non_base_key() {
        let mut db = Database::new(0);
        let mut authed = true;
        sadd(&mut ctx_for(&mut db, &[b"sadd".to_vec(), b"a".to_vec(), b"x".to_vec()], &mut authed));
        let reply = sinter(&mut ctx_for(&mut db, &[b"sinter".to_vec(), b"a".to_vec(), b"missing".to_vec()], &mut authed));
        let Reply::Array(items) = reply else { panic!("expected array") };
        assert!(items.is_empty());
    }

    #[test]
    fn sunion_skips_missing_non_base_key() {
        let mut db = Database::new(0);
        let mut authed = true;
        sadd(&mut ctx_for(&mut db, &[b"sadd".to_vec(), b"a".to_vec(), b"x".to_vec()], &mut authed));
        let reply = sunion(&mut ctx_for(&mut db, &[b"sunion".to_vec(), b"a".to_vec(), b"missing".to_vec()], &mut authed));
        let Reply::Array(items) = reply else { panic!("expected array") };
        assert_eq!(items.len(), 1);
    }
}
