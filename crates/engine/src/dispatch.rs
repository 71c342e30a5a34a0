//! The command table and the central dispatcher: lookup, arity check,
//! auth gate, handler invocation.

use emberkv_core::Error;
use emberkv_proto::Reply;
use emberkv_storage::Database;

use crate::commands::{admin, connection, hash, keyspace, list, set, util::error_reply, zset};

/// Everything a command handler needs, threaded through as a single
/// borrow so handlers never reach past their own arguments into
/// client or server internals they have no business touching.
pub struct CommandContext<'a> {
    pub db: &'a mut Database,
    pub args: &'a [Vec<u8>],
    /// Mutated in place by `auth`; read by the dispatcher's pre-check.
    pub authenticated: &'a mut bool,
    pub requirepass: Option<&'a str>,
    pub dbs_len: usize,
    /// Out-signal: set by `select` to request a db switch the caller
    /// applies to the client after the handler returns.
    pub select_db: Option<usize>,
    /// Net change in keyspace state this command made; accumulated by
    /// the caller across an AOF-feed decision.
    pub dirty: i64,
    /// In-signal: whether a background AOF rewrite is currently running,
    /// so mutating commands know whether to also land in the rewrite buffer.
    pub rewrite_in_progress: bool,
    /// Out-signal: set by `bgrewriteaof` to ask the caller to start one.
    pub request_rewrite: bool,
}

pub type Handler = fn(&mut CommandContext) -> Reply;

pub struct Command {
    pub name: &'static str,
    pub handler: Handler,
    /// Positive = exact argument count (including the command name
    /// itself); negative = minimum of its absolute value.
    pub arity: i32,
}

macro_rules! cmd {
    ($name:expr, $handler:path, $arity:expr) => {
        Command { name: $name, handler: $handler, arity: $arity }
    };
}

pub static COMMAND_TABLE: &[Command] = &[
    cmd!("ping", connection::ping, 1),
    cmd!("select", connection::select, 2),
    cmd!("auth", connection::auth, 2),
    cmd!("set", keyspace::set, 3),
    cmd!("setex", keyspace::setex, 4),
    cmd!("get", keyspace::get, 2),
    cmd!("randomget", keyspace::randomget, 1),
    cmd!("keys", keyspace::keys, 2),
    cmd!("expire", keyspace::expire, 3),
    cmd!("expireat", keyspace::expireat, 3),
    cmd!("ttl", keyspace::ttl, 2),
    cmd!("dbsize", keyspace::dbsize, 1),
    cmd!("flushdb", keyspace::flushdb, 1),
    cmd!("type", keyspace::type_cmd, 2),
    cmd!("hset", hash::hset, 4),
    cmd!("hget", hash::hget, 3),
    cmd!("hdel", hash::hdel, -3),
    cmd!("hexists", hash::hexists, 3),
    cmd!("hkeys", hash::hkeys, 2),
    cmd!("hlen", hash::hlen, 2),
    cmd!("lpush", list::lpush, -3),
    cmd!("rpush", list::rpush, -3),
    cmd!("lpop", list::lpop, 2),
    cmd!("rpop", list::rpop, 2),
    cmd!("llen", list::llen, 2),
    cmd!("lindex", list::lindex, 3),
    cmd!("lrange", list::lrange, 4),
    cmd!("sadd", set::sadd, -3),
    cmd!("srem", set::srem, -3),
    cmd!("spop", set::spop, 2),
    cmd!("scard", set::scard, 2),
    cmd!("sismember", set::sismember, 3),
    cmd!("smembers", set::smembers, 2),
    cmd!("sdiff", set::sdiff, -3),
    cmd!("sinter", set::sinter, -3),
    cmd!("sunion", set::sunion, -3),
    cmd!("zadd", zset::zadd, -4),
    cmd!("zrange", zset::zrange, 4),
    cmd!("zrangebyscore", zset::zrangebyscore, 4),
    cmd!("zrem", zset::zrem, -3),
    cmd!("zremrangebyrank", zset::zremrangebyrank, 4),
    cmd!("zremrangebyscore", zset::zremrangebyscore, 4),
    cmd!("zcard", zset::zcard, 2),
    cmd!("zcount", zset::zcount, 4),
    cmd!("zscore", zset::zscore, 3),
    cmd!("bgrewriteaof", admin::bgrewriteaof, 1),
];

pub fn lookup_command(name: &str) -> Option<&'static Command> {
    COMMAND_TABLE.iter().find(|cmd| cmd.name == name)
}

/// Runs the pre-execution checks in the order the command table's
/// contract demands (unknown → arity → auth) and, only if all pass,
/// invokes the handler.
pub fn dispatch(ctx: &mut CommandContext) -> Reply {
    let name = match std::str::from_utf8(&ctx.args[0]) {
        Ok(s) => s.to_ascii_lowercase(),
        Err(_) => return error_reply(Error::UnknownCommand("<invalid utf-8>".into())),
    };

    let cmd = match lookup_command(&name) {
        Some(cmd) => cmd,
        None => return error_reply(Error::UnknownCommand(name)),
    };

    let argc = ctx.args.len() as i32;
    let arity_ok = if cmd.arity >= 0 { argc == cmd.arity } else { argc >= -cmd.arity };
    if !arity_ok {
        return error_reply(Error::WrongArity(cmd.name.to_string()));
    }

    if ctx.requirepass.is_some() && !*ctx.authenticated && cmd.name != "auth" {
        return error_reply(Error::NoAuth);
    }

    (cmd.handler)(ctx)
}

#[cfg(test)]
mod tests {
    use emberkv_storage::Database;

    use super::*;

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
    fn unknown_command_is_reported_before_anything_else() {
        let mut db = Database::new(0);
        let args = vec![b"bogus".to_vec()];
        let mut authed = true;
        let reply = dispatch(&mut ctx_for(&mut db, &args, &mut authed));
        assert!(matches!(reply, Reply::Error(msg) if msg.contains("unknown command")));
    }

    #[test]
    fn arity_mismatch_is_reported_for_a_known_command() {
        let mut db = Database::new(0);
        let args = vec![b"get".to_vec()];
        let mut authed = true;
        let reply = dispatch(&mut ctx_for(&mut db, &args, &mut authed));
        assert!(matches!(reply, Reply::Error(msg) if msg.contains("wrong number of arguments")));
    }

    #[test]
    fn auth_required_blocks_everything_except_auth_itself() {
        let mut db = Database::new(0);
        let args = vec![b"get".to_vec(), b"k".to_vec()];
        let mut authed = false;
        let mut ctx = ctx_for(&mut db, &args, &mut authed);
        ctx.requirepass = Some("secret");
        let reply = dispatch(&mut ctx);
        assert!(matches!(reply, Reply::Error(msg) if msg.contains("NOAUTH")));
    }

    #[test]
    fn auth_command_itself_bypasses_the_auth_gate() {
        let mut db = Database::new(0);
        let args = vec![b"auth".to_vec(), b"secret".to_vec()];
        let mut authed = false;
        let mut ctx = ctx_for(&mut db, &args, &mut authed);
        ctx.requirepass = Some("secret");
        let reply = dispatch(&mut ctx);
        assert!(matches!(reply, Reply::Simple(_)));
    }

    #[test]
    fn ping_round_trips_through_full_dispatch() {
        let mut db = Database::new(0);
        let args = vec![b"PING".to_vec()];
        let mut authed = true;
        let reply = dispatch(&mut ctx_for(&mut db, &args, &mut authed));
        assert!(matches!(reply, Reply::Simple(s) if s == "PONG"));
    }
}
