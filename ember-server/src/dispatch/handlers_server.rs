use tracing::{error, info};

use super::{CommandFrame, ServerContext};
use crate::reply::CommandReply;

pub(super) fn handle_ping(_ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    match frame.args.len() {
        0 => CommandReply::SimpleString("PONG".to_owned()),
        1 => CommandReply::BulkString(frame.args[0].clone()),
        _ => CommandReply::Error("wrong number of arguments for 'PING' command".to_owned()),
    }
}

pub(super) fn handle_echo(_ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    CommandReply::BulkString(frame.args[0].clone())
}

pub(super) fn handle_dbsize(ctx: &ServerContext, _frame: &CommandFrame) -> CommandReply {
    CommandReply::Integer(ctx.cache.count_keys())
}

pub(super) fn handle_flushdb(ctx: &ServerContext, _frame: &CommandFrame) -> CommandReply {
    ctx.cache.flush_db();
    CommandReply::SimpleString("OK".to_owned())
}

pub(super) fn handle_info(ctx: &ServerContext, _frame: &CommandFrame) -> CommandReply {
    let keys = ctx.cache.count_keys();
    let info = format!(
        "# Server\r\n\
         embercache_version:{}\r\n\
         resp_protocol:2\r\n\
         tcp_port:{}\r\n\
         # Clients\r\n\
         # Keyspace\r\n\
         db0:keys={keys},expires=0\r\n",
        env!("CARGO_PKG_VERSION"),
        ctx.port_label,
    );
    CommandReply::BulkString(info.into_bytes())
}

/// `SELECT`, `COMMAND`, and `CLIENT` are accepted for client compatibility and ignored; a
/// single logical database is assumed.
pub(super) fn handle_noop_ok(_ctx: &ServerContext, _frame: &CommandFrame) -> CommandReply {
    CommandReply::SimpleString("OK".to_owned())
}

pub(super) fn handle_config(_ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    if frame
        .args
        .first()
        .is_some_and(|sub| sub.eq_ignore_ascii_case(b"SET"))
    {
        return CommandReply::SimpleString("OK".to_owned());
    }
    // CONFIG GET answers with an empty table.
    CommandReply::Array(Vec::new())
}

pub(super) fn handle_bgrewriteaof(ctx: &ServerContext, _frame: &CommandFrame) -> CommandReply {
    let Some(journal) = ctx.journal.as_ref() else {
        return CommandReply::Error("journaling is disabled".to_owned());
    };

    let cache = &ctx.cache;
    match journal.rewrite(|emit| {
        cache.snapshot(|key, value, expire_at| emit(key, value, expire_at));
    }) {
        Ok(()) => {
            info!("journal rewrite finished");
            CommandReply::SimpleString("OK".to_owned())
        }
        Err(err) => {
            error!(%err, "journal rewrite failed");
            CommandReply::Error("journal rewrite failed".to_owned())
        }
    }
}
