use super::{CommandFrame, ServerContext};
use crate::reply::CommandReply;

pub(super) fn handle_exists(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    let count = frame
        .args
        .iter()
        .filter(|key| ctx.cache.exists(key))
        .count();
    CommandReply::Integer(i64::try_from(count).unwrap_or(i64::MAX))
}

pub(super) fn handle_del(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    let mut deleted = 0_i64;
    for key in &frame.args {
        if ctx.cache.exists(key) {
            ctx.cache.delete(key);
            deleted += 1;
        }
    }
    CommandReply::Integer(deleted)
}

pub(super) fn handle_type(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    CommandReply::SimpleString(ctx.cache.key_type(&frame.args[0]).to_owned())
}

pub(super) fn handle_rename(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    if ctx.cache.rename(&frame.args[0], &frame.args[1]) {
        CommandReply::SimpleString("OK".to_owned())
    } else {
        CommandReply::Error("no such key".to_owned())
    }
}

pub(super) fn handle_keys(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    let keys = ctx.cache.keys(&frame.args[0]);
    CommandReply::Array(keys.into_iter().map(CommandReply::BulkString).collect())
}
