use super::parse_numbers::parse_i64;
use super::{CommandFrame, ServerContext};
use crate::reply::CommandReply;

pub(super) fn handle_expire(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    set_relative_expiry(ctx, frame, 1_000_000_000)
}

pub(super) fn handle_pexpire(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    set_relative_expiry(ctx, frame, 1_000_000)
}

fn set_relative_expiry(ctx: &ServerContext, frame: &CommandFrame, scale: i64) -> CommandReply {
    let Ok(amount) = parse_i64(&frame.args[1]) else {
        return CommandReply::Error("value is not an integer or out of range".to_owned());
    };
    let updated = ctx.cache.expire(&frame.args[0], amount.saturating_mul(scale));
    CommandReply::Integer(i64::from(updated))
}

pub(super) fn handle_ttl(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    CommandReply::Integer(ctx.cache.ttl_secs(&frame.args[0]))
}

pub(super) fn handle_pttl(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    CommandReply::Integer(ctx.cache.ttl_millis(&frame.args[0]))
}

pub(super) fn handle_persist(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    CommandReply::Integer(i64::from(ctx.cache.persist(&frame.args[0])))
}
