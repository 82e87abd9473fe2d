use super::parse_numbers::parse_i64;
use super::{CommandFrame, ServerContext};
use crate::reply::CommandReply;

pub(super) fn handle_incr(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    mutate_counter_by(ctx, &frame.args[0], 1)
}

pub(super) fn handle_decr(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    mutate_counter_by(ctx, &frame.args[0], -1)
}

pub(super) fn handle_incrby(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    let Ok(delta) = parse_i64(&frame.args[1]) else {
        return CommandReply::Error("value is not an integer or out of range".to_owned());
    };
    mutate_counter_by(ctx, &frame.args[0], delta)
}

pub(super) fn handle_decrby(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    let Ok(amount) = parse_i64(&frame.args[1]) else {
        return CommandReply::Error("value is not an integer or out of range".to_owned());
    };
    let Some(delta) = amount.checked_neg() else {
        return CommandReply::Error("value is not an integer or out of range".to_owned());
    };
    mutate_counter_by(ctx, &frame.args[0], delta)
}

fn mutate_counter_by(ctx: &ServerContext, key: &[u8], delta: i64) -> CommandReply {
    match ctx.cache.incr_by(key, delta) {
        Ok(value) => CommandReply::Integer(value),
        // The storage error's display form is the exact wire message.
        Err(err) => CommandReply::Error(err.to_string()),
    }
}
