use ember_common::error::EmberError;

use super::parse_numbers::parse_i64;
use super::parse_opts::{parse_set_options, SetCondition};
use super::{CommandFrame, ServerContext};
use crate::reply::CommandReply;

pub(super) fn handle_set(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    let key = &frame.args[0];
    let value = frame.args[1].clone();
    let options = match parse_set_options(&frame.args[2..]) {
        Ok(options) => options,
        Err(error) => return CommandReply::Error(error),
    };

    match options.condition {
        SetCondition::IfExists if !ctx.cache.exists(key) => return CommandReply::Null,
        SetCondition::IfMissing => {
            if ctx.cache.set(key, value, options.ttl_nanos, true) == Err(EmberError::KeyExists) {
                return CommandReply::Null;
            }
            return CommandReply::SimpleString("OK".to_owned());
        }
        _ => {}
    }

    let _ = ctx.cache.set(key, value, options.ttl_nanos, false);
    CommandReply::SimpleString("OK".to_owned())
}

pub(super) fn handle_get(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    match ctx.cache.get(&frame.args[0]) {
        Some(value) => CommandReply::BulkString(value),
        None => CommandReply::Null,
    }
}

pub(super) fn handle_setnx(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    match ctx.cache.set(&frame.args[0], frame.args[1].clone(), 0, true) {
        Ok(()) => CommandReply::Integer(1),
        Err(_) => CommandReply::Integer(0),
    }
}

pub(super) fn handle_setex(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    let Ok(seconds) = parse_i64(&frame.args[1]) else {
        return CommandReply::Error("invalid expire time in 'SETEX' command".to_owned());
    };
    if seconds <= 0 {
        return CommandReply::Error("invalid expire time in 'SETEX' command".to_owned());
    }
    let ttl_nanos = seconds.saturating_mul(1_000_000_000);
    let _ = ctx
        .cache
        .set(&frame.args[0], frame.args[2].clone(), ttl_nanos, false);
    CommandReply::SimpleString("OK".to_owned())
}

pub(super) fn handle_mget(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    let values = ctx.cache.mget(&frame.args);
    CommandReply::Array(
        values
            .into_iter()
            .map(|value| value.map_or(CommandReply::Null, CommandReply::BulkString))
            .collect(),
    )
}

pub(super) fn handle_mset(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    if frame.args.is_empty() || frame.args.len() % 2 != 0 {
        return CommandReply::Error("wrong number of arguments for 'MSET' command".to_owned());
    }
    let pairs: Vec<(Vec<u8>, Vec<u8>)> = frame
        .args
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    ctx.cache.mset(&pairs);
    CommandReply::SimpleString("OK".to_owned())
}

pub(super) fn handle_append(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    let length = ctx.cache.append(&frame.args[0], &frame.args[1]);
    CommandReply::Integer(i64::try_from(length).unwrap_or(i64::MAX))
}

pub(super) fn handle_strlen(ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
    let length = ctx.cache.strlen(&frame.args[0]);
    CommandReply::Integer(i64::try_from(length).unwrap_or(i64::MAX))
}
