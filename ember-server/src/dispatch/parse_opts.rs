use super::parse_numbers::parse_i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SetCondition {
    Always,
    IfMissing,
    IfExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SetOptions {
    pub(super) condition: SetCondition,
    /// Relative TTL in nanoseconds; zero means no expiry.
    pub(super) ttl_nanos: i64,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            condition: SetCondition::Always,
            ttl_nanos: 0,
        }
    }
}

/// Parses the trailing `SET` options: `EX <sec>`, `PX <ms>`, `NX`, `XX`.
pub(super) fn parse_set_options(args: &[Vec<u8>]) -> Result<SetOptions, String> {
    let mut options = SetOptions::default();
    let mut index = 0_usize;

    while let Some(arg) = args.get(index) {
        if arg.eq_ignore_ascii_case(b"NX") {
            if options.condition == SetCondition::IfExists {
                return Err("syntax error".to_owned());
            }
            options.condition = SetCondition::IfMissing;
            index += 1;
            continue;
        }
        if arg.eq_ignore_ascii_case(b"XX") {
            if options.condition == SetCondition::IfMissing {
                return Err("syntax error".to_owned());
            }
            options.condition = SetCondition::IfExists;
            index += 1;
            continue;
        }
        if arg.eq_ignore_ascii_case(b"EX") || arg.eq_ignore_ascii_case(b"PX") {
            if options.ttl_nanos != 0 {
                return Err("syntax error".to_owned());
            }
            let Some(raw_expire) = args.get(index + 1) else {
                return Err("syntax error".to_owned());
            };
            let Ok(expire) = parse_i64(raw_expire) else {
                return Err("value is not an integer or out of range".to_owned());
            };
            if expire <= 0 {
                return Err("invalid expire time in 'SET' command".to_owned());
            }

            let scale = if arg.eq_ignore_ascii_case(b"EX") {
                1_000_000_000
            } else {
                1_000_000
            };
            options.ttl_nanos = expire.saturating_mul(scale);
            index += 2;
            continue;
        }

        return Err("syntax error".to_owned());
    }

    Ok(options)
}
