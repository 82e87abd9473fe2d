use std::str;

pub(super) fn parse_i64(payload: &[u8]) -> Result<i64, ()> {
    let Ok(text) = str::from_utf8(payload) else {
        return Err(());
    };
    text.parse::<i64>().map_err(|_| ())
}
