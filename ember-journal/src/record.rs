//! Journal record framing: build, checksum, parse, and the checksum-less legacy fallback.

/// Computes the CRC-64 (ECMA polynomial, reflected) checksum of a record payload.
pub(crate) fn checksum(payload: &[u8]) -> u64 {
    let mut digest = crc64fast::Digest::new();
    digest.write(payload);
    digest.sum64()
}

/// Builds one framed record: `crc64_hex|cmd|key|expire|value\n`.
#[must_use]
pub(crate) fn build_record(cmd: &str, key: &[u8], value: &[u8], expire_at: i64) -> Vec<u8> {
    let expire_text = expire_at.to_string();
    let mut payload =
        Vec::with_capacity(cmd.len() + key.len() + expire_text.len() + value.len() + 3);
    payload.extend_from_slice(cmd.as_bytes());
    payload.push(b'|');
    payload.extend_from_slice(key);
    payload.push(b'|');
    payload.extend_from_slice(expire_text.as_bytes());
    payload.push(b'|');
    payload.extend_from_slice(value);

    let crc_hex = format!("{:x}", checksum(&payload));
    let mut record = Vec::with_capacity(crc_hex.len() + payload.len() + 2);
    record.extend_from_slice(crc_hex.as_bytes());
    record.push(b'|');
    record.extend_from_slice(&payload);
    record.push(b'\n');
    record
}

/// One decoded record, borrowing from the scanned line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ParsedRecord<'a> {
    pub(crate) cmd: &'a [u8],
    pub(crate) key: &'a [u8],
    pub(crate) value: &'a [u8],
    pub(crate) expire_at: i64,
}

/// Decodes one line (without its terminating `\n`). `None` marks the line corrupt.
///
/// A line whose leading field is not a hexadecimal checksum is retried as a legacy
/// checksum-less record (`cmd|key|expire|value` with a known command).
pub(crate) fn parse_line(line: &[u8]) -> Option<ParsedRecord<'_>> {
    let sep = line.iter().position(|&byte| byte == b'|')?;
    if sep < 1 {
        return None;
    }

    let crc_hex = &line[..sep];
    let payload = &line[sep + 1..];
    let stored = std::str::from_utf8(crc_hex)
        .ok()
        .and_then(|text| u64::from_str_radix(text, 16).ok());
    let Some(stored) = stored else {
        return parse_legacy(line);
    };

    if stored != checksum(payload) {
        return None;
    }
    split_payload(payload)
}

/// Splits `cmd|key|expire|value` into at most four fields.
fn split_payload(payload: &[u8]) -> Option<ParsedRecord<'_>> {
    let mut parts = payload.splitn(4, |&byte| byte == b'|');
    let cmd = parts.next()?;
    let key = parts.next()?;
    let expire = parts.next()?;
    let value = parts.next()?;

    let expire_at = std::str::from_utf8(expire)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())?;
    Some(ParsedRecord {
        cmd,
        key,
        value,
        expire_at,
    })
}

fn parse_legacy(line: &[u8]) -> Option<ParsedRecord<'_>> {
    let record = split_payload(line)?;
    matches!(record.cmd, b"SET" | b"DEL" | b"GET").then_some(record)
}
