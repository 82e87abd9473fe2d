//! Request-side wire parsing.
//!
//! Two framings are accepted on the same connection, distinguished by peeking the first byte:
//! multibulk (`*N\r\n$len\r\n…`) from real clients, and whitespace-split inline lines for
//! telnet-style use. Parse failures surface as `InvalidData` errors and drop the connection.

use std::io::{self, BufRead, Read};

/// Upper bound for one bulk argument, matching the usual proto-max-bulk-len.
const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Reads one command as a token list. `Ok(None)` is a clean end-of-stream before any byte of a
/// request; an empty list is a blank line (the caller skips it).
///
/// # Errors
///
/// `InvalidData` for malformed framing, plus any transport error (including read timeouts).
pub fn read_command<R: BufRead>(reader: &mut R) -> io::Result<Option<Vec<Vec<u8>>>> {
    let first = {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(None);
        }
        available[0]
    };

    if first == b'*' {
        read_multibulk(reader).map(Some)
    } else {
        read_inline(reader).map(Some)
    }
}

fn protocol_error(context: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("protocol error: {context}"))
}

fn read_multibulk<R: BufRead>(reader: &mut R) -> io::Result<Vec<Vec<u8>>> {
    let header = read_line(reader)?;
    if header.first() != Some(&b'*') {
        return Err(protocol_error("expected multibulk header"));
    }
    let count = parse_ascii_usize(&header[1..])
        .ok_or_else(|| protocol_error("invalid multibulk length"))?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut args = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let bulk_header = read_line(reader)?;
        if bulk_header.first() != Some(&b'$') {
            return Err(protocol_error("expected bulk length"));
        }
        let size = parse_ascii_usize(&bulk_header[1..])
            .filter(|&size| size <= MAX_BULK_SIZE)
            .ok_or_else(|| protocol_error("invalid bulk length"))?;

        let mut payload = vec![0_u8; size + 2];
        reader.read_exact(&mut payload)?;
        payload.truncate(size);
        args.push(payload);
    }
    Ok(args)
}

fn read_inline<R: BufRead>(reader: &mut R) -> io::Result<Vec<Vec<u8>>> {
    let line = read_line(reader)?;
    Ok(line
        .split(|&byte| byte == b' ')
        .filter(|token| !token.is_empty())
        .map(<[u8]>::to_vec)
        .collect())
}

/// Reads up to `\n`, stripping the `\r\n` or `\n` terminator.
fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut line = Vec::new();
    let read = reader.read_until(b'\n', &mut line)?;
    if read == 0 || line.last() != Some(&b'\n') {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(line)
}

fn parse_ascii_usize(digits: &[u8]) -> Option<usize> {
    std::str::from_utf8(digits).ok()?.parse::<usize>().ok()
}

#[cfg(test)]
mod tests {
    use super::read_command;
    use googletest::prelude::*;
    use rstest::rstest;
    use std::io::BufReader;

    fn parse(input: &[u8]) -> Option<Vec<Vec<u8>>> {
        read_command(&mut BufReader::new(input)).expect("parse")
    }

    #[rstest]
    fn multibulk_command_parses_binary_safe_arguments() {
        let args = parse(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\nv\r\n \r\r\n").expect("args");
        assert_that!(
            args,
            eq(&vec![b"SET".to_vec(), b"k".to_vec(), b"v\r\n \r".to_vec()])
        );
    }

    #[rstest]
    fn inline_command_splits_on_whitespace() {
        let args = parse(b"SET  key   value\r\n").expect("args");
        assert_that!(
            args,
            eq(&vec![b"SET".to_vec(), b"key".to_vec(), b"value".to_vec()])
        );
    }

    #[rstest]
    fn inline_accepts_bare_newline_termination() {
        let args = parse(b"PING\n").expect("args");
        assert_that!(args, eq(&vec![b"PING".to_vec()]));
    }

    #[rstest]
    fn empty_stream_is_clean_eof() {
        assert_that!(parse(b""), eq(&None));
    }

    #[rstest]
    fn blank_line_yields_empty_token_list() {
        assert_that!(parse(b"\r\n"), eq(&Some(Vec::new())));
    }

    #[rstest]
    #[case(b"*not-a-number\r\n$3\r\nGET\r\n".as_slice())]
    #[case(b"*1\r\n#3\r\nGET\r\n".as_slice())]
    #[case(b"*1\r\n$-5\r\nGET\r\n".as_slice())]
    #[case(b"*2\r\n$3\r\nGET\r\n".as_slice())]
    fn malformed_framing_is_a_protocol_error(#[case] input: &[u8]) {
        let result = read_command(&mut BufReader::new(input));
        assert_that!(result.is_err(), eq(true));
    }

    #[rstest]
    fn pipelined_commands_parse_sequentially() {
        let mut reader = BufReader::new(b"PING\r\n*1\r\n$4\r\nPING\r\n".as_slice());
        let first = read_command(&mut reader).expect("parse").expect("args");
        let second = read_command(&mut reader).expect("parse").expect("args");
        assert_that!(first, eq(&vec![b"PING".to_vec()]));
        assert_that!(second, eq(&vec![b"PING".to_vec()]));
        assert_that!(read_command(&mut reader).expect("parse"), eq(&None));
    }
}
