//! Canonical command reply representation.
//!
//! The reply enum is kept protocol-neutral; encoding to RESP happens at the connection
//! boundary so handler logic stays independent from wire format.

/// One reply in any of the five RESP primitive shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    /// `+OK` style replies.
    SimpleString(String),
    /// `$<len> ...` style binary-safe payload.
    BulkString(Vec<u8>),
    /// RESP null bulk string (`$-1`).
    Null,
    /// RESP integer reply (`:<n>`).
    Integer(i64),
    /// RESP array reply (`*<n> ...`).
    Array(Vec<CommandReply>),
    /// `-ERR ...` style error.
    Error(String),
}

impl CommandReply {
    /// Encodes the reply into RESP bytes.
    #[must_use]
    pub fn to_resp_bytes(&self) -> Vec<u8> {
        match self {
            Self::SimpleString(value) => {
                let mut output = Vec::with_capacity(value.len() + 3);
                output.push(b'+');
                output.extend_from_slice(value.as_bytes());
                output.extend_from_slice(b"\r\n");
                output
            }
            Self::BulkString(value) => {
                let mut output = Vec::with_capacity(value.len() + 16);
                output.extend_from_slice(format!("${}\r\n", value.len()).as_bytes());
                output.extend_from_slice(value);
                output.extend_from_slice(b"\r\n");
                output
            }
            Self::Null => b"$-1\r\n".to_vec(),
            Self::Integer(value) => format!(":{value}\r\n").into_bytes(),
            Self::Array(items) => {
                let mut output = format!("*{}\r\n", items.len()).into_bytes();
                for item in items {
                    output.extend_from_slice(&item.to_resp_bytes());
                }
                output
            }
            Self::Error(message) => {
                let mut output = Vec::with_capacity(message.len() + 7);
                output.extend_from_slice(b"-ERR ");
                output.extend_from_slice(message.as_bytes());
                output.extend_from_slice(b"\r\n");
                output
            }
        }
    }
}
