//! Per-connection request loop: idle deadline, AUTH gate, parse, dispatch, reply.

use std::io::{BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::debug;

use ember_common::error::EmberError;

use crate::dispatch::{CommandFrame, CommandRegistry, ServerContext};
use crate::reply::CommandReply;
use crate::resp;

const IO_BUF_SIZE: usize = 64 * 1024;
/// Connections idle longer than this are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Serves one client until it quits, times out, or breaks the protocol.
pub(crate) fn handle_connection(
    stream: TcpStream,
    ctx: &ServerContext,
    registry: &CommandRegistry,
) {
    if let Err(err) = serve(stream, ctx, registry) {
        debug!(%err, "connection closed");
    }
}

fn serve(
    stream: TcpStream,
    ctx: &ServerContext,
    registry: &CommandRegistry,
) -> std::io::Result<()> {
    stream.set_read_timeout(Some(IDLE_TIMEOUT))?;
    let mut reader = BufReader::with_capacity(IO_BUF_SIZE, stream.try_clone()?);
    let mut writer = BufWriter::with_capacity(IO_BUF_SIZE, stream);

    // Without a configured password every connection starts authenticated.
    let mut authenticated = ctx.password.is_none();

    loop {
        let Some(args) = resp::read_command(&mut reader)? else {
            return Ok(());
        };
        if args.is_empty() {
            continue;
        }

        let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
        let args = args[1..].to_vec();

        // AUTH and QUIT are the only commands served before authentication.
        if name == "AUTH" {
            let reply = match (&ctx.password, args.first()) {
                (None, _) => {
                    CommandReply::Error("Client sent AUTH, but no password is set".to_owned())
                }
                (Some(_), _) if args.len() != 1 => {
                    CommandReply::Error("wrong number of arguments for 'AUTH' command".to_owned())
                }
                (Some(password), Some(attempt)) if attempt == password.as_bytes() => {
                    authenticated = true;
                    CommandReply::SimpleString("OK".to_owned())
                }
                (Some(_), _) => CommandReply::Error("WRONGPASS invalid password".to_owned()),
            };
            writer.write_all(&reply.to_resp_bytes())?;
            writer.flush()?;
            continue;
        }

        if name == "QUIT" {
            writer.write_all(&CommandReply::SimpleString("OK".to_owned()).to_resp_bytes())?;
            writer.flush()?;
            return Ok(());
        }

        if !authenticated {
            let reply = CommandReply::Error(EmberError::Unauthorized.to_string());
            writer.write_all(&reply.to_resp_bytes())?;
            writer.flush()?;
            continue;
        }

        let frame = CommandFrame { name, args };
        let reply = registry.dispatch(ctx, &frame);
        writer.write_all(&reply.to_resp_bytes())?;
        writer.flush()?;
    }
}
