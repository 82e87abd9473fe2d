//! TCP front end: listener, accept loop, one thread per connection.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{error, info};

use ember_common::error::{EmberError, EmberResult};

use crate::connection::handle_connection;
use crate::dispatch::{CommandRegistry, ServerContext};

/// RESP-compatible TCP server over one shared [`ServerContext`].
pub struct Server {
    ctx: Arc<ServerContext>,
    registry: Arc<CommandRegistry>,
    listener: TcpListener,
    stop: Arc<AtomicBool>,
}

/// Clonable handle that can stop a running server from another thread.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    stop: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ServerHandle {
    /// Signals the accept loop to exit. Existing connections run to completion.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        // Nudge the blocking accept so it observes the flag.
        let _ = TcpStream::connect(self.addr);
    }
}

impl Server {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns [`EmberError::Io`] when the address cannot be bound.
    pub fn bind(addr: &str, ctx: ServerContext) -> EmberResult<Self> {
        let listener = TcpListener::bind(addr)
            .map_err(|err| EmberError::Io(format!("bind {addr}: {err}")))?;
        if ctx.password.is_some() {
            info!(%addr, "listening (RESP, AUTH enabled)");
        } else {
            info!(%addr, "listening (RESP)");
        }
        Ok(Self {
            ctx: Arc::new(ctx),
            registry: Arc::new(CommandRegistry::with_builtin_commands()),
            listener,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Bound socket address (useful with port 0).
    ///
    /// # Errors
    ///
    /// Propagates the listener's address lookup failure.
    pub fn local_addr(&self) -> EmberResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns a shutdown handle for this server.
    ///
    /// # Errors
    ///
    /// Propagates the listener's address lookup failure.
    pub fn handle(&self) -> EmberResult<ServerHandle> {
        Ok(ServerHandle {
            stop: Arc::clone(&self.stop),
            addr: self.local_addr()?,
        })
    }

    /// Accepts connections until [`ServerHandle::shutdown`] is called, spawning one thread per
    /// client.
    ///
    /// # Errors
    ///
    /// Returns [`EmberError::Io`] when the listener fails irrecoverably.
    pub fn run(&self) -> EmberResult<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, _peer)) => {
                    if self.stop.load(Ordering::Acquire) {
                        return Ok(());
                    }
                    let ctx = Arc::clone(&self.ctx);
                    let registry = Arc::clone(&self.registry);
                    let spawned = thread::Builder::new()
                        .name("ember-conn".to_owned())
                        .spawn(move || handle_connection(stream, &ctx, &registry));
                    if let Err(err) = spawned {
                        error!(%err, "failed to spawn connection thread");
                    }
                }
                Err(err) => {
                    if self.stop.load(Ordering::Acquire) {
                        return Ok(());
                    }
                    error!(%err, "accept failed");
                }
            }
        }
    }
}
