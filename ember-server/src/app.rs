//! Process composition root: journal, cache, cold tier, janitor, recovery, and the TCP front
//! end, wired in dependency order and torn down in reverse.

use std::sync::Arc;

use tracing::{info, warn};

use ember_common::clock::now_precise;
use ember_common::config::ServerConfig;
use ember_common::error::EmberResult;
use ember_common::persist::Persistence;
use ember_journal::AofPersister;
use ember_store::{Cache, Janitor};

use crate::dispatch::ServerContext;
use crate::server::Server;

/// One fully wired engine instance (everything but the TCP front end).
pub struct App {
    pub cache: Arc<Cache>,
    pub journal: Arc<AofPersister>,
    janitor: Janitor,
}

impl App {
    /// Opens the journal and cold tier under `config.dir`, starts the janitor, and replays the
    /// journal into the cache.
    ///
    /// # Errors
    ///
    /// Fails when the journal cannot be opened; an unusable cold tier only logs a warning.
    pub fn open(config: &ServerConfig) -> EmberResult<Self> {
        let journal = Arc::new(AofPersister::open(&config.dir)?);
        let cache = Arc::new(Cache::with_max_keys(
            Arc::clone(&journal) as Arc<dyn Persistence>,
            config.max_keys,
        ));

        if let Err(error) = cache.init_cold_storage(&config.dir) {
            warn!(%error, "cold storage unavailable, running hot-tier only");
        }

        let janitor = Janitor::start(Arc::clone(&cache));

        let app = Self {
            cache,
            journal,
            janitor,
        };
        app.replay_journal()?;
        Ok(app)
    }

    fn replay_journal(&self) -> EmberResult<()> {
        let cache = Arc::clone(&self.cache);
        let report = self.journal.read(move |cmd, key, value, expire_at| {
            match cmd {
                b"SET" => {
                    if expire_at > 0 && expire_at < now_precise() {
                        return;
                    }
                    cache.apply_journal_set(key, value.to_vec(), expire_at);
                }
                b"DEL" => cache.apply_journal_del(key),
                _ => {}
            }
        })?;

        info!(entries = report.valid_entries, "journal replayed");
        if report.truncated {
            warn!(
                offset = report.truncated_at,
                discarded = report.corrupt_entries,
                "journal tail was corrupt and has been truncated"
            );
        }
        Ok(())
    }

    /// Builds the shared per-command context.
    #[must_use]
    pub fn context(&self, config: &ServerConfig) -> ServerContext {
        ServerContext {
            cache: Arc::clone(&self.cache),
            journal: Some(Arc::clone(&self.journal)),
            password: config.auth.clone(),
            port_label: config.port_label(),
        }
    }

    /// Graceful teardown: stop the janitor, flush the cold tier, close the journal.
    pub fn close(mut self) {
        self.janitor.stop();
        self.cache.close();
        self.journal.close();
        info!("engine closed");
    }
}

/// Runs the server until shutdown. Bind failures propagate so the process can exit non-zero.
///
/// # Errors
///
/// Returns the journal-open or bind error.
pub fn run(config: &ServerConfig) -> EmberResult<()> {
    let app = App::open(config)?;
    let server = Server::bind(&config.normalized_bind_addr(), app.context(config))?;
    let result = server.run();
    app.close();
    result
}
