//! Runtime configuration shared by process bootstrap code.

use std::path::PathBuf;

/// Bootstrap configuration used by `ember-server` during process startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP bind address. A bare `:port` form binds on all interfaces.
    pub bind_addr: String,
    /// Directory holding the journal and the cold-tier snapshot.
    pub dir: PathBuf,
    /// Password required by AUTH. `None` disables authentication.
    pub auth: Option<String>,
    /// Upper bound on live hot-tier keys. Zero disables the cap.
    pub max_keys: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ":6380".to_owned(),
            dir: PathBuf::from("./cache-files"),
            auth: None,
            max_keys: 0,
        }
    }
}

impl ServerConfig {
    /// Expands a bare `:port` bind form into an all-interfaces socket address.
    #[must_use]
    pub fn normalized_bind_addr(&self) -> String {
        if self.bind_addr.starts_with(':') {
            format!("0.0.0.0{}", self.bind_addr)
        } else {
            self.bind_addr.clone()
        }
    }

    /// Returns the port portion of the bind address, used by INFO replies.
    #[must_use]
    pub fn port_label(&self) -> String {
        self.bind_addr
            .rsplit(':')
            .next()
            .unwrap_or_default()
            .to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::ServerConfig;
    use googletest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(":6380", "0.0.0.0:6380")]
    #[case("127.0.0.1:7000", "127.0.0.1:7000")]
    fn bind_addr_normalization(#[case] raw: &str, #[case] expected: &str) {
        let config = ServerConfig {
            bind_addr: raw.to_owned(),
            ..ServerConfig::default()
        };
        assert_that!(config.normalized_bind_addr().as_str(), eq(expected));
    }

    #[rstest]
    fn port_label_strips_host() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:7000".to_owned(),
            ..ServerConfig::default()
        };
        assert_that!(config.port_label().as_str(), eq("7000"));
    }
}
