// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;

use crate::error::Error;

mod general;
mod listener;
mod log;
mod security;

pub use general::General;
pub use listener::{Listener, SocketFamily};
pub use log::{Log, LogLevel};
pub use security::Security;

/// Broker main config (spec 6).
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "General::default")]
    general: General,

    #[serde(default = "Listener::default")]
    listener: Listener,

    #[serde(default = "Security::default")]
    security: Security,

    #[serde(default = "Log::default")]
    log: Log,
}

impl Config {
    #[must_use]
    pub const fn general(&self) -> &General {
        &self.general
    }

    #[must_use]
    pub const fn listener(&self) -> &Listener {
        &self.listener
    }

    #[must_use]
    pub const fn security(&self) -> &Security {
        &self.security
    }

    #[must_use]
    pub const fn log(&self) -> &Log {
        &self.log
    }

    /// Validate config.
    ///
    /// # Errors
    /// Returns an error if any section fails its own validation.
    pub fn validate(&self) -> Result<(), Error> {
        self.general.validate()?;
        self.listener.validate()?;
        self.security.validate()?;
        self.log.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listener().port(), 1883);
        assert!(config.security().allow_anonymous());
    }

    #[test]
    fn parses_minimal_toml() {
        let toml_str = r#"
            [general]
            worker_pool_size = 8

            [listener]
            port = 18830

            [security]
            allow_anonymous = false
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general().worker_pool_size(), 8);
        assert_eq!(config.listener().port(), 18830);
        assert!(!config.security().allow_anonymous());
    }
}
