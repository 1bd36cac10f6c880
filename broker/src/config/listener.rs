// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{Error, ErrorKind};

/// Binding protocol types. TLS and Unix-domain variants are accepted for
/// config compatibility but the connection core only implements `Mqtt`
/// (spec 1: TLS is a non-goal, specified only through its byte-stream
/// contract).
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum SocketFamily {
    #[serde(alias = "inet")]
    Inet,

    #[serde(alias = "unix")]
    Unix,
}

/// Listener represents the broker's single bind address and its TLS/auth
/// related options (spec 6).
#[derive(Debug, Deserialize, Clone)]
pub struct Listener {
    /// Listening address, host part.
    ///
    /// Default is `0.0.0.0`.
    #[serde(default = "Listener::default_ip")]
    ip: String,

    /// Listening port.
    ///
    /// Default is 1883.
    #[serde(default = "Listener::default_port")]
    port: u16,

    /// Binding socket family.
    ///
    /// Default is `Inet`.
    #[serde(default = "Listener::default_socket_family")]
    socket_family: SocketFamily,

    /// Enable TLS. Not implemented by the connection core; recorded here
    /// purely as part of the external configuration contract (spec 1, 6).
    ///
    /// Default is false.
    #[serde(default = "Listener::default_use_ssl")]
    use_ssl: bool,

    /// Path to CA cert file, only meaningful when `use_ssl` is set.
    #[serde(default = "Listener::default_pathbuf")]
    cafile: Option<PathBuf>,

    /// Path to TLS cert file, only meaningful when `use_ssl` is set.
    #[serde(default = "Listener::default_pathbuf")]
    certfile: Option<PathBuf>,

    /// Path to TLS private key file, only meaningful when `use_ssl` is set.
    #[serde(default = "Listener::default_pathbuf")]
    keyfile: Option<PathBuf>,
}

impl Listener {
    #[must_use]
    pub fn default_ip() -> String {
        "0.0.0.0".to_string()
    }

    #[must_use]
    pub const fn default_port() -> u16 {
        1883
    }

    #[must_use]
    pub const fn default_socket_family() -> SocketFamily {
        SocketFamily::Inet
    }

    #[must_use]
    pub const fn default_use_ssl() -> bool {
        false
    }

    #[must_use]
    pub const fn default_pathbuf() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub const fn socket_family(&self) -> SocketFamily {
        self.socket_family
    }

    #[must_use]
    pub const fn use_ssl(&self) -> bool {
        self.use_ssl
    }

    /// # Errors
    /// Returns an error if `use_ssl` is set but `certfile`/`keyfile` are missing,
    /// or if the socket family is `Unix` (not implemented by this core).
    pub fn validate(&self) -> Result<(), Error> {
        if self.socket_family == SocketFamily::Unix {
            return Err(Error::new(
                ErrorKind::ConfigError,
                "unix domain socket listeners are not implemented",
            ));
        }
        if self.use_ssl && (self.certfile.is_none() || self.keyfile.is_none()) {
            return Err(Error::new(
                ErrorKind::ConfigError,
                "use_ssl requires certfile and keyfile",
            ));
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            ip: Self::default_ip(),
            port: Self::default_port(),
            socket_family: Self::default_socket_family(),
            use_ssl: Self::default_use_ssl(),
            cafile: Self::default_pathbuf(),
            certfile: Self::default_pathbuf(),
            keyfile: Self::default_pathbuf(),
        }
    }
}
