// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;

use crate::error::Error;

/// General section in config (spec 6).
#[derive(Debug, Clone, Deserialize)]
pub struct General {
    /// Time interval to send `$SYS` messages in seconds.
    ///
    /// Set to 0 to disable `$SYS` messages.
    ///
    /// Default is 3s.
    #[serde(default = "General::default_stats_pub_interval")]
    stats_pub_interval: u32,

    /// Reject packets whose encoded size exceeds this many bytes.
    ///
    /// Default is 2 MiB, matching `max_request_size`'s default in spec 5.
    #[serde(default = "General::default_max_request_size")]
    max_request_size: usize,

    /// Upper bound on concurrently serviced connections, standing in for
    /// the fixed-size I/O thread pool (spec 4.E).
    ///
    /// Default is 64.
    #[serde(default = "General::default_io_pool_size")]
    io_pool_size: usize,

    /// Number of worker tasks draining the shared event queue (spec 4.E).
    ///
    /// Default is 4.
    #[serde(default = "General::default_worker_pool_size")]
    worker_pool_size: usize,
}

impl General {
    #[must_use]
    pub const fn default_stats_pub_interval() -> u32 {
        3
    }

    #[must_use]
    pub const fn default_max_request_size() -> usize {
        2 * 1024 * 1024
    }

    #[must_use]
    pub const fn default_io_pool_size() -> usize {
        64
    }

    #[must_use]
    pub const fn default_worker_pool_size() -> usize {
        4
    }

    #[must_use]
    pub const fn stats_pub_interval(&self) -> u32 {
        self.stats_pub_interval
    }

    #[must_use]
    pub const fn max_request_size(&self) -> usize {
        self.max_request_size
    }

    #[must_use]
    pub const fn io_pool_size(&self) -> usize {
        self.io_pool_size
    }

    #[must_use]
    pub const fn worker_pool_size(&self) -> usize {
        self.worker_pool_size
    }

    /// # Errors
    /// Returns an error if `worker_pool_size` or `io_pool_size` is zero.
    pub fn validate(&self) -> Result<(), Error> {
        if self.worker_pool_size == 0 {
            return Err(Error::new(
                crate::error::ErrorKind::ConfigError,
                "worker_pool_size must be at least 1",
            ));
        }
        if self.io_pool_size == 0 {
            return Err(Error::new(
                crate::error::ErrorKind::ConfigError,
                "io_pool_size must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for General {
    fn default() -> Self {
        Self {
            stats_pub_interval: Self::default_stats_pub_interval(),
            max_request_size: Self::default_max_request_size(),
            io_pool_size: Self::default_io_pool_size(),
            worker_pool_size: Self::default_worker_pool_size(),
        }
    }
}
