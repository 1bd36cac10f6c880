// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};
use std::io;
use tokio::sync::mpsc;

use crate::commands::{WorkItem, WriterCmd};

/// Represent the types of errors (spec 7).
#[derive(Clone, Debug)]
pub enum ErrorKind {
    /// Error occurred while performing I/O.
    IoError,

    /// Peer closed the connection.
    ClientDisconnected,

    /// Malformed packet, invalid opcode, or reserved-flags violation.
    ProtocolError,

    /// Encoded packet would exceed the configured maximum size.
    ExceedsMaxSize,

    /// CONNECT credentials did not match the authentication map.
    AuthFailed,

    /// A session's outbound inflight table is full.
    NoFreeMid,

    /// Socket-level failure.
    TransportError,

    /// Broker is shutting down.
    ShuttingDown,

    /// Config file could not be parsed or failed validation.
    ConfigError,

    /// mpsc channel error.
    ChannelError,
}

#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_owned(),
        }
    }

    #[must_use]
    pub fn from_string(kind: ErrorKind, message: String) -> Self {
        Self { kind, message }
    }

    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::from_string(ErrorKind::IoError, format!("IoError: {err}"))
    }
}

impl From<codec::EncodeError> for Error {
    fn from(err: codec::EncodeError) -> Self {
        Self::from_string(ErrorKind::ExceedsMaxSize, format!("{err:?}"))
    }
}

impl From<codec::DecodeError> for Error {
    fn from(err: codec::DecodeError) -> Self {
        Self::from_string(ErrorKind::ProtocolError, format!("{err:?}"))
    }
}

macro_rules! convert_send_error {
    ($cmd_type: ty) => {
        impl From<mpsc::error::SendError<$cmd_type>> for Error {
            fn from(err: mpsc::error::SendError<$cmd_type>) -> Self {
                Self::from_string(ErrorKind::ChannelError, format!("channel error: {err}"))
            }
        }
    };
}

convert_send_error!(WorkItem);
convert_send_error!(WriterCmd);
