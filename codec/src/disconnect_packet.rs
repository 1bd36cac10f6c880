// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

/// `DISCONNECT`: graceful session close [MQTT-3.14.4-1]. Tells the broker to
/// discard the Will without publishing it. Has no variable header or
/// payload.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DisconnectPacket;

impl DecodePacket for DisconnectPacket {
    fn decode(_ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        Ok(Self)
    }
}

impl EncodePacket for DisconnectPacket {
    fn encode(&self, _buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        Ok(0)
    }
}
