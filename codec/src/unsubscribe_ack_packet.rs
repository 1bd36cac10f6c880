// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket, PacketId};
use crate::byte_array::{write_u16, ByteArray};
use crate::error::{DecodeError, EncodeError};

/// `UNSUBACK`: acknowledges an UNSUBSCRIBE [MQTT-3.10.4-4], [MQTT-3.10.4-5].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnsubscribeAckPacket {
    pub packet_id: PacketId,
}

impl UnsubscribeAckPacket {
    #[must_use]
    pub const fn new(packet_id: PacketId) -> Self {
        Self { packet_id }
    }
}

impl DecodePacket for UnsubscribeAckPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            packet_id: ba.read_u16()?,
        })
    }
}

impl EncodePacket for UnsubscribeAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        write_u16(buf, self.packet_id);
        Ok(2)
    }
}
