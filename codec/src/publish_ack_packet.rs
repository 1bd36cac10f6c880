// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket, PacketId};
use crate::byte_array::{write_u16, ByteArray};
use crate::error::{DecodeError, EncodeError};

/// `PUBACK`: acknowledges a `QoS::AtLeastOnce` PUBLISH (spec 4.D).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PublishAckPacket {
    pub packet_id: PacketId,
}

impl PublishAckPacket {
    #[must_use]
    pub const fn new(packet_id: PacketId) -> Self {
        Self { packet_id }
    }
}

impl DecodePacket for PublishAckPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            packet_id: ba.read_u16()?,
        })
    }
}

impl EncodePacket for PublishAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        write_u16(buf, self.packet_id);
        Ok(2)
    }
}
