// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket, PacketId};
use crate::byte_array::{write_binary, write_u16, ByteArray};
use crate::error::{DecodeError, EncodeError};

/// `UNSUBSCRIBE` packet (spec 4.D). Reserved flag bits `0010` are validated
/// by the fixed header decoder.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnsubscribePacket {
    pub packet_id: PacketId,
    pub topics: Vec<String>,
}

impl DecodePacket for UnsubscribePacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        let packet_id = ba.read_u16()?;
        let mut topics = Vec::new();
        while ba.remaining_bytes() > 0 {
            topics.push(ba.read_string()?);
        }
        Ok(Self { packet_id, topics })
    }
}

impl EncodePacket for UnsubscribePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let before = buf.len();
        write_u16(buf, self.packet_id);
        for topic in &self.topics {
            write_binary(buf, topic.as_bytes()).map_err(|_| EncodeError::InvalidVarInt)?;
        }
        Ok(buf.len() - before)
    }
}
