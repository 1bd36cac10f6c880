// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket, PacketId, QoS};
use crate::byte_array::{write_binary, write_u16, ByteArray};
use crate::error::{DecodeError, EncodeError};

/// One `(topic-filter, requested-qos)` pair inside a SUBSCRIBE payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubscribeTopic {
    pub topic: String,
    pub qos: QoS,
}

/// `SUBSCRIBE` packet (spec 4.D). A single SUBSCRIBE MAY list several topic
/// filters; the broker replies with one SUBACK combining all of them
/// [MQTT-3.8.4-4].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubscribePacket {
    pub packet_id: PacketId,
    pub topics: Vec<SubscribeTopic>,
}

impl DecodePacket for SubscribePacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        let packet_id = ba.read_u16()?;
        let mut topics = Vec::new();
        while ba.remaining_bytes() > 0 {
            let topic = ba.read_string()?;
            let qos = QoS::from_u8(ba.read_byte()?)?;
            topics.push(SubscribeTopic { topic, qos });
        }
        Ok(Self { packet_id, topics })
    }
}

impl EncodePacket for SubscribePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let before = buf.len();
        write_u16(buf, self.packet_id);
        for topic in &self.topics {
            write_binary(buf, topic.topic.as_bytes()).map_err(|_| EncodeError::InvalidVarInt)?;
            buf.push(topic.qos.as_u8());
        }
        Ok(buf.len() - before)
    }
}
