// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket, PacketId, QoS};
use crate::byte_array::{write_binary, write_u16, ByteArray};
use crate::error::{DecodeError, EncodeError};

/// `PUBLISH` packet (spec 4.D). `packet_id` is only present on the wire for
/// `qos > 0`; it is `0` for `AtMostOnce` deliveries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishPacket {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    pub packet_id: PacketId,
    pub payload: Vec<u8>,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic: &str, qos: QoS, payload: Vec<u8>) -> Self {
        Self {
            dup: false,
            qos,
            retain: false,
            topic: topic.to_string(),
            packet_id: 0,
            payload,
        }
    }

    /// Returns a clone with the DUP flag set, used by the retransmitter (spec 4.F).
    #[must_use]
    pub fn with_dup(&self) -> Self {
        let mut cloned = self.clone();
        cloned.dup = true;
        cloned
    }

    pub fn decode_body(
        ba: &mut ByteArray<'_>,
        dup: bool,
        qos: QoS,
        retain: bool,
    ) -> Result<Self, DecodeError> {
        let topic = ba.read_string()?;
        let packet_id = if qos == QoS::AtMostOnce {
            0
        } else {
            ba.read_u16()?
        };
        let payload = ba.remaining_bytes();
        let payload = ba.read_bytes(payload)?.to_vec();
        Ok(Self {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload,
        })
    }
}

impl EncodePacket for PublishPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let before = buf.len();
        write_binary(buf, self.topic.as_bytes()).map_err(|_| EncodeError::InvalidVarInt)?;
        if self.qos != QoS::AtMostOnce {
            write_u16(buf, self.packet_id);
        }
        buf.extend_from_slice(&self.payload);
        Ok(buf.len() - before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_qos0_has_no_packet_id_on_wire() {
        let packet = PublishPacket::new("a/b", QoS::AtMostOnce, b"hi".to_vec());
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        // topic len(2) + "a/b"(3) + payload(2), no packet id bytes.
        assert_eq!(buf.len(), 2 + 3 + 2);

        let mut ba = ByteArray::new(&buf);
        let decoded =
            PublishPacket::decode_body(&mut ba, false, QoS::AtMostOnce, false).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn round_trip_qos1_carries_packet_id() {
        let mut packet = PublishPacket::new("t", QoS::AtLeastOnce, b"x".to_vec());
        packet.packet_id = 17;
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded =
            PublishPacket::decode_body(&mut ba, false, QoS::AtLeastOnce, false).unwrap();
        assert_eq!(decoded.packet_id, 17);
        assert_eq!(decoded.payload, b"x");
    }
}
