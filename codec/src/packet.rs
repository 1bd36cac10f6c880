// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket};
use crate::byte_array::ByteArray;
use crate::connect_ack_packet::ConnectAckPacket;
use crate::connect_packet::ConnectPacket;
use crate::disconnect_packet::DisconnectPacket;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, PacketType};
use crate::ping_request_packet::PingRequestPacket;
use crate::ping_response_packet::PingResponsePacket;
use crate::publish_ack_packet::PublishAckPacket;
use crate::publish_complete_packet::PublishCompletePacket;
use crate::publish_packet::PublishPacket;
use crate::publish_received_packet::PublishReceivedPacket;
use crate::publish_release_packet::PublishReleasePacket;
use crate::subscribe_ack_packet::SubscribeAckPacket;
use crate::subscribe_packet::SubscribePacket;
use crate::unsubscribe_ack_packet::UnsubscribeAckPacket;
use crate::unsubscribe_packet::UnsubscribePacket;
use crate::var_int::VarInt;

/// Every MQTT v3.1.1 control packet, unified for use at the connection
/// boundary (spec 4.A: `decode`/`encode`/`encoded_size`).
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnectAck(ConnectAckPacket),
    Publish(PublishPacket),
    PublishAck(PublishAckPacket),
    PublishReceived(PublishReceivedPacket),
    PublishRelease(PublishReleasePacket),
    PublishComplete(PublishCompletePacket),
    Subscribe(SubscribePacket),
    SubscribeAck(SubscribeAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubscribeAck(UnsubscribeAckPacket),
    PingRequest(PingRequestPacket),
    PingResponse(PingResponsePacket),
    Disconnect(DisconnectPacket),
}

impl Packet {
    /// Decode a single packet from a buffer that already holds at least one
    /// full fixed header plus remaining-length bytes of payload.
    ///
    /// Returns the decoded packet and the number of bytes of `buf` it
    /// consumed, so the caller (the per-connection read loop) can drain its
    /// buffer accordingly.
    ///
    /// # Errors
    /// Returns `DecodeError::TruncatedPayload` when `buf` does not yet
    /// contain a full packet; the caller should read more bytes and retry.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut header_ba = ByteArray::new(buf);
        let header = FixedHeader::decode(&mut header_ba)?;
        let header_len = header_ba.offset();
        let total_len = header_len + header.remaining_length();
        if buf.len() < total_len {
            return Err(DecodeError::TruncatedPayload);
        }

        let body = &buf[header_len..total_len];
        let mut body_ba = ByteArray::new(body);

        let packet = match header.packet_type() {
            PacketType::Connect => Self::Connect(ConnectPacket::decode(&mut body_ba)?),
            PacketType::ConnectAck => Self::ConnectAck(ConnectAckPacket::decode(&mut body_ba)?),
            PacketType::Publish { dup, qos, retain } => {
                Self::Publish(PublishPacket::decode_body(&mut body_ba, dup, qos, retain)?)
            }
            PacketType::PublishAck => Self::PublishAck(PublishAckPacket::decode(&mut body_ba)?),
            PacketType::PublishReceived => {
                Self::PublishReceived(PublishReceivedPacket::decode(&mut body_ba)?)
            }
            PacketType::PublishRelease => {
                Self::PublishRelease(PublishReleasePacket::decode(&mut body_ba)?)
            }
            PacketType::PublishComplete => {
                Self::PublishComplete(PublishCompletePacket::decode(&mut body_ba)?)
            }
            PacketType::Subscribe => Self::Subscribe(SubscribePacket::decode(&mut body_ba)?),
            PacketType::SubscribeAck => {
                Self::SubscribeAck(SubscribeAckPacket::decode(&mut body_ba)?)
            }
            PacketType::Unsubscribe => Self::Unsubscribe(UnsubscribePacket::decode(&mut body_ba)?),
            PacketType::UnsubscribeAck => {
                Self::UnsubscribeAck(UnsubscribeAckPacket::decode(&mut body_ba)?)
            }
            PacketType::PingRequest => Self::PingRequest(PingRequestPacket::decode(&mut body_ba)?),
            PacketType::PingResponse => {
                Self::PingResponse(PingResponsePacket::decode(&mut body_ba)?)
            }
            PacketType::Disconnect => Self::Disconnect(DisconnectPacket::decode(&mut body_ba)?),
        };

        Ok((packet, total_len))
    }

    /// Encode this packet, including its fixed header, onto `buf`.
    ///
    /// # Errors
    /// Returns `EncodeError::InvalidVarInt` if the body exceeds the 256MB
    /// remaining-length limit.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let mut body = Vec::new();
        match self {
            Self::Connect(packet) => packet.encode(&mut body)?,
            Self::ConnectAck(packet) => packet.encode(&mut body)?,
            Self::Publish(packet) => packet.encode(&mut body)?,
            Self::PublishAck(packet) => packet.encode(&mut body)?,
            Self::PublishReceived(packet) => packet.encode(&mut body)?,
            Self::PublishRelease(packet) => packet.encode(&mut body)?,
            Self::PublishComplete(packet) => packet.encode(&mut body)?,
            Self::Subscribe(packet) => packet.encode(&mut body)?,
            Self::SubscribeAck(packet) => packet.encode(&mut body)?,
            Self::Unsubscribe(packet) => packet.encode(&mut body)?,
            Self::UnsubscribeAck(packet) => packet.encode(&mut body)?,
            Self::PingRequest(packet) => packet.encode(&mut body)?,
            Self::PingResponse(packet) => packet.encode(&mut body)?,
            Self::Disconnect(packet) => packet.encode(&mut body)?,
        };

        let header = FixedHeader::new(self.packet_type(), body.len());
        let before = buf.len();
        header.encode(buf)?;
        buf.extend_from_slice(&body);
        Ok(buf.len() - before)
    }

    /// Size in bytes this packet would occupy on the wire, without encoding it.
    ///
    /// # Errors
    /// Returns `EncodeError::InvalidVarInt` if the body exceeds the 256MB
    /// remaining-length limit.
    pub fn encoded_size(&self) -> Result<usize, EncodeError> {
        let mut scratch = Vec::new();
        self.encode(&mut scratch)
    }

    const fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::ConnectAck(_) => PacketType::ConnectAck,
            Self::Publish(packet) => PacketType::Publish {
                dup: packet.dup,
                qos: packet.qos,
                retain: packet.retain,
            },
            Self::PublishAck(_) => PacketType::PublishAck,
            Self::PublishReceived(_) => PacketType::PublishReceived,
            Self::PublishRelease(_) => PacketType::PublishRelease,
            Self::PublishComplete(_) => PacketType::PublishComplete,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::SubscribeAck(_) => PacketType::SubscribeAck,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::UnsubscribeAck(_) => PacketType::UnsubscribeAck,
            Self::PingRequest(_) => PacketType::PingRequest,
            Self::PingResponse(_) => PacketType::PingResponse,
            Self::Disconnect(_) => PacketType::Disconnect,
        }
    }

    /// The packet identifier carried by this packet, if its type has one.
    #[must_use]
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Self::Publish(packet) if packet.packet_id != 0 => Some(packet.packet_id),
            Self::PublishAck(packet) => Some(packet.packet_id),
            Self::PublishReceived(packet) => Some(packet.packet_id),
            Self::PublishRelease(packet) => Some(packet.packet_id),
            Self::PublishComplete(packet) => Some(packet.packet_id),
            Self::Subscribe(packet) => Some(packet.packet_id),
            Self::SubscribeAck(packet) => Some(packet.packet_id),
            Self::Unsubscribe(packet) => Some(packet.packet_id),
            Self::UnsubscribeAck(packet) => Some(packet.packet_id),
            _ => None,
        }
    }
}

/// Peek the remaining-length of a packet sitting at the front of `buf` without
/// consuming it, so the connection read loop knows how many more bytes to
/// accumulate before calling [`Packet::decode`]. Returns `None` if `buf`
/// does not yet contain a full fixed header.
#[must_use]
pub fn peek_total_len(buf: &[u8]) -> Option<usize> {
    let mut ba = ByteArray::new(buf);
    let _ = ba.read_byte().ok()?;
    let var = VarInt::decode(&mut ba).ok()?;
    Some(ba.offset() + var.value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::QoS;

    #[test]
    fn round_trips_publish_through_the_enum() {
        let packet = Packet::Publish(PublishPacket::new("a/b", QoS::AtMostOnce, b"hi".to_vec()));
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let (decoded, consumed) = Packet::decode(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, packet);
    }

    #[test]
    fn decode_reports_truncated_payload_for_a_partial_frame() {
        let packet = Packet::PingRequest(PingRequestPacket);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        buf.push(0xc0); // start of a second, incomplete packet
        let (_, consumed) = Packet::decode(&buf).unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(
            Packet::decode(&buf[consumed..]),
            Err(DecodeError::TruncatedPayload)
        );
    }

    #[test]
    fn peek_total_len_matches_encoded_size() {
        let packet = Packet::Subscribe(SubscribePacket {
            packet_id: 9,
            topics: vec![crate::subscribe_packet::SubscribeTopic {
                topic: "x/y".to_string(),
                qos: QoS::AtLeastOnce,
            }],
        });
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(peek_total_len(&buf), Some(buf.len()));
    }
}
