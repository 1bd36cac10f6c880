// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket, QoS};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::var_int::VarInt;

/// MQTT v3.1.1 control packet opcodes, spec 4.A.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PacketType {
    Connect,
    ConnectAck,
    Publish { dup: bool, qos: QoS, retain: bool },
    PublishAck,
    PublishReceived,
    PublishRelease,
    PublishComplete,
    Subscribe,
    SubscribeAck,
    Unsubscribe,
    UnsubscribeAck,
    PingRequest,
    PingResponse,
    Disconnect,
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        let type_bits: u8 = match packet_type {
            PacketType::Connect => 1,
            PacketType::ConnectAck => 2,
            PacketType::Publish { .. } => 3,
            PacketType::PublishAck => 4,
            PacketType::PublishReceived => 5,
            PacketType::PublishRelease => 6,
            PacketType::PublishComplete => 7,
            PacketType::Subscribe => 8,
            PacketType::SubscribeAck => 9,
            PacketType::Unsubscribe => 10,
            PacketType::UnsubscribeAck => 11,
            PacketType::PingRequest => 12,
            PacketType::PingResponse => 13,
            PacketType::Disconnect => 14,
        };

        let flag_bits: u8 = match packet_type {
            PacketType::Publish { dup, qos, retain } => {
                let dup = if dup { 0b0000_1000 } else { 0 };
                let qos = match qos {
                    QoS::AtMostOnce => 0b0000_0000,
                    QoS::AtLeastOnce => 0b0000_0010,
                    QoS::ExactlyOnce => 0b0000_0100,
                };
                let retain = if retain { 0b0000_0001 } else { 0 };
                dup | qos | retain
            }
            // Bits 3,2,1,0 MUST be 0,0,1,0 respectively [MQTT-3.6.1-1] and likewise
            // for SUBSCRIBE/UNSUBSCRIBE.
            PacketType::PublishRelease | PacketType::Subscribe | PacketType::Unsubscribe => {
                0b0000_0010
            }
            _ => 0,
        };

        (type_bits << 4) | flag_bits
    }
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        let type_bits = (v & 0b1111_0000) >> 4;
        let flags = v & 0b0000_1111;

        match type_bits {
            1 if flags == 0 => Ok(Self::Connect),
            2 if flags == 0 => Ok(Self::ConnectAck),
            3 => {
                let dup = flags & 0b0000_1000 != 0;
                let retain = flags & 0b0000_0001 != 0;
                let qos = match flags & 0b0000_0110 {
                    0b0000_0000 => QoS::AtMostOnce,
                    0b0000_0010 => QoS::AtLeastOnce,
                    0b0000_0100 => QoS::ExactlyOnce,
                    _ => return Err(DecodeError::InvalidQoS),
                };
                Ok(Self::Publish { dup, qos, retain })
            }
            4 if flags == 0 => Ok(Self::PublishAck),
            5 if flags == 0 => Ok(Self::PublishReceived),
            6 if flags == 0b0000_0010 => Ok(Self::PublishRelease),
            7 if flags == 0 => Ok(Self::PublishComplete),
            8 if flags == 0b0000_0010 => Ok(Self::Subscribe),
            9 if flags == 0 => Ok(Self::SubscribeAck),
            10 if flags == 0b0000_0010 => Ok(Self::Unsubscribe),
            11 if flags == 0 => Ok(Self::UnsubscribeAck),
            12 if flags == 0 => Ok(Self::PingRequest),
            13 if flags == 0 => Ok(Self::PingResponse),
            14 if flags == 0 => Ok(Self::Disconnect),
            1..=14 => {
                log::warn!("header: reserved flag bits violated, type={type_bits}, flags={flags:#06b}");
                Err(DecodeError::MalformedFlags)
            }
            _ => Err(DecodeError::UnknownOpcode),
        }
    }
}

/// Fixed header: 1 control byte + 1-4 byte remaining length (spec 4.A).
#[derive(Clone, Copy, Debug)]
pub struct FixedHeader {
    packet_type: PacketType,
    remaining_length: usize,
}

impl FixedHeader {
    #[must_use]
    pub const fn new(packet_type: PacketType, remaining_length: usize) -> Self {
        Self {
            packet_type,
            remaining_length,
        }
    }

    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    #[must_use]
    pub const fn remaining_length(&self) -> usize {
        self.remaining_length
    }
}

impl DecodePacket for FixedHeader {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        let flag = ba.read_byte()?;
        let packet_type = PacketType::try_from(flag)?;
        let remaining_length = VarInt::decode(ba)?.value();
        Ok(Self {
            packet_type,
            remaining_length,
        })
    }
}

impl EncodePacket for FixedHeader {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let byte: u8 = self.packet_type.into();
        buf.push(byte);
        let var = VarInt::from(self.remaining_length)?;
        let len_bytes = var.encode(buf)?;
        Ok(1 + len_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_publish_fixed_header() {
        let buf = [0x32, 0x07];
        let mut ba = ByteArray::new(&buf);
        let header = FixedHeader::decode(&mut ba).unwrap();
        assert_eq!(
            header.packet_type(),
            PacketType::Publish {
                dup: false,
                qos: QoS::AtLeastOnce,
                retain: false
            }
        );
        assert_eq!(header.remaining_length(), 7);
    }

    #[test]
    fn reserved_flags_violation_is_rejected() {
        // SUBSCRIBE with flags = 0 instead of the mandated 0b0010.
        let buf = [0x80, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            FixedHeader::decode(&mut ba),
            Err(DecodeError::MalformedFlags)
        );
    }
}
