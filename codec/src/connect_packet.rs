// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket, QoS};
use crate::byte_array::{write_binary, write_u16, ByteArray};
use crate::error::{DecodeError, EncodeError};

const PROTOCOL_NAME: &str = "MQTT";

/// Maximum `client_id` length per MQTT v3.1.1 (spec 3, Session).
pub const MAX_CLIENT_ID_LEN: usize = 23;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProtocolLevel {
    V31 = 3,
    V311 = 4,
}

impl TryFrom<u8> for ProtocolLevel {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            3 => Ok(Self::V31),
            4 => Ok(Self::V311),
            _ => Err(DecodeError::InvalidProtocolLevel),
        }
    }
}

/// Structure of the CONNECT flags byte:
/// ```txt
///  7        6        5            4-3        2       1              0
/// User-Pwd Pwd-Flag Will-Retain  Will-QoS  Will-Flag Clean-Session  Reserved
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConnectFlags {
    pub username: bool,
    pub password: bool,
    pub will_retain: bool,
    pub will_qos: QoS,
    pub will: bool,
    pub clean_session: bool,
}

impl DecodePacket for ConnectFlags {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        let flags = ba.read_byte()?;
        let will_qos = QoS::from_u8((flags & 0b0001_1000) >> 3)?;
        Ok(Self {
            username: flags & 0b1000_0000 != 0,
            password: flags & 0b0100_0000 != 0,
            will_retain: flags & 0b0010_0000 != 0,
            will_qos,
            will: flags & 0b0000_0100 != 0,
            clean_session: flags & 0b0000_0010 != 0,
        })
    }
}

impl EncodePacket for ConnectFlags {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let username = if self.username { 0b1000_0000 } else { 0 };
        let password = if self.password { 0b0100_0000 } else { 0 };
        let will_retain = if self.will_retain { 0b0010_0000 } else { 0 };
        let will_qos = match self.will_qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 0b0000_1000,
            QoS::ExactlyOnce => 0b0001_0000,
        };
        let will = if self.will { 0b0000_0100 } else { 0 };
        let clean_session = if self.clean_session { 0b0000_0010 } else { 0 };
        buf.push(username | password | will_retain | will_qos | will | clean_session);
        Ok(1)
    }
}

/// `CONNECT` packet (spec 4.D).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConnectPacket {
    pub protocol_level: u8,
    pub connect_flags: ConnectFlags,
    pub keep_alive: u16,
    pub client_id: String,
    pub will_topic: String,
    pub will_message: Vec<u8>,
    pub username: String,
    pub password: Vec<u8>,
}

impl Default for ProtocolLevel {
    fn default() -> Self {
        Self::V311
    }
}

impl ConnectPacket {
    #[must_use]
    pub fn is_valid_protocol(&self) -> bool {
        self.protocol_level == ProtocolLevel::V311 as u8
    }
}

impl DecodePacket for ConnectPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        let protocol_name = ba.read_string()?;
        if protocol_name != PROTOCOL_NAME {
            return Err(DecodeError::InvalidProtocolName);
        }
        let protocol_level = ba.read_byte()?;
        let connect_flags = ConnectFlags::decode(ba)?;
        let keep_alive = ba.read_u16()?;

        let client_id = ba.read_string()?;
        if client_id.len() > MAX_CLIENT_ID_LEN {
            return Err(DecodeError::InvalidClientId);
        }

        let (will_topic, will_message) = if connect_flags.will {
            (ba.read_string()?, ba.read_binary()?.to_vec())
        } else {
            (String::new(), Vec::new())
        };

        let username = if connect_flags.username {
            ba.read_string()?
        } else {
            String::new()
        };

        let password = if connect_flags.password {
            ba.read_binary()?.to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            protocol_level,
            connect_flags,
            keep_alive,
            client_id,
            will_topic,
            will_message,
            username,
            password,
        })
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let before = buf.len();
        write_binary(buf, PROTOCOL_NAME.as_bytes()).map_err(|_| EncodeError::InvalidVarInt)?;
        buf.push(self.protocol_level);
        self.connect_flags.encode(buf)?;
        write_u16(buf, self.keep_alive);
        write_binary(buf, self.client_id.as_bytes()).map_err(|_| EncodeError::InvalidVarInt)?;
        if self.connect_flags.will {
            write_binary(buf, self.will_topic.as_bytes()).map_err(|_| EncodeError::InvalidVarInt)?;
            write_binary(buf, &self.will_message).map_err(|_| EncodeError::InvalidVarInt)?;
        }
        if self.connect_flags.username {
            write_binary(buf, self.username.as_bytes()).map_err(|_| EncodeError::InvalidVarInt)?;
        }
        if self.connect_flags.password {
            write_binary(buf, &self.password).map_err(|_| EncodeError::InvalidVarInt)?;
        }
        Ok(buf.len() - before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_minimal_connect() {
        let buf: Vec<u8> = vec![
            0, 4, b'M', b'Q', b'T', b'T', 4, 0b0000_0010, 0, 60, 0, 8, b'w', b'v', b'P', b'T',
            b'X', b'c', b'C', b'w',
        ];
        let mut ba = ByteArray::new(&buf);
        let packet = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(packet.client_id, "wvPTXcCw");
        assert!(packet.connect_flags.clean_session);
        assert!(packet.is_valid_protocol());
    }

    #[test]
    fn encode_decode_round_trip_with_will() {
        let packet = ConnectPacket {
            protocol_level: ProtocolLevel::V311 as u8,
            connect_flags: ConnectFlags {
                will: true,
                will_qos: QoS::AtLeastOnce,
                clean_session: true,
                ..ConnectFlags::default()
            },
            keep_alive: 30,
            client_id: "abc".to_string(),
            will_topic: "last/will".to_string(),
            will_message: b"bye".to_vec(),
            username: String::new(),
            password: Vec::new(),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
    }
}
