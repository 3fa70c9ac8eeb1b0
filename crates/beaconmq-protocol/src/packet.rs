//! MQTT 3.1.1 packet codec, limited to what a QoS 0 publisher needs.
//!
//! Each packet on the wire is:
//!   [type << 4 | flags][remaining length, 1-4 byte varint][body]

use crate::error::PacketError;

const CONNECT: u8 = 1;
const CONNACK: u8 = 2;
const PUBLISH: u8 = 3;
const SUBSCRIBE: u8 = 8;
const SUBACK: u8 = 9;
const PINGREQ: u8 = 12;
const PINGRESP: u8 = 13;
const DISCONNECT: u8 = 14;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

/// Largest value the remaining-length varint can carry.
const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// SUBACK return code for a rejected subscription.
pub const SUBACK_FAILURE: u8 = 0x80;

/// Whether a fixed-header byte starts a PUBLISH packet.
pub(crate) fn is_publish(header: u8) -> bool {
    header >> 4 == PUBLISH
}

/// CONNECT packet contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u16,
}

/// The packets this client sends or understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck { session_present: bool, return_code: u8 },
    Publish { topic: String, payload: Vec<u8> },
    Subscribe { packet_id: u16, topic: String },
    SubAck { packet_id: u16, return_codes: Vec<u8> },
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// Serialise the packet, fixed header included.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let (header, body) = match self {
            Self::Connect(connect) => (CONNECT << 4, encode_connect(connect)?),
            Self::ConnAck {
                session_present,
                return_code,
            } => (CONNACK << 4, vec![u8::from(*session_present), *return_code]),
            Self::Publish { topic, payload } => {
                let mut body = Vec::with_capacity(2 + topic.len() + payload.len());
                write_string(&mut body, topic)?;
                body.extend_from_slice(payload);
                (PUBLISH << 4, body)
            }
            Self::Subscribe { packet_id, topic } => {
                let mut body = Vec::with_capacity(5 + topic.len());
                body.extend_from_slice(&packet_id.to_be_bytes());
                write_string(&mut body, topic)?;
                body.push(0); // requested QoS 0
                ((SUBSCRIBE << 4) | 0b0010, body)
            }
            Self::SubAck {
                packet_id,
                return_codes,
            } => {
                let mut body = packet_id.to_be_bytes().to_vec();
                body.extend_from_slice(return_codes);
                (SUBACK << 4, body)
            }
            Self::PingReq => (PINGREQ << 4, Vec::new()),
            Self::PingResp => (PINGRESP << 4, Vec::new()),
            Self::Disconnect => (DISCONNECT << 4, Vec::new()),
        };

        let mut out = Vec::with_capacity(body.len() + 5);
        out.push(header);
        write_remaining_length(&mut out, body.len())?;
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode one packet from the front of `buf`.
    ///
    /// Returns `Ok(None)` while the buffer holds less than a whole packet,
    /// otherwise the packet and the number of bytes it occupied. Packets
    /// longer than `max_size` are rejected before their body arrives.
    pub fn decode(buf: &[u8], max_size: usize) -> Result<Option<(Self, usize)>, PacketError> {
        let Some(&header) = buf.first() else {
            return Ok(None);
        };
        let Some((remaining, len_bytes)) = read_remaining_length(&buf[1..])? else {
            return Ok(None);
        };

        let total = 1 + len_bytes + remaining;
        if total > max_size {
            return Err(PacketError::TooLarge {
                size: total,
                max: max_size,
            });
        }
        if buf.len() < total {
            return Ok(None);
        }

        let body = &buf[1 + len_bytes..total];
        let packet = match header >> 4 {
            CONNECT => Self::Connect(decode_connect(body)?),
            CONNACK => {
                if body.len() < 2 {
                    return Err(PacketError::Truncated("CONNACK"));
                }
                Self::ConnAck {
                    session_present: body[0] & 0x01 != 0,
                    return_code: body[1],
                }
            }
            PUBLISH => {
                let qos = (header >> 1) & 0b11;
                let (topic, mut rest) = read_string(body, "PUBLISH")?;
                if qos > 0 {
                    // Skip the packet identifier; we only subscribe at QoS 0.
                    rest = rest.get(2..).ok_or(PacketError::Truncated("PUBLISH"))?;
                }
                Self::Publish {
                    topic,
                    payload: rest.to_vec(),
                }
            }
            SUBSCRIBE => {
                let packet_id = read_u16(body, "SUBSCRIBE")?;
                let (topic, _) = read_string(&body[2..], "SUBSCRIBE")?;
                Self::Subscribe { packet_id, topic }
            }
            SUBACK => {
                let packet_id = read_u16(body, "SUBACK")?;
                Self::SubAck {
                    packet_id,
                    return_codes: body[2..].to_vec(),
                }
            }
            PINGREQ => Self::PingReq,
            PINGRESP => Self::PingResp,
            DISCONNECT => Self::Disconnect,
            other => return Err(PacketError::UnsupportedType(other)),
        };
        Ok(Some((packet, total)))
    }
}

fn encode_connect(connect: &Connect) -> Result<Vec<u8>, PacketError> {
    let mut flags = 0b0000_0010; // clean session
    if connect.username.is_some() {
        flags |= 0b1000_0000;
    }
    if connect.password.is_some() {
        flags |= 0b0100_0000;
    }

    let mut body = Vec::with_capacity(32 + connect.client_id.len());
    write_string(&mut body, PROTOCOL_NAME)?;
    body.push(PROTOCOL_LEVEL);
    body.push(flags);
    body.extend_from_slice(&connect.keep_alive_secs.to_be_bytes());
    write_string(&mut body, &connect.client_id)?;
    if let Some(username) = &connect.username {
        write_string(&mut body, username)?;
    }
    if let Some(password) = &connect.password {
        write_string(&mut body, password)?;
    }
    Ok(body)
}

fn decode_connect(body: &[u8]) -> Result<Connect, PacketError> {
    let (_name, rest) = read_string(body, "CONNECT")?;
    if rest.len() < 4 {
        return Err(PacketError::Truncated("CONNECT"));
    }
    let flags = rest[1];
    let keep_alive_secs = read_u16(&rest[2..], "CONNECT")?;
    let (client_id, mut rest) = read_string(&rest[4..], "CONNECT")?;

    let mut username = None;
    if flags & 0b1000_0000 != 0 {
        let (value, tail) = read_string(rest, "CONNECT")?;
        username = Some(value);
        rest = tail;
    }
    let mut password = None;
    if flags & 0b0100_0000 != 0 {
        let (value, _) = read_string(rest, "CONNECT")?;
        password = Some(value);
    }

    Ok(Connect {
        client_id,
        username,
        password,
        keep_alive_secs,
    })
}

fn write_string(out: &mut Vec<u8>, value: &str) -> Result<(), PacketError> {
    let len = u16::try_from(value.len()).map_err(|_| PacketError::StringTooLong)?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn read_string<'a>(buf: &'a [u8], packet: &'static str) -> Result<(String, &'a [u8]), PacketError> {
    let len = usize::from(read_u16(buf, packet)?);
    let bytes = buf.get(2..2 + len).ok_or(PacketError::Truncated(packet))?;
    let value = std::str::from_utf8(bytes)
        .map_err(|_| PacketError::InvalidUtf8)?
        .to_string();
    Ok((value, &buf[2 + len..]))
}

fn read_u16(buf: &[u8], packet: &'static str) -> Result<u16, PacketError> {
    match buf {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(PacketError::Truncated(packet)),
    }
}

pub(crate) fn write_remaining_length(out: &mut Vec<u8>, mut len: usize) -> Result<(), PacketError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(PacketError::TooLarge {
            size: len,
            max: MAX_REMAINING_LENGTH,
        });
    }
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            return Ok(());
        }
    }
}

/// Returns the decoded length and how many bytes encoded it, or `None` if
/// the varint is not complete yet.
pub(crate) fn read_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>, PacketError> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (i, byte) in buf.iter().enumerate() {
        if i == 4 {
            return Err(PacketError::MalformedLength);
        }
        value += usize::from(byte & 0x7f) * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
        multiplier *= 128;
    }
    if buf.len() >= 4 {
        return Err(PacketError::MalformedLength);
    }
    Ok(None)
}
