//! MQTT 3.1.1 packet encoding and decoding
//!
//! Only what a QoS 0 subscriber needs. Encoders append to a caller buffer,
//! the decoder works on whatever prefix of the stream has arrived.

use heapless::Vec;

use crate::error::Error;

const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const PUBACK: u8 = 0x40;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 0x90;
const UNSUBACK: u8 = 0xB0;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD0;
const DISCONNECT: u8 = 0xE0;

const PROTOCOL_LEVEL_3_1_1: u8 = 4;
const FLAG_USERNAME: u8 = 0x80;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_CLEAN_SESSION: u8 = 0x02;

/// Largest remaining length expressible in four bytes
const MAX_REMAINING: usize = 268_435_455;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    ConnAck {
        session_present: bool,
        return_code: u8,
    },
    Publish {
        topic: &'a str,
        payload: &'a [u8],
        packet_id: Option<u16>,
    },
    SubAck {
        packet_id: u16,
        granted_qos: u8,
    },
    UnsubAck {
        packet_id: u16,
    },
    PingResp,
    /// Anything a client does not expect; carries the packet type byte
    Other(u8),
}

fn push<const N: usize>(buf: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), Error> {
    buf.extend_from_slice(bytes)
        .map_err(|_| Error::Value("packet does not fit the send buffer"))
}

fn push_str<const N: usize>(buf: &mut Vec<u8, N>, text: &[u8]) -> Result<(), Error> {
    let len = u16::try_from(text.len()).map_err(|_| Error::Value("MQTT string too long"))?;
    push(buf, &len.to_be_bytes())?;
    push(buf, text)
}

fn push_header<const N: usize>(
    buf: &mut Vec<u8, N>,
    first: u8,
    remaining: usize,
) -> Result<(), Error> {
    if remaining > MAX_REMAINING {
        return Err(Error::Value("MQTT packet too long"));
    }
    push(buf, &[first])?;
    let mut len = remaining;
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        push(buf, &[byte])?;
        if len == 0 {
            return Ok(());
        }
    }
}

pub fn encode_connect<const N: usize>(
    buf: &mut Vec<u8, N>,
    client_id: &str,
    username: &str,
    password: &str,
    keep_alive_secs: u16,
) -> Result<(), Error> {
    let mut flags = FLAG_CLEAN_SESSION;
    let mut remaining = 10 + 2 + client_id.len();
    if !username.is_empty() {
        flags |= FLAG_USERNAME;
        remaining += 2 + username.len();
    }
    if !password.is_empty() {
        flags |= FLAG_PASSWORD;
        remaining += 2 + password.len();
    }

    push_header(buf, CONNECT, remaining)?;
    push_str(buf, b"MQTT")?;
    push(buf, &[PROTOCOL_LEVEL_3_1_1, flags])?;
    push(buf, &keep_alive_secs.to_be_bytes())?;
    push_str(buf, client_id.as_bytes())?;
    if !username.is_empty() {
        push_str(buf, username.as_bytes())?;
    }
    if !password.is_empty() {
        push_str(buf, password.as_bytes())?;
    }
    Ok(())
}

pub fn encode_subscribe<const N: usize>(
    buf: &mut Vec<u8, N>,
    packet_id: u16,
    topic: &str,
    qos: u8,
) -> Result<(), Error> {
    push_header(buf, SUBSCRIBE, 2 + 2 + topic.len() + 1)?;
    push(buf, &packet_id.to_be_bytes())?;
    push_str(buf, topic.as_bytes())?;
    push(buf, &[qos.min(1)])
}

/// QoS 0 publish, no retain
pub fn encode_publish<const N: usize>(
    buf: &mut Vec<u8, N>,
    topic: &str,
    payload: &[u8],
) -> Result<(), Error> {
    push_header(buf, PUBLISH, 2 + topic.len() + payload.len())?;
    push_str(buf, topic.as_bytes())?;
    push(buf, payload)
}

pub fn encode_puback<const N: usize>(buf: &mut Vec<u8, N>, packet_id: u16) -> Result<(), Error> {
    push_header(buf, PUBACK, 2)?;
    push(buf, &packet_id.to_be_bytes())
}

pub fn encode_pingreq<const N: usize>(buf: &mut Vec<u8, N>) -> Result<(), Error> {
    push_header(buf, PINGREQ, 0)
}

pub fn encode_disconnect<const N: usize>(buf: &mut Vec<u8, N>) -> Result<(), Error> {
    push_header(buf, DISCONNECT, 0)
}

/// Decode the remaining-length field at the start of `bytes`.
/// Returns (length, bytes used), or `None` if more bytes are needed.
fn remaining_length(bytes: &[u8]) -> Result<Option<(usize, usize)>, Error> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (i, &byte) in bytes.iter().enumerate().take(4) {
        value += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
        multiplier *= 128;
    }
    if bytes.len() >= 4 {
        Err(Error::Value("malformed MQTT remaining length"))
    } else {
        Ok(None)
    }
}

fn be16(bytes: &[u8]) -> Result<u16, Error> {
    match bytes {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(Error::Value("truncated MQTT packet")),
    }
}

/// Decode one packet from the front of `bytes`.
///
/// Returns the packet and how many bytes it used, or `None` if the packet is
/// not complete yet.
pub fn decode(bytes: &[u8]) -> Result<Option<(Packet<'_>, usize)>, Error> {
    let Some(&first) = bytes.first() else {
        return Ok(None);
    };
    let Some((remaining, len_bytes)) = remaining_length(&bytes[1..])? else {
        return Ok(None);
    };
    let start = 1 + len_bytes;
    let total = start + remaining;
    if bytes.len() < total {
        return Ok(None);
    }
    let body = &bytes[start..total];

    let packet = match first & 0xF0 {
        CONNACK => {
            if body.len() < 2 {
                return Err(Error::Value("truncated CONNACK"));
            }
            Packet::ConnAck {
                session_present: body[0] & 0x01 != 0,
                return_code: body[1],
            }
        }
        PUBLISH => {
            let qos = (first >> 1) & 0x03;
            let topic_len = be16(body)? as usize;
            let topic_end = 2 + topic_len;
            let topic = body
                .get(2..topic_end)
                .ok_or(Error::Value("truncated PUBLISH topic"))?;
            let topic = core::str::from_utf8(topic)
                .map_err(|_| Error::Value("PUBLISH topic is not UTF-8"))?;
            let (packet_id, payload_start) = if qos > 0 {
                (Some(be16(&body[topic_end..])?), topic_end + 2)
            } else {
                (None, topic_end)
            };
            Packet::Publish {
                topic,
                payload: &body[payload_start..],
                packet_id,
            }
        }
        SUBACK => Packet::SubAck {
            packet_id: be16(body)?,
            granted_qos: *body.get(2).ok_or(Error::Value("truncated SUBACK"))?,
        },
        UNSUBACK => Packet::UnsubAck {
            packet_id: be16(body)?,
        },
        PINGRESP => Packet::PingResp,
        other => Packet::Other(other),
    };
    Ok(Some((packet, total)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_packet_layout() {
        let mut buf: Vec<u8, 128> = Vec::new();
        encode_connect(&mut buf, "pv", "user", "key", 60).unwrap();
        let expected: &[u8] = &[
            0x10, 25, // fixed header
            0, 4, b'M', b'Q', b'T', b'T', 4, 0xC2, 0, 60, // variable header
            0, 2, b'p', b'v', // client id
            0, 4, b'u', b's', b'e', b'r', // username
            0, 3, b'k', b'e', b'y', // password
        ];
        assert_eq!(buf.as_slice(), expected);
    }

    #[test]
    fn anonymous_connect_has_no_credential_flags() {
        let mut buf: Vec<u8, 64> = Vec::new();
        encode_connect(&mut buf, "pv", "", "", 30).unwrap();
        assert_eq!(buf[9], FLAG_CLEAN_SESSION);
        assert_eq!(buf[1] as usize, buf.len() - 2);
    }

    #[test]
    fn subscribe_packet_layout() {
        let mut buf: Vec<u8, 64> = Vec::new();
        encode_subscribe(&mut buf, 7, "u/feeds/t", 0).unwrap();
        assert_eq!(
            buf.as_slice(),
            &[0x82, 14, 0, 7, 0, 9, b'u', b'/', b'f', b'e', b'e', b'd', b's', b'/', b't', 0]
        );
    }

    #[test]
    fn long_publish_uses_multibyte_length() {
        let mut buf: Vec<u8, 512> = Vec::new();
        let payload = [b'x'; 300];
        encode_publish(&mut buf, "t", &payload).unwrap();
        // 2 + 1 + 300 = 303 = 0b10_0101111
        assert_eq!(&buf[..3], &[0x30, 0xAF, 0x02]);
        let (packet, used) = decode(&buf).unwrap().unwrap();
        assert_eq!(used, buf.len());
        match packet {
            Packet::Publish { topic, payload, packet_id } => {
                assert_eq!(topic, "t");
                assert_eq!(payload.len(), 300);
                assert_eq!(packet_id, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn send_buffer_overflow_is_reported() {
        let mut buf: Vec<u8, 8> = Vec::new();
        assert!(encode_publish(&mut buf, "topic", b"payload").is_err());
    }

    #[test]
    fn decode_waits_for_complete_packet() {
        let connack = [0x20, 2, 0, 0];
        assert_eq!(decode(&connack[..1]).unwrap(), None);
        assert_eq!(decode(&connack[..3]).unwrap(), None);
        assert_eq!(
            decode(&connack).unwrap(),
            Some((
                Packet::ConnAck {
                    session_present: false,
                    return_code: 0
                },
                4
            ))
        );
    }

    #[test]
    fn decode_qos1_publish_and_suback() {
        let stream = [
            0x32, 9, 0, 3, b'a', b'/', b'b', 0, 5, b'4', b'2', // publish qos1, id 5
            0x90, 3, 0, 1, 0, // suback id 1 qos 0
            0xD0, 0, // pingresp
        ];
        let (first, used) = decode(&stream).unwrap().unwrap();
        assert_eq!(
            first,
            Packet::Publish {
                topic: "a/b",
                payload: b"42",
                packet_id: Some(5)
            }
        );
        let (second, used2) = decode(&stream[used..]).unwrap().unwrap();
        assert_eq!(
            second,
            Packet::SubAck {
                packet_id: 1,
                granted_qos: 0
            }
        );
        let (third, _) = decode(&stream[used + used2..]).unwrap().unwrap();
        assert_eq!(third, Packet::PingResp);
    }

    #[test]
    fn malformed_length_is_rejected() {
        assert!(decode(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]).is_err());
    }

    #[test]
    fn control_packets() {
        let mut buf: Vec<u8, 8> = Vec::new();
        encode_pingreq(&mut buf).unwrap();
        encode_disconnect(&mut buf).unwrap();
        encode_puback(&mut buf, 0x0102).unwrap();
        assert_eq!(buf.as_slice(), &[0xC0, 0, 0xE0, 0, 0x40, 2, 1, 2]);
    }
}
