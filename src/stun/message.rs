//! STUN Binding Request/Response wire format (IPv4 subset).
//!
//! Header: type (2) | length (2) | magic cookie (4) | transaction id (12),
//! followed by TLV attributes padded to 4-byte boundaries. Only MAPPED-ADDRESS
//! and XOR-MAPPED-ADDRESS are read.

use std::net::{Ipv4Addr, SocketAddrV4};

use rand::Rng;

use crate::error::{StunError, StunResult};

/// STUN message types (RFC 5389)
pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_SUCCESS_RESPONSE: u16 = 0x0101;

/// STUN attributes
pub const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

/// STUN magic cookie (RFC 5389)
pub const MAGIC_COOKIE: u32 = 0x2112A442;

pub const HEADER_LEN: usize = 20;

const FAMILY_IPV4: u8 = 0x01;

/// 96-bit id correlating a request with its response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionId(pub [u8; 12]);

impl TransactionId {
    pub fn random() -> Self {
        let mut bytes = [0u8; 12];
        rand::rng().fill(&mut bytes);
        Self(bytes)
    }
}

/// 20-byte Binding Request without attributes.
pub fn build_binding_request(transaction_id: &TransactionId) -> [u8; HEADER_LEN] {
    let mut packet = [0u8; HEADER_LEN];
    packet[0..2].copy_from_slice(&BINDING_REQUEST.to_be_bytes());
    // Length stays 0x0000: no attributes.
    packet[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    packet[8..20].copy_from_slice(&transaction_id.0);
    packet
}

/// Transaction id of any message with a full header.
pub fn transaction_id_of(data: &[u8]) -> Option<TransactionId> {
    let bytes: [u8; 12] = data.get(8..HEADER_LEN)?.try_into().ok()?;
    Some(TransactionId(bytes))
}

/// Parses a Binding Success Response and returns the first IPv4 mapped address.
///
/// When `expected` is given, a response for another transaction is rejected with
/// [`StunError::TransactionMismatch`].
pub fn parse_binding_response(
    data: &[u8],
    expected: Option<&TransactionId>,
) -> StunResult<SocketAddrV4> {
    if data.len() < HEADER_LEN {
        return Err(StunError::TooShort(data.len()));
    }

    let msg_type = u16::from_be_bytes([data[0], data[1]]);
    if msg_type != BINDING_SUCCESS_RESPONSE {
        return Err(StunError::UnexpectedMessageType(msg_type));
    }

    if let Some(expected) = expected {
        if transaction_id_of(data).as_ref() != Some(expected) {
            return Err(StunError::TransactionMismatch);
        }
    }

    let cookie = MAGIC_COOKIE.to_be_bytes();
    let mut pos = HEADER_LEN;
    while pos + 4 <= data.len() {
        let attr_type = u16::from_be_bytes([data[pos], data[pos + 1]]);
        let attr_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let value_start = pos + 4;
        let value_end = value_start + attr_len;
        if value_end > data.len() {
            // Malformed length: stop walking.
            break;
        }
        let value = &data[value_start..value_end];

        let mapped = match attr_type {
            ATTR_MAPPED_ADDRESS => parse_mapped_address(value, None),
            ATTR_XOR_MAPPED_ADDRESS => parse_mapped_address(value, Some(&cookie)),
            _ => None,
        };
        if let Some(addr) = mapped {
            return Ok(addr);
        }

        // Move to next attribute (aligned to 4 bytes)
        pos = value_start + ((attr_len + 3) & !3);
    }

    Err(StunError::NoMappedAddress)
}

/// Reads an IPv4 (XOR-)MAPPED-ADDRESS value: reserved | family | port (2) | address (4).
fn parse_mapped_address(value: &[u8], xor_cookie: Option<&[u8; 4]>) -> Option<SocketAddrV4> {
    if value.len() < 8 || value[1] != FAMILY_IPV4 {
        return None;
    }
    let mut port = [value[2], value[3]];
    let mut ip = [value[4], value[5], value[6], value[7]];
    if let Some(cookie) = xor_cookie {
        port[0] ^= cookie[0];
        port[1] ^= cookie[1];
        for (byte, mask) in ip.iter_mut().zip(cookie) {
            *byte ^= mask;
        }
    }
    Some(SocketAddrV4::new(Ipv4Addr::from(ip), u16::from_be_bytes(port)))
}

/// Builds a Binding Success Response carrying `addr` as XOR-MAPPED-ADDRESS.
///
/// Used by local responders in tests and by anyone standing up a loopback STUN stub.
pub fn build_binding_response(transaction_id: &TransactionId, addr: SocketAddrV4) -> Vec<u8> {
    let cookie = MAGIC_COOKIE.to_be_bytes();
    let port = addr.port().to_be_bytes();
    let ip = addr.ip().octets();

    let mut packet = Vec::with_capacity(HEADER_LEN + 12);
    packet.extend_from_slice(&BINDING_SUCCESS_RESPONSE.to_be_bytes());
    packet.extend_from_slice(&12u16.to_be_bytes());
    packet.extend_from_slice(&cookie);
    packet.extend_from_slice(&transaction_id.0);

    packet.extend_from_slice(&ATTR_XOR_MAPPED_ADDRESS.to_be_bytes());
    packet.extend_from_slice(&8u16.to_be_bytes());
    packet.push(0);
    packet.push(FAMILY_IPV4);
    packet.push(port[0] ^ cookie[0]);
    packet.push(port[1] ^ cookie[1]);
    for (byte, mask) in ip.iter().zip(cookie) {
        packet.push(byte ^ mask);
    }
    packet
}
