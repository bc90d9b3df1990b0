// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire framing for request/reply envelopes.
//!
//! Fixed framing: 20-byte `rpc_id`, 1-byte label length `L` (<= 255), `L`
//! bytes of ASCII label, remaining bytes of opaque payload. There is no
//! length field before the payload — the datagram boundary delimits it, so
//! a transport that pads or batches datagrams would corrupt a trailing
//! `FIND_VALUE_VAL` payload that happens to end in zero bytes.

use crate::contact::Contact;
use crate::error::{Error, Result};
use crate::id::{Id, ID_LEN};

const HEADER_FIXED_LEN: usize = ID_LEN + 1; // rpc_id + label length byte

/// The closed set of wire labels. Kept as an enum (rather than the bare
/// strings a first pass might reach for) so a typo can't produce a label
/// that silently fails to match any handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Ping,
    Pong,
    FindNode,
    FindNodeResp,
    FindValue,
    FindValueVal,
    FindValueCont,
    Store,
    StoreAck,
    Refresh,
    RefreshAck,
    AdminPut,
    AdminPutResp,
    AdminGet,
    AdminGetVal,
    AdminGetNotfound,
    AdminForget,
    AdminForgetOk,
    AdminRt,
    AdminRtResp,
    AdminExit,
    AdminExitOk,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Ping => "PING",
            Label::Pong => "PONG",
            Label::FindNode => "FIND_NODE",
            Label::FindNodeResp => "FIND_NODE_RESP",
            Label::FindValue => "FIND_VALUE",
            Label::FindValueVal => "FIND_VALUE_VAL",
            Label::FindValueCont => "FIND_VALUE_CONT",
            Label::Store => "STORE",
            Label::StoreAck => "STORE_ACK",
            Label::Refresh => "REFRESH",
            Label::RefreshAck => "REFRESH_ACK",
            Label::AdminPut => "ADMIN_PUT",
            Label::AdminPutResp => "ADMIN_PUT_RESP",
            Label::AdminGet => "ADMIN_GET",
            Label::AdminGetVal => "ADMIN_GET_VAL",
            Label::AdminGetNotfound => "ADMIN_GET_NOTFOUND",
            Label::AdminForget => "ADMIN_FORGET",
            Label::AdminForgetOk => "ADMIN_FORGET_OK",
            Label::AdminRt => "ADMIN_RT",
            Label::AdminRtResp => "ADMIN_RT_RESP",
            Label::AdminExit => "ADMIN_EXIT",
            Label::AdminExitOk => "ADMIN_EXIT_OK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "PING" => Label::Ping,
            "PONG" => Label::Pong,
            "FIND_NODE" => Label::FindNode,
            "FIND_NODE_RESP" => Label::FindNodeResp,
            "FIND_VALUE" => Label::FindValue,
            "FIND_VALUE_VAL" => Label::FindValueVal,
            "FIND_VALUE_CONT" => Label::FindValueCont,
            "STORE" => Label::Store,
            "STORE_ACK" => Label::StoreAck,
            "REFRESH" => Label::Refresh,
            "REFRESH_ACK" => Label::RefreshAck,
            "ADMIN_PUT" => Label::AdminPut,
            "ADMIN_PUT_RESP" => Label::AdminPutResp,
            "ADMIN_GET" => Label::AdminGet,
            "ADMIN_GET_VAL" => Label::AdminGetVal,
            "ADMIN_GET_NOTFOUND" => Label::AdminGetNotfound,
            "ADMIN_FORGET" => Label::AdminForget,
            "ADMIN_FORGET_OK" => Label::AdminForgetOk,
            "ADMIN_RT" => Label::AdminRt,
            "ADMIN_RT_RESP" => Label::AdminRtResp,
            "ADMIN_EXIT" => Label::AdminExit,
            "ADMIN_EXIT_OK" => Label::AdminExitOk,
            _ => return None,
        })
    }
}

/// A decoded or about-to-be-sent request/reply envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub rpc_id: Id,
    pub label: Label,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(rpc_id: Id, label: Label, payload: Vec<u8>) -> Self {
        Self {
            rpc_id,
            label,
            payload,
        }
    }

    /// Serialize into a single datagram.
    pub fn encode(&self) -> Vec<u8> {
        let label = self.label.as_str();
        let mut out = Vec::with_capacity(HEADER_FIXED_LEN + label.len() + self.payload.len());
        out.extend_from_slice(&self.rpc_id.0);
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a single datagram. Fails with `MalformedFrame` if fewer than
    /// `21 + L` bytes are present, per the framing spec.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_FIXED_LEN {
            return Err(Error::MalformedFrame);
        }
        let mut rpc_id = [0u8; ID_LEN];
        rpc_id.copy_from_slice(&buf[..ID_LEN]);
        let label_len = buf[ID_LEN] as usize;
        let label_start = HEADER_FIXED_LEN;
        let payload_start = label_start + label_len;
        if buf.len() < payload_start {
            return Err(Error::MalformedFrame);
        }
        let label_str = std::str::from_utf8(&buf[label_start..payload_start])
            .map_err(|_| Error::MalformedFrame)?;
        let label = Label::parse(label_str).ok_or(Error::MalformedFrame)?;
        Ok(Envelope {
            rpc_id: Id(rpc_id),
            label,
            payload: buf[payload_start..].to_vec(),
        })
    }
}

/// Largest value accepted by `STORE` before wire transmission.
pub const MAX_STORE_VALUE_LEN: usize = 65_535;

/// Encode a `STORE` payload: `20-byte key | 2-byte BE value length | value`.
pub fn encode_store_payload(key: &Id, value: &[u8]) -> Result<Vec<u8>> {
    if value.len() > MAX_STORE_VALUE_LEN {
        return Err(Error::PayloadTooLarge { len: value.len() });
    }
    let mut out = Vec::with_capacity(ID_LEN + 2 + value.len());
    out.extend_from_slice(&key.0);
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value);
    Ok(out)
}

/// Decode a `STORE` payload.
pub fn decode_store_payload(payload: &[u8]) -> Result<(Id, Vec<u8>)> {
    if payload.len() < ID_LEN + 2 {
        return Err(Error::MalformedPayload("STORE".into()));
    }
    let mut key = [0u8; ID_LEN];
    key.copy_from_slice(&payload[..ID_LEN]);
    let len = u16::from_be_bytes([payload[ID_LEN], payload[ID_LEN + 1]]) as usize;
    let value_start = ID_LEN + 2;
    if payload.len() < value_start + len {
        return Err(Error::MalformedPayload("STORE".into()));
    }
    Ok((Id(key), payload[value_start..value_start + len].to_vec()))
}

/// Encode the contact-list sub-codec: `2-byte BE count | records`, each
/// record `20-byte id | 1-byte addr-length | addr-bytes`.
pub fn encode_contacts(contacts: &[Contact]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(contacts.len() as u16).to_be_bytes());
    for c in contacts {
        out.extend_from_slice(&c.id.0);
        let addr_bytes = c.addr.as_bytes();
        out.push(addr_bytes.len() as u8);
        out.extend_from_slice(addr_bytes);
    }
    out
}

/// Decode a contact-list sub-codec payload.
pub fn decode_contacts(payload: &[u8]) -> Result<Vec<Contact>> {
    if payload.len() < 2 {
        return Err(Error::MalformedPayload("contact-list".into()));
    }
    let count = u16::from_be_bytes([payload[0], payload[1]]) as usize;
    let mut offset = 2;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        if payload.len() < offset + ID_LEN + 1 {
            return Err(Error::MalformedPayload("contact-list".into()));
        }
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&payload[offset..offset + ID_LEN]);
        offset += ID_LEN;
        let addr_len = payload[offset] as usize;
        offset += 1;
        if payload.len() < offset + addr_len {
            return Err(Error::MalformedPayload("contact-list".into()));
        }
        let addr = std::str::from_utf8(&payload[offset..offset + addr_len])
            .map_err(|_| Error::MalformedPayload("contact-list".into()))?
            .to_string();
        offset += addr_len;
        out.push(Contact::new(Id(id), addr));
    }
    Ok(out)
}

/// Encode an `ADMIN_GET` request payload: `20-byte key | 4-byte BE
/// remaining-timeout-ms`.
pub fn encode_admin_get_request(key: &Id, remaining_timeout_ms: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(ID_LEN + 4);
    out.extend_from_slice(&key.0);
    out.extend_from_slice(&remaining_timeout_ms.to_be_bytes());
    out
}

/// Decode an `ADMIN_GET` request payload.
pub fn decode_admin_get_request(payload: &[u8]) -> Result<(Id, u32)> {
    if payload.len() < ID_LEN + 4 {
        return Err(Error::MalformedPayload("ADMIN_GET".into()));
    }
    let mut key = [0u8; ID_LEN];
    key.copy_from_slice(&payload[..ID_LEN]);
    let ms = u32::from_be_bytes([
        payload[ID_LEN],
        payload[ID_LEN + 1],
        payload[ID_LEN + 2],
        payload[ID_LEN + 3],
    ]);
    Ok((Id(key), ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_id(seed: u8) -> Id {
        Id([seed; ID_LEN])
    }

    #[test]
    fn envelope_roundtrip_for_every_label() {
        let labels = [
            Label::Ping,
            Label::Pong,
            Label::FindNode,
            Label::FindNodeResp,
            Label::FindValue,
            Label::FindValueVal,
            Label::FindValueCont,
            Label::Store,
            Label::StoreAck,
            Label::Refresh,
            Label::RefreshAck,
            Label::AdminPut,
            Label::AdminPutResp,
            Label::AdminGet,
            Label::AdminGetVal,
            Label::AdminGetNotfound,
            Label::AdminForget,
            Label::AdminForgetOk,
            Label::AdminRt,
            Label::AdminRtResp,
            Label::AdminExit,
            Label::AdminExitOk,
        ];
        for label in labels {
            let env = Envelope::new(rpc_id(7), label, b"payload-bytes".to_vec());
            let encoded = env.encode();
            let decoded = Envelope::decode(&encoded).unwrap();
            assert_eq!(decoded.rpc_id, env.rpc_id);
            assert_eq!(decoded.label, env.label);
            assert_eq!(decoded.payload, env.payload);
        }
    }

    #[test]
    fn frames_shorter_than_21_bytes_fail() {
        let buf = vec![0u8; 20];
        assert!(matches!(Envelope::decode(&buf), Err(Error::MalformedFrame)));
    }

    #[test]
    fn frame_missing_label_bytes_fails() {
        let mut buf = vec![0u8; ID_LEN];
        buf.push(10); // claims a 10-byte label but supplies none
        assert!(matches!(Envelope::decode(&buf), Err(Error::MalformedFrame)));
    }

    #[test]
    fn store_payload_roundtrip() {
        let key = Id::random();
        let value = b"hello world".to_vec();
        let encoded = encode_store_payload(&key, &value).unwrap();
        let (decoded_key, decoded_value) = decode_store_payload(&encoded).unwrap();
        assert_eq!(decoded_key, key);
        assert_eq!(decoded_value, value);
    }

    #[test]
    fn store_payload_rejects_oversized_value() {
        let key = Id::random();
        let value = vec![0u8; MAX_STORE_VALUE_LEN + 1];
        assert!(matches!(
            encode_store_payload(&key, &value),
            Err(Error::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn contact_list_roundtrip() {
        let contacts = vec![
            Contact::new(Id::random(), "127.0.0.1:9000"),
            Contact::new(Id::random(), "10.0.0.1:9001"),
        ];
        let encoded = encode_contacts(&contacts);
        let decoded = decode_contacts(&encoded).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].id, contacts[0].id);
        assert_eq!(decoded[0].addr, contacts[0].addr);
        assert_eq!(decoded[1].addr, contacts[1].addr);
    }

    #[test]
    fn empty_contact_list_roundtrip() {
        let encoded = encode_contacts(&[]);
        let decoded = decode_contacts(&encoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn admin_get_request_roundtrip() {
        let key = Id::random();
        let encoded = encode_admin_get_request(&key, 1500);
        let (decoded_key, ms) = decode_admin_get_request(&encoded).unwrap();
        assert_eq!(decoded_key, key);
        assert_eq!(ms, 1500);
    }
}
