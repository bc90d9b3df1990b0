// SPDX-License-Identifier: Apache-2.0 OR MIT

//! 160-bit node/key identifiers and the XOR distance metric.

use std::cmp::Ordering;
use std::fmt;

/// Width of a Kademlia identifier, in bytes (160 bits).
pub const ID_LEN: usize = 20;

/// An opaque 160-bit identifier, compared byte-wise big-endian.
///
/// Used both for node ids and for content-addressed keys (`SHA1(value)`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(pub [u8; ID_LEN]);

impl Id {
    pub const ZERO: Id = Id([0u8; ID_LEN]);

    /// Generate a random identifier (used to assign a node its own id).
    pub fn random() -> Self {
        let mut bytes = [0u8; ID_LEN];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Id(bytes)
    }

    /// Hash arbitrary bytes into a content-addressed key via SHA-1.
    pub fn content_hash(bytes: &[u8]) -> Self {
        use sha1::{Digest, Sha1};
        let digest = Sha1::digest(bytes);
        let mut out = [0u8; ID_LEN];
        out.copy_from_slice(&digest);
        Id(out)
    }

    /// XOR distance to another identifier, as an unsigned 160-bit integer
    /// (represented the same way as an id: big-endian bytes).
    pub fn distance(&self, other: &Id) -> Distance {
        let mut out = [0u8; ID_LEN];
        for i in 0..ID_LEN {
            out[i] = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }

    /// Number of leading bits `self` and `other` share (used for bucket depth).
    pub fn shared_prefix_len(&self, other: &Id) -> u32 {
        for i in 0..ID_LEN {
            let x = self.0[i] ^ other.0[i];
            if x != 0 {
                return (i as u32) * 8 + x.leading_zeros();
            }
        }
        (ID_LEN as u32) * 8
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != ID_LEN * 2 {
            return None;
        }
        let mut out = [0u8; ID_LEN];
        for i in 0..ID_LEN {
            out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Id(out))
    }

    /// Add one to this identifier, wrapping modulo 2^160 (used when splitting
    /// a bucket range: the right child's lower bound is `mid + 1`).
    pub fn add_one(&self) -> Id {
        let mut out = self.0;
        let mut carry: u16 = 1;
        for i in (0..ID_LEN).rev() {
            let sum = out[i] as u16 + carry;
            out[i] = (sum & 0xff) as u8;
            carry = sum >> 8;
            if carry == 0 {
                break;
            }
        }
        Id(out)
    }

    /// `lower + floor((upper - lower) / 2)`, computed as big-endian 160-bit
    /// arithmetic (subtract, shift right by one, add back) rather than
    /// averaging byte-by-byte, which would be wrong across borrows.
    pub fn midpoint(lower: &Id, upper: &Id) -> Id {
        let diff = sub(&upper.0, &lower.0);
        let half = shr1(&diff);
        Id(add(&lower.0, &half))
    }
}

impl PartialOrd for Id {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Id {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({}..)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// XOR distance between two identifiers, ordered as an unsigned integer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Distance(pub [u8; ID_LEN]);

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex: String = self.0.iter().map(|b| format!("{:02x}", b)).collect();
        write!(f, "Distance({}..)", &hex[..8])
    }
}

fn sub(a: &[u8; ID_LEN], b: &[u8; ID_LEN]) -> [u8; ID_LEN] {
    let mut out = [0u8; ID_LEN];
    let mut borrow: i16 = 0;
    for i in (0..ID_LEN).rev() {
        let ai = a[i] as i16;
        let bi = b[i] as i16;
        let mut v = ai - bi - borrow;
        if v < 0 {
            v += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out[i] = v as u8;
    }
    out
}

fn add(a: &[u8; ID_LEN], b: &[u8; ID_LEN]) -> [u8; ID_LEN] {
    let mut out = [0u8; ID_LEN];
    let mut carry: u16 = 0;
    for i in (0..ID_LEN).rev() {
        let sum = a[i] as u16 + b[i] as u16 + carry;
        out[i] = (sum & 0xff) as u8;
        carry = sum >> 8;
    }
    out
}

fn shr1(x: &[u8; ID_LEN]) -> [u8; ID_LEN] {
    let mut out = [0u8; ID_LEN];
    let mut carry: u8 = 0;
    for i in 0..ID_LEN {
        let v = ((carry as u16) << 8) | x[i] as u16;
        out[i] = (v >> 1) as u8;
        carry = (v & 1) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_ordering_matches_xor() {
        let a = Id([0u8; ID_LEN]);
        let b = Id([0xff; ID_LEN]);
        let c = {
            let mut bytes = [0u8; ID_LEN];
            bytes[19] = 1;
            Id(bytes)
        };
        // a is farther from b than c is from b (c differs from b only in the last bit)
        assert!(b.distance(&a) > b.distance(&c));
    }

    #[test]
    fn content_hash_matches_known_vector() {
        let key = Id::content_hash(b"hello world");
        assert_eq!(key.to_hex(), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[test]
    fn hex_roundtrip() {
        let id = Id::random();
        let hex = id.to_hex();
        assert_eq!(Id::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn rejects_bad_hex_length() {
        assert!(Id::from_hex("abcd").is_none());
    }

    #[test]
    fn midpoint_of_full_range_has_msb_clear() {
        let lower = Id([0u8; ID_LEN]);
        let upper = Id([0xff; ID_LEN]);
        let mid = Id::midpoint(&lower, &upper);
        // (0xff...ff - 0) / 2 = 0x7f..ff
        assert_eq!(mid.0[0], 0x7f);
        assert_eq!(mid.0[19], 0xff);
    }

    #[test]
    fn midpoint_example_from_spec() {
        // self_id = 0x80...0, range [0x80...00, 0x80...FF]
        let mut lower = [0u8; ID_LEN];
        lower[0] = 0x80;
        let mut upper = [0u8; ID_LEN];
        upper[0] = 0x80;
        upper[19] = 0xff;
        let mid = Id::midpoint(&Id(lower), &Id(upper));
        assert_eq!(mid.0[0], 0x80);
        assert_eq!(mid.0[19], 0x7f);
    }

    #[test]
    fn add_one_wraps_across_byte_boundary() {
        let mut bytes = [0u8; ID_LEN];
        bytes[19] = 0xff;
        let id = Id(bytes);
        let next = id.add_one();
        assert_eq!(next.0[19], 0x00);
        assert_eq!(next.0[18], 0x01);
    }

    #[test]
    fn shared_prefix_len_full_match() {
        let a = Id::random();
        assert_eq!(a.shared_prefix_len(&a), 160);
    }

    #[test]
    fn shared_prefix_len_differs_at_first_bit() {
        let a = Id([0u8; ID_LEN]);
        let mut bytes = [0u8; ID_LEN];
        bytes[0] = 0x80;
        let b = Id(bytes);
        assert_eq!(a.shared_prefix_len(&b), 0);
    }
}
