use crate::storage::types::AttributeValue;
use smallvec::SmallVec;

/// Order-preserving byte form of a primary-key value. Tables are kept sorted by
/// this encoding, which is also the order scans walk in.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EncodedKey {
    bytes: SmallVec<[u8; 32]>,
}

impl EncodedKey {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn from_value(value: &AttributeValue) -> Self {
        let mut out = SmallVec::<[u8; 32]>::new();
        encode_value(value, &mut out);
        Self { bytes: out }
    }
}

fn encode_value(v: &AttributeValue, out: &mut SmallVec<[u8; 32]>) {
    match v {
        AttributeValue::N(i) => {
            out.push(0x10);
            let shifted = (*i as u64) ^ 0x8000_0000_0000_0000;
            out.extend_from_slice(&shifted.to_be_bytes());
        }
        AttributeValue::S(s) => {
            out.push(0x14);
            append_escaped(s.as_bytes(), out);
        }
        AttributeValue::Bool(b) => {
            out.push(0x16);
            out.push(u8::from(*b));
        }
        AttributeValue::B(b) => {
            out.push(0x18);
            append_escaped(b, out);
        }
    }
}

fn append_escaped(bytes: &[u8], out: &mut SmallVec<[u8; 32]>) {
    for byte in bytes {
        if *byte == 0 {
            // Escape interior nulls so the terminator remains unambiguous.
            out.extend_from_slice(&[0x00, 0xFF]);
        } else {
            out.push(*byte);
        }
    }
    out.push(0x00);
}
