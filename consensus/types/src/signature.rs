//! Opaque signature and public key types.
//!
//! The pipeline never performs BLS arithmetic itself; validity is decided by an external
//! batch verifier. These types only carry bytes and equality.

use ssz::{Decode, DecodeError, Encode};
use std::fmt;

pub const PUBLIC_KEY_BYTES_LEN: usize = 48;
pub const SIGNATURE_BYTES_LEN: usize = 96;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_BYTES_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_BYTES_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_BYTES_LEN] {
        &self.0
    }
}

impl Default for PublicKey {
    fn default() -> Self {
        Self([0; PUBLIC_KEY_BYTES_LEN])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[0..4]))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_BYTES_LEN]);

impl Signature {
    pub fn empty() -> Self {
        Self([0; SIGNATURE_BYTES_LEN])
    }

    pub fn from_bytes(bytes: [u8; SIGNATURE_BYTES_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_BYTES_LEN] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[0..4]))
    }
}

macro_rules! impl_ssz_fixed_bytes {
    ($type: ident, $len: expr) => {
        impl Encode for $type {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $len
            }

            fn ssz_bytes_len(&self) -> usize {
                $len
            }

            fn ssz_append(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.0)
            }
        }

        impl Decode for $type {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $len
            }

            fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
                if bytes.len() != $len {
                    return Err(DecodeError::InvalidByteLength {
                        len: bytes.len(),
                        expected: $len,
                    });
                }
                let mut fixed = [0; $len];
                fixed.copy_from_slice(bytes);
                Ok($type(fixed))
            }
        }
    };
}

impl_ssz_fixed_bytes!(PublicKey, PUBLIC_KEY_BYTES_LEN);
impl_ssz_fixed_bytes!(Signature, SIGNATURE_BYTES_LEN);
