//! Compressed BLS byte containers and the signature verifier seam.
//!
//! The transition never decompresses keys itself: every check goes through a
//! [`SignatureVerifier`], so the cryptographic backend can be swapped out (or stubbed in tests).

use crate::signing_data::SigningData;
use crate::Hash256;
use serde::de::{Deserialize, Deserializer, Error as _};
use serde::ser::{Serialize, Serializer};
use ssz::{Decode, DecodeError, Encode};
use std::fmt;
use tree_hash::TreeHash;

pub const PUBLIC_KEY_BYTES_LEN: usize = 48;
pub const SIGNATURE_BYTES_LEN: usize = 96;
pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Whether signatures are checked during block processing.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum VerifySignatures {
    True,
    False,
}

impl VerifySignatures {
    pub fn is_true(self) -> bool {
        self == Self::True
    }
}

/// Black-box signature backend.
pub trait SignatureVerifier {
    /// Returns `true` if `signature` is valid for `message_root` under `domain`.
    ///
    /// `pubkey` may be a single key or the output of [`SignatureVerifier::aggregate`].
    fn verify(
        &self,
        pubkey: &PublicKeyBytes,
        message_root: Hash256,
        signature: &SignatureBytes,
        domain: Hash256,
    ) -> bool;

    /// Aggregates `pubkeys` into one key, `None` if any key is invalid or the slice is empty.
    fn aggregate(&self, pubkeys: &[PublicKeyBytes]) -> Option<PublicKeyBytes>;
}

/// The root that actually gets signed for `message_root` under `domain`.
pub fn compute_signing_root(message_root: Hash256, domain: Hash256) -> Hash256 {
    SigningData { object_root: message_root, domain }.tree_hash_root()
}

macro_rules! bytes_struct {
    ($name: ident, $len: expr, $doc: expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const fn empty() -> Self {
                Self([0; $len])
            }

            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_serialized(&self) -> &[u8] {
                &self.0
            }

            pub const fn serialize(&self) -> [u8; $len] {
                self.0
            }

            /// Instantiates `Self` from bytes. Only the byte-length is checked.
            pub fn deserialize(bytes: &[u8]) -> Result<Self, DecodeError> {
                let array = <[u8; $len]>::try_from(bytes).map_err(|_| {
                    DecodeError::InvalidByteLength { len: bytes.len(), expected: $len }
                })?;
                Ok(Self(array))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::empty()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", serde_utils::hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }

        impl Encode for $name {
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

        impl Decode for $name {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $len
            }

            fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
                Self::deserialize(bytes)
            }
        }

        impl TreeHash for $name {
            fn tree_hash_type() -> tree_hash::TreeHashType {
                tree_hash::TreeHashType::Vector
            }

            fn tree_hash_packed_encoding(&self) -> tree_hash::PackedEncoding {
                unreachable!("Vector should never be packed.")
            }

            fn tree_hash_packing_factor() -> usize {
                unreachable!("Vector should never be packed.")
            }

            fn tree_hash_root(&self) -> Hash256 {
                let minimum_chunk_count = $len.div_ceil(tree_hash::BYTES_PER_CHUNK);
                tree_hash::merkle_root(&self.0, minimum_chunk_count)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&serde_utils::hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let string = String::deserialize(deserializer)?;
                let bytes = serde_utils::hex::decode(&string).map_err(D::Error::custom)?;
                Self::from_ssz_bytes(&bytes).map_err(|e| D::Error::custom(format!("{e:?}")))
            }
        }
    };
}

bytes_struct!(PublicKeyBytes, PUBLIC_KEY_BYTES_LEN, "A compressed BLS public key, not validated.");
bytes_struct!(SignatureBytes, SIGNATURE_BYTES_LEN, "A compressed BLS signature, not validated.");

#[cfg(feature = "blst")]
pub use self::blst_verifier::BlstVerifier;

#[cfg(feature = "blst")]
mod blst_verifier {
    use super::*;
    use blst::min_pk::{AggregatePublicKey, PublicKey, Signature};
    use blst::BLST_ERROR as BlstError;

    /// [`SignatureVerifier`] backed by the `blst` library.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct BlstVerifier;

    impl SignatureVerifier for BlstVerifier {
        fn verify(
            &self,
            pubkey: &PublicKeyBytes,
            message_root: Hash256,
            signature: &SignatureBytes,
            domain: Hash256,
        ) -> bool {
            let Ok(pubkey) = PublicKey::key_validate(pubkey.as_serialized()) else {
                return false
            };
            let Ok(signature) = Signature::from_bytes(signature.as_serialized()) else {
                return false
            };
            let signing_root = compute_signing_root(message_root, domain);
            signature.verify(true, signing_root.as_slice(), DST, &[], &pubkey, false) ==
                BlstError::BLST_SUCCESS
        }

        fn aggregate(&self, pubkeys: &[PublicKeyBytes]) -> Option<PublicKeyBytes> {
            let points = pubkeys
                .iter()
                .map(|pubkey| PublicKey::key_validate(pubkey.as_serialized()).ok())
                .collect::<Option<Vec<_>>>()?;
            let refs = points.iter().collect::<Vec<_>>();
            let aggregate = AggregatePublicKey::aggregate(&refs, false).ok()?;
            Some(PublicKeyBytes::from_bytes(aggregate.to_public_key().compress()))
        }
    }

}
