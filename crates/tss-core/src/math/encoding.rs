//! Hex codecs, Keccak-256 and address derivation

use crate::{Error, Result};
use elliptic_curve::{
    bigint::U256,
    ops::Reduce,
    sec1::{FromEncodedPoint, ToEncodedPoint},
};
use k256::{AffinePoint, EncodedPoint, ProjectivePoint, Scalar};
use tiny_keccak::{Hasher, Keccak};
use zeroize::Zeroizing;

/// Length of a compressed point in hex digits
pub const POINT_HEX_LEN: usize = 66;

/// Keccak-256 over the concatenation of `parts`
pub fn keccak256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Interpret 32 big-endian bytes as a scalar, reduced mod n
pub fn scalar_from_bytes(bytes: &[u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(&(*bytes).into())
}

/// `0x` + 64 lowercase hex digits
pub fn scalar_to_hex(scalar: &Scalar) -> String {
    let bytes: Zeroizing<[u8; 32]> = Zeroizing::new(scalar.to_bytes().into());
    format!("0x{}", hex::encode(bytes.as_slice()))
}

/// Parse `0x` + 64 hex digits; the value is reduced mod n
pub fn scalar_from_hex(s: &str) -> Result<Scalar> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| Error::InvalidScalar("missing 0x prefix".into()))?;
    if digits.len() != 64 {
        return Err(Error::InvalidScalar(format!(
            "expected 64 hex digits, got {}",
            digits.len()
        )));
    }
    let mut bytes = Zeroizing::new([0u8; 32]);
    hex::decode_to_slice(digits, bytes.as_mut_slice())
        .map_err(|e| Error::InvalidScalar(e.to_string()))?;
    Ok(scalar_from_bytes(&bytes))
}

/// SEC1 compressed encoding (33 bytes)
pub fn point_to_bytes(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

/// Compressed point as 66 lowercase hex digits, no prefix
pub fn point_to_hex(point: &ProjectivePoint) -> String {
    hex::encode(point_to_bytes(point))
}

/// Parse a compressed point, rejecting anything not on the curve
pub fn point_from_hex(s: &str) -> Result<ProjectivePoint> {
    if s.len() != POINT_HEX_LEN {
        return Err(Error::InvalidPoint(format!(
            "expected {} hex digits, got {}",
            POINT_HEX_LEN,
            s.len()
        )));
    }
    let bytes = hex::decode(s).map_err(|e| Error::InvalidPoint(e.to_string()))?;
    point_from_bytes(&bytes)
}

/// Parse a SEC1 encoded point
pub fn point_from_bytes(bytes: &[u8]) -> Result<ProjectivePoint> {
    let encoded =
        EncodedPoint::from_bytes(bytes).map_err(|e| Error::InvalidPoint(e.to_string()))?;
    Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .map(ProjectivePoint::from)
        .ok_or_else(|| Error::InvalidPoint("not on the curve".into()))
}

/// Last 20 bytes of Keccak-256 over the uncompressed X || Y coordinates
pub fn address_bytes(point: &ProjectivePoint) -> [u8; 20] {
    let uncompressed = point.to_affine().to_encoded_point(false);
    let coordinates = uncompressed.as_bytes().get(1..).unwrap_or_default();
    let digest = keccak256(&[coordinates]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    out
}

/// EIP-55 checksummed address of a public key
pub fn pub_to_address(point: &ProjectivePoint) -> String {
    let lower = hex::encode(address_bytes(point));
    let checksum = keccak256(&[lower.as_bytes()]);

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            checksum[i / 2] >> 4
        } else {
            checksum[i / 2] & 0x0f
        };
        if nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a `0x` + 40 hex digit address, in any letter case
pub fn address_from_hex(s: &str) -> Result<[u8; 20]> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| Error::Deserialization(format!("address {:?} lacks 0x prefix", s)))?;
    let mut out = [0u8; 20];
    hex::decode_to_slice(digits, &mut out)
        .map_err(|e| Error::Deserialization(format!("address {:?}: {}", s, e)))?;
    Ok(out)
}

/// Serde helpers for scalars encoded as `0x` hex
pub mod hex_scalar {
    use k256::Scalar;
    use serde::{Deserialize, Deserializer, Serializer};
    use zeroize::Zeroizing;

    pub fn serialize<S: Serializer>(scalar: &Scalar, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = Zeroizing::new(super::scalar_to_hex(scalar));
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Scalar, D::Error> {
        let encoded = Zeroizing::new(String::deserialize(deserializer)?);
        super::scalar_from_hex(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Serde helpers for compressed points
pub mod hex_point {
    use k256::ProjectivePoint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        point: &ProjectivePoint,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::point_to_hex(point))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<ProjectivePoint, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        super::point_from_hex(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Serde helpers for vectors of compressed points
pub mod hex_points {
    use k256::ProjectivePoint;
    use serde::{ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        points: &[ProjectivePoint],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(points.len()))?;
        for point in points {
            seq.serialize_element(&super::point_to_hex(point))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<ProjectivePoint>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|p| super::point_from_hex(p).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_encoding() {
        let g = ProjectivePoint::GENERATOR;
        assert_eq!(
            point_to_hex(&g),
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
        assert_eq!(point_from_hex(&point_to_hex(&g)).unwrap(), g);
    }

    #[test]
    fn test_point_rejects_off_curve() {
        // x = 5 has no matching y on secp256k1
        let off_curve = format!("02{:0>64}", "5");
        assert!(matches!(
            point_from_hex(&off_curve),
            Err(Error::InvalidPoint(_))
        ));
        assert!(point_from_hex("02abcd").is_err());
        assert!(point_from_hex(&"zz".repeat(33)).is_err());
    }

    #[test]
    fn test_scalar_hex() {
        let s = Scalar::from(255u64);
        let encoded = scalar_to_hex(&s);
        assert_eq!(encoded, format!("0x{:0>64}", "ff"));
        assert_eq!(scalar_from_hex(&encoded).unwrap(), s);

        assert!(scalar_from_hex(&format!("{:0>64}", "ff")).is_err());
        assert!(scalar_from_hex("0xff").is_err());
    }

    #[test]
    fn test_scalar_hex_reduces_mod_n() {
        // n + 1
        let above_order = "0xfffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364142";
        assert_eq!(scalar_from_hex(above_order).unwrap(), Scalar::ONE);
    }

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            hex::encode(keccak256(&[])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_address_of_generator() {
        // private key 1
        assert_eq!(
            pub_to_address(&ProjectivePoint::GENERATOR),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn test_address_from_hex() {
        let checksummed = pub_to_address(&ProjectivePoint::GENERATOR);
        let bytes = address_from_hex(&checksummed).unwrap();
        assert_eq!(bytes, address_bytes(&ProjectivePoint::GENERATOR));
        assert_eq!(address_from_hex(&checksummed.to_lowercase()).unwrap(), bytes);

        assert!(matches!(
            address_from_hex("7E5F4552091A69125d5DfCb7b8C2659029395Bdf"),
            Err(Error::Deserialization(_))
        ));
        assert!(address_from_hex("0x7E5F45").is_err());
    }
}
