use bytes::Bytes;

/// Elliptic curves, identified on the wire by their DER encoded OID (without tag and length).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum EccCurve {
    Curve25519,
    Ed25519,
    P256,
    P384,
    P521,
    BrainpoolP256r1,
    BrainpoolP384r1,
    BrainpoolP512r1,
    Secp256k1,
    Unknown(Bytes),
}

const OIDS: [(&[u8], EccCurve); 9] = [
    (&[0x2B, 0x06, 0x01, 0x04, 0x01, 0x97, 0x55, 0x01, 0x05, 0x01], EccCurve::Curve25519),
    (&[0x2B, 0x06, 0x01, 0x04, 0x01, 0xDA, 0x47, 0x0F, 0x01], EccCurve::Ed25519),
    (&[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07], EccCurve::P256),
    (&[0x2B, 0x81, 0x04, 0x00, 0x22], EccCurve::P384),
    (&[0x2B, 0x81, 0x04, 0x00, 0x23], EccCurve::P521),
    (&[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x07], EccCurve::BrainpoolP256r1),
    (&[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x0B], EccCurve::BrainpoolP384r1),
    (&[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x0D], EccCurve::BrainpoolP512r1),
    (&[0x2B, 0x81, 0x04, 0x00, 0x0A], EccCurve::Secp256k1),
];

impl EccCurve {
    /// Standard name
    pub fn name(&self) -> &str {
        match self {
            EccCurve::Curve25519 => "Curve25519",
            EccCurve::Ed25519 => "Ed25519",
            EccCurve::P256 => "NIST P-256",
            EccCurve::P384 => "NIST P-384",
            EccCurve::P521 => "NIST P-521",
            EccCurve::BrainpoolP256r1 => "brainpoolP256r1",
            EccCurve::BrainpoolP384r1 => "brainpoolP384r1",
            EccCurve::BrainpoolP512r1 => "brainpoolP512r1",
            EccCurve::Secp256k1 => "secp256k1",
            EccCurve::Unknown(_) => "unknown",
        }
    }

    /// Encoded OID bytes.
    pub fn oid(&self) -> &[u8] {
        if let EccCurve::Unknown(oid) = self {
            return oid;
        }
        OIDS.iter()
            .find(|(_, curve)| curve == self)
            .map(|(oid, _)| *oid)
            .unwrap_or_default()
    }

    pub fn from_oid(oid: &[u8]) -> Self {
        OIDS.iter()
            .find(|(known, _)| *known == oid)
            .map(|(_, curve)| curve.clone())
            .unwrap_or_else(|| EccCurve::Unknown(Bytes::copy_from_slice(oid)))
    }

    /// Size of a secret scalar in bytes.
    pub fn secret_key_len(&self) -> Option<usize> {
        match self {
            EccCurve::Curve25519 | EccCurve::Ed25519 => Some(32),
            EccCurve::P256 | EccCurve::BrainpoolP256r1 | EccCurve::Secp256k1 => Some(32),
            EccCurve::P384 | EccCurve::BrainpoolP384r1 => Some(48),
            EccCurve::P521 => Some(66),
            EccCurve::BrainpoolP512r1 => Some(64),
            EccCurve::Unknown(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_roundtrip() {
        for (oid, curve) in OIDS.iter() {
            assert_eq!(&EccCurve::from_oid(oid), curve);
            assert_eq!(curve.oid(), *oid);
        }
        let unknown = EccCurve::from_oid(&[1, 2, 3]);
        assert_eq!(unknown, EccCurve::Unknown(Bytes::from_static(&[1, 2, 3])));
        assert_eq!(unknown.oid(), &[1, 2, 3]);
    }
}
