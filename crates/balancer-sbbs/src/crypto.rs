use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{ProjectivePoint, Scalar};
use k256::elliptic_curve::PrimeField;

/// Returns true iff `sbbs_address` ends with the hex encoding of the
/// secp256k1 public point derived from `private_hex` (scalar multiplication
/// of the generator). This is the cryptographic proof-of-possession check
/// gating subscribe/unsubscribe requests.
pub fn keys_match(sbbs_address: &str, private_hex: &str) -> bool {
    let Ok(private_bytes) = hex::decode(private_hex) else { return false };
    let mut padded = [0u8; 32];
    if private_bytes.len() > 32 {
        return false;
    }
    padded[32 - private_bytes.len()..].copy_from_slice(&private_bytes);

    let scalar_repr: k256::FieldBytes = padded.into();
    let scalar = match Option::<Scalar>::from(Scalar::from_repr(scalar_repr)) {
        Some(s) => s,
        None => return false,
    };

    let public_point = ProjectivePoint::GENERATOR * scalar;
    let encoded = public_point.to_affine().to_encoded_point(false);
    let public_hex = hex::encode(encoded.as_bytes());

    sbbs_address.to_lowercase().ends_with(&public_hex)
}

/// Generates a fresh VAPID keypair, base64-encoded, for operators to paste
/// into configuration. Mirrors the original `printNewVAPIDKeys` utility.
pub fn generate_vapid_keypair() -> (String, String) {
    use k256::ecdsa::SigningKey;
    use base64::Engine;

    let signing_key = SigningKey::random(&mut rand_core::OsRng);
    let verifying_key = signing_key.verifying_key();
    let public_encoded = verifying_key.to_encoded_point(false);

    let private_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(signing_key.to_bytes());
    let public_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(public_encoded.as_bytes());
    (public_b64, private_b64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keypair_round_trips_through_base64() {
        let (public, private) = generate_vapid_keypair();
        assert!(!public.is_empty());
        assert!(!private.is_empty());
    }

    #[test]
    fn mismatched_key_fails() {
        assert!(!keys_match("deadbeef", "00"));
    }
}
