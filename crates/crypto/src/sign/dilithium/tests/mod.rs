use super::*;

#[test]
fn sign_verify_roundtrip() {
    let (pk, sk) = generate_keypair();
    let message = b"Test message for ML-DSA";
    let signature = sign(&sk, message);

    let scheme = MlDsaScheme;
    assert!(scheme.verify(&pk, message, &signature).is_ok());

    // Wrong message fails.
    assert!(scheme.verify(&pk, b"Wrong message", &signature).is_err());
}

#[test]
fn cross_key_verification_fails() {
    let (pk_a, sk_a) = generate_keypair();
    let (pk_b, _) = generate_keypair();
    let message = b"Cross key test";
    let signature = sign(&sk_a, message);

    let scheme = MlDsaScheme;
    assert!(scheme.verify(&pk_a, message, &signature).is_ok());
    assert!(scheme.verify(&pk_b, message, &signature).is_err());
}

#[test]
fn wrong_key_size_detection() {
    let scheme = MlDsaScheme;
    let invalid_pk = vec![0u8; 1000];
    assert!(matches!(
        scheme.verify(&invalid_pk, b"msg", &[0u8; 64]),
        Err(CryptoError::InvalidKey(_))
    ));
}

#[test]
fn truncated_signature_detected() {
    let (pk, sk) = generate_keypair();
    let message = b"Truncation test";
    let mut signature = sign(&sk, message);
    signature.truncate(signature.len() / 2);

    let scheme = MlDsaScheme;
    assert!(scheme.verify(&pk, message, &signature).is_err());
}
