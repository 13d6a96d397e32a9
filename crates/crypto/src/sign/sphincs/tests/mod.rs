use super::*;

#[test]
fn sign_verify_roundtrip() {
    let (pk, sk) = generate_keypair();
    let message = b"Test message for SPHINCS+";
    let signature = sign(&sk, message);

    let scheme = SphincsScheme;
    assert!(scheme.verify(&pk, message, &signature).is_ok());
    assert!(scheme.verify(&pk, b"Wrong message", &signature).is_err());
}

#[test]
fn wrong_key_size_detection() {
    let scheme = SphincsScheme;
    let invalid_pk = vec![0u8; 5];
    assert!(matches!(
        scheme.verify(&invalid_pk, b"msg", &[0u8; 64]),
        Err(CryptoError::InvalidKey(_))
    ));
}
