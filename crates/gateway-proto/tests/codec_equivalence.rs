//! Binary and text framings of the same encrypted address must decode to the
//! same destination.

use bytes::BytesMut;
use gateway_cipher::{encrypt, encrypt_base64, AddressCipher, Aes256CbcCipher, SharedSecret};
use gateway_proto::{BufferedReader, Frame, DEFAULT_READ_BUFFER_SIZE};

async fn decode(wire: &[u8], cipher: &Aes256CbcCipher) -> Vec<u8> {
    let mut input = wire;
    let mut buf = BytesMut::new();
    let mut reader = BufferedReader::new(&mut input, &mut buf, DEFAULT_READ_BUFFER_SIZE);
    match Frame::read_from(&mut reader).await.unwrap() {
        Frame::Binary(ciphertext) => cipher.decrypt(&ciphertext).unwrap(),
        Frame::Text(line) => cipher.decrypt_base64(&line).unwrap(),
    }
}

#[tokio::test]
async fn binary_and_text_decode_to_same_address() {
    let secret = SharedSecret::new("codec-equivalence").unwrap();
    let cipher = Aes256CbcCipher::new(secret.clone());

    for addr in ["127.0.0.1:80", "backend-7.svc.cluster.local:6379", "[fd00::1]:443"] {
        let binary = Frame::binary(encrypt(&secret, addr.as_bytes())).unwrap();
        let text = Frame::text(encrypt_base64(&secret, addr.as_bytes())).unwrap();

        let from_binary = decode(&binary.encode().unwrap(), &cipher).await;
        let from_text = decode(&text.encode().unwrap(), &cipher).await;

        assert_eq!(from_binary, addr.as_bytes());
        assert_eq!(from_binary, from_text);
    }
}

#[tokio::test]
async fn text_frame_never_starts_with_binary_marker() {
    let secret = SharedSecret::new("codec-equivalence").unwrap();
    // Base64 alphabet never produces a NUL byte
    for _ in 0..32 {
        let line = encrypt_base64(&secret, b"10.1.2.3:8000");
        assert!(Frame::text(line).is_ok());
    }
}
