//! End-to-end handshake tests driving a simulated client against the real
//! service framing.

use num_bigint::BigUint;
use rc4::consts::U7;
use rc4::{KeyInit, Rc4, StreamCipher};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use shardfish_server::net::crypt::{
    calc_public_key, derive_shared_key, establish, CryptKeys, CRYPT_BASE_AUTH,
};

fn fixture_keys() -> CryptKeys {
    let mut n = [0u8; 64];
    let mut k = [0u8; 64];
    for i in 0..64 {
        n[i] = (i as u8).wrapping_mul(17).wrapping_add(3);
        k[i] = (i as u8).wrapping_mul(29).wrapping_add(7);
    }
    // Keep the modulus positive and odd.
    n[0] |= 0x80;
    n[63] |= 1;
    CryptKeys { n, k }
}

/// Client-side derivation: pick a secret b, compute Y = X^b mod N, then the
/// shared low bytes from X... the server never learns b.
fn client_side(keys: &CryptKeys, b: &BigUint) -> ([u8; 64], Vec<u8>) {
    let n = BigUint::from_bytes_be(&keys.n);
    let x = BigUint::from_bytes_be(&calc_public_key(keys, CRYPT_BASE_AUTH));
    let g = BigUint::from(CRYPT_BASE_AUTH);

    // Y = g^b mod N goes on the wire; the client's shared secret is X^b.
    let y = g.modpow(b, &n);
    let mut y_wire = [0u8; 64];
    let y_le = y.to_bytes_le();
    y_wire[..y_le.len()].copy_from_slice(&y_le);

    let mut shared_le = x.modpow(b, &n).to_bytes_le();
    shared_le.resize(7, 0);
    (y_wire, shared_le)
}

#[tokio::test]
async fn full_key_agreement_matches_both_sides() {
    let keys = fixture_keys();
    let b = BigUint::from(0x1234_5678_9ABC_DEFu64);
    let (y_wire, client_shared) = client_side(&keys, &b);

    // Server derivation with a fixed seed must equal client XOR seed.
    let seed = [11u8, 22, 33, 44, 55, 66, 77];
    let server_key = derive_shared_key(&keys, &y_wire, &seed);
    for i in 0..7 {
        assert_eq!(server_key[i], client_shared[i] ^ seed[i]);
    }
}

#[tokio::test]
async fn handshake_over_socket_pair() {
    let keys = fixture_keys();
    let server_keys = keys.clone();
    let (mut client, server) = tokio::io::duplex(4096);

    let server_task = tokio::spawn(async move {
        let (read, write) = tokio::io::split(server);
        establish(read, write, &server_keys).await
    });

    let b = BigUint::from(0xFEED_F00D_u32);
    let (y_wire, client_shared) = client_side(&keys, &b);

    let mut connect = vec![0u8, 66];
    connect.extend_from_slice(&y_wire);
    client.write_all(&connect).await.unwrap();

    let mut reply = [0u8; 9];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0);
    assert_eq!(reply[1], 9);

    let mut key = [0u8; 7];
    for i in 0..7 {
        key[i] = client_shared[i] ^ reply[2 + i];
    }

    let (_server_read, mut server_write) = server_task.await.unwrap().unwrap();

    // Whatever the server encrypts, the client's stream decrypts.
    server_write.send(b"The Great Tree of Possibilities").await.unwrap();
    let mut wire = [0u8; 31];
    client.read_exact(&mut wire).await.unwrap();
    let mut cipher = Rc4::<U7>::new(rc4::Key::<U7>::from_slice(&key));
    cipher.apply_keystream(&mut wire);
    assert_eq!(&wire, b"The Great Tree of Possibilities");
}

#[tokio::test]
async fn bad_connect_message_is_a_protocol_error() {
    let keys = fixture_keys();
    let (mut client, server) = tokio::io::duplex(256);

    let server_task = tokio::spawn(async move {
        let (read, write) = tokio::io::split(server);
        establish(read, write, &keys).await
    });

    // msg_size 17 is neither plaintext (2) nor keyed (66).
    client.write_all(&[0u8, 17]).await.unwrap();
    assert!(server_task.await.unwrap().is_err());
}
