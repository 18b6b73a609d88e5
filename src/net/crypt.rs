//! The bespoke encryption handshake and RC4 transport.
//!
//! Key agreement follows the legacy client: the server is provisioned with a
//! 512-bit modulus `N` and private exponent `K` per service, the client holds
//! `X = g^K mod N` (little-endian on disk, big-endian for the math). On
//! connect the client submits a 64-byte `Y`; both sides derive the low seven
//! bytes of `Y^K mod N` and XOR them with a random 7-byte server seed to form
//! the RC4 key. Outbound and inbound keystreams are independent.

use rand::RngCore;
use rc4::consts::U7;
use rc4::{KeyInit, Rc4, StreamCipher};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use num_bigint::BigUint;

use crate::errors::{NetError, NetResult};

/// `g` values fixed by the client build.
pub const CRYPT_BASE_AUTH: u32 = 41;
pub const CRYPT_BASE_GAME: u32 = 73;
pub const CRYPT_BASE_GATE: u32 = 4;

const CLI_TO_SERV_CONNECT: u8 = 0;
const SERV_TO_CLI_ENCRYPT: u8 = 0;

/// One service's key pair, stored as big-endian integer bytes.
#[derive(Clone)]
pub struct CryptKeys {
    pub n: [u8; 64],
    pub k: [u8; 64],
}

impl std::fmt::Debug for CryptKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptKeys").finish_non_exhaustive()
    }
}

/// `X = base ^ K mod N`, as big-endian bytes. This is what gets handed to
/// clients (byte-reversed) when provisioning a shard.
pub fn calc_public_key(keys: &CryptKeys, base: u32) -> [u8; 64] {
    let n = BigUint::from_bytes_be(&keys.n);
    let k = BigUint::from_bytes_be(&keys.k);
    let x = BigUint::from(base).modpow(&k, &n);
    let mut out = [0u8; 64];
    let bytes = x.to_bytes_be();
    out[64 - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// Derive the 7-byte RC4 key from the client's `Y` (wire order, little
/// endian) and the server seed.
pub fn derive_shared_key(keys: &CryptKeys, y_wire: &[u8; 64], seed: &[u8; 7]) -> [u8; 7] {
    let y = BigUint::from_bytes_le(y_wire);
    let n = BigUint::from_bytes_be(&keys.n);
    let k = BigUint::from_bytes_be(&keys.k);
    let shared = y.modpow(&k, &n);

    let mut shared_le = shared.to_bytes_le();
    shared_le.resize(64, 0);

    let mut key = [0u8; 7];
    for i in 0..7 {
        key[i] = shared_le[i] ^ seed[i];
    }
    key
}

/// Inbound half of a (possibly) encrypted connection.
pub struct CryptRead<R> {
    inner: R,
    cipher: Option<Rc4<U7>>,
}

/// Outbound half of a (possibly) encrypted connection.
pub struct CryptWrite<W> {
    inner: W,
    cipher: Option<Rc4<U7>>,
}

impl<R: AsyncRead + Unpin> CryptRead<R> {
    pub fn plain(inner: R) -> Self {
        Self {
            inner,
            cipher: None,
        }
    }

    pub async fn read_exact(&mut self, buffer: &mut [u8]) -> NetResult<()> {
        self.inner
            .read_exact(buffer)
            .await
            .map_err(map_hangup)?;
        if let Some(cipher) = &mut self.cipher {
            cipher.apply_keystream(buffer);
        }
        Ok(())
    }

    pub async fn read_buffer(&mut self, len: usize) -> NetResult<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.read_exact(&mut buffer).await?;
        Ok(buffer)
    }

    pub async fn read_u8(&mut self) -> NetResult<u8> {
        let mut buffer = [0u8; 1];
        self.read_exact(&mut buffer).await?;
        Ok(buffer[0])
    }

    pub async fn read_u16(&mut self) -> NetResult<u16> {
        let mut buffer = [0u8; 2];
        self.read_exact(&mut buffer).await?;
        Ok(u16::from_le_bytes(buffer))
    }

    pub async fn read_u32(&mut self) -> NetResult<u32> {
        let mut buffer = [0u8; 4];
        self.read_exact(&mut buffer).await?;
        Ok(u32::from_le_bytes(buffer))
    }

    pub async fn read_uuid(&mut self) -> NetResult<uuid::Uuid> {
        let buffer = self.read_buffer(16).await?;
        let mut cursor = std::io::Cursor::new(buffer);
        crate::types::read_uuid(&mut cursor)
    }

    /// `u16` code-unit count, then UTF-16 units. Used by the auth message
    /// bodies.
    pub async fn read_wide_string(&mut self) -> NetResult<String> {
        let count = self.read_u16().await? as usize;
        if count > 0x1000 {
            return Err(NetError::Malformed("oversized string field"));
        }
        let raw = self.read_buffer(count * 2).await?;
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).map_err(|_| NetError::Malformed("invalid UTF-16 field"))
    }
}

impl<W: AsyncWrite + Unpin> CryptWrite<W> {
    pub fn plain(inner: W) -> Self {
        Self {
            inner,
            cipher: None,
        }
    }

    /// Encrypt (a copy of) the buffer and write it out.
    pub async fn send(&mut self, buffer: &[u8]) -> NetResult<()> {
        match &mut self.cipher {
            Some(cipher) => {
                let mut scratch = buffer.to_vec();
                cipher.apply_keystream(&mut scratch);
                self.inner.write_all(&scratch).await.map_err(map_hangup)?;
            }
            None => self.inner.write_all(buffer).await.map_err(map_hangup)?,
        }
        self.inner.flush().await.map_err(map_hangup)?;
        Ok(())
    }
}

fn map_hangup(err: std::io::Error) -> NetError {
    match err.kind() {
        std::io::ErrorKind::UnexpectedEof
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe => NetError::Hangup,
        _ => NetError::Io(err),
    }
}

/// Run the connect handshake on a fresh socket. A 2-byte connect message is a
/// plaintext request; 66 bytes carries the client's `Y`. Anything else is a
/// protocol error that drops the connection.
pub async fn establish<R, W>(
    mut read: R,
    mut write: W,
    keys: &CryptKeys,
) -> NetResult<(CryptRead<R>, CryptWrite<W>)>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut header = [0u8; 2];
    read.read_exact(&mut header).await.map_err(map_hangup)?;
    if header[0] != CLI_TO_SERV_CONNECT {
        return Err(NetError::Protocol(format!(
            "unexpected connect message id {}",
            header[0]
        )));
    }

    match header[1] {
        2 => {
            // Client asked for a plaintext session; reply with an empty seed.
            write
                .write_all(&[SERV_TO_CLI_ENCRYPT, 2])
                .await
                .map_err(map_hangup)?;
            write.flush().await.map_err(map_hangup)?;
            Ok((CryptRead::plain(read), CryptWrite::plain(write)))
        }
        66 => {
            let mut y_wire = [0u8; 64];
            read.read_exact(&mut y_wire).await.map_err(map_hangup)?;

            let mut seed = [0u8; 7];
            rand::thread_rng().fill_bytes(&mut seed);
            let key = derive_shared_key(keys, &y_wire, &seed);

            let mut reply = [0u8; 9];
            reply[0] = SERV_TO_CLI_ENCRYPT;
            reply[1] = 9;
            reply[2..9].copy_from_slice(&seed);
            write.write_all(&reply).await.map_err(map_hangup)?;
            write.flush().await.map_err(map_hangup)?;

            let read_cipher = Rc4::new(rc4::Key::<U7>::from_slice(&key));
            let write_cipher = Rc4::new(rc4::Key::<U7>::from_slice(&key));
            Ok((
                CryptRead {
                    inner: read,
                    cipher: Some(read_cipher),
                },
                CryptWrite {
                    inner: write,
                    cipher: Some(write_cipher),
                },
            ))
        }
        size => Err(NetError::Protocol(format!(
            "unexpected connect message size {size}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keys() -> CryptKeys {
        // Deterministic odd modulus; not a safe prime, which the math does
        // not require for the tests.
        let mut n = [0u8; 64];
        let mut k = [0u8; 64];
        for i in 0..64 {
            n[i] = (i as u8).wrapping_mul(37).wrapping_add(11);
            k[i] = (i as u8).wrapping_mul(91).wrapping_add(3);
        }
        n[0] |= 0x80;
        n[63] |= 1;
        CryptKeys { n, k }
    }

    #[test]
    fn shared_key_matches_reference_formula() {
        let keys = test_keys();
        let mut y_wire = [0u8; 64];
        for (i, byte) in y_wire.iter_mut().enumerate() {
            *byte = (i as u8).wrapping_mul(5).wrapping_add(1);
        }
        let seed = [1, 2, 3, 4, 5, 6, 7];

        let key = derive_shared_key(&keys, &y_wire, &seed);

        let y = BigUint::from_bytes_le(&y_wire);
        let n = BigUint::from_bytes_be(&keys.n);
        let k = BigUint::from_bytes_be(&keys.k);
        let mut expect = y.modpow(&k, &n).to_bytes_le();
        expect.resize(7, 0);
        for i in 0..7 {
            expect[i] ^= seed[i];
        }
        assert_eq!(&key[..], &expect[..]);
    }

    #[test]
    fn rc4_streams_mutually_decrypt() {
        let key = [9u8, 8, 7, 6, 5, 4, 3];
        let mut alice = Rc4::<U7>::new(rc4::Key::<U7>::from_slice(&key));
        let mut bob = Rc4::<U7>::new(rc4::Key::<U7>::from_slice(&key));

        let mut wire = b"The ending has not yet been written".to_vec();
        alice.apply_keystream(&mut wire);
        assert_ne!(&wire[..], b"The ending has not yet been written");
        bob.apply_keystream(&mut wire);
        assert_eq!(&wire[..], b"The ending has not yet been written");
    }

    #[test]
    fn public_key_is_deterministic() {
        let keys = test_keys();
        assert_eq!(
            calc_public_key(&keys, CRYPT_BASE_AUTH),
            calc_public_key(&keys, CRYPT_BASE_AUTH)
        );
        assert_ne!(
            calc_public_key(&keys, CRYPT_BASE_AUTH),
            calc_public_key(&keys, CRYPT_BASE_GATE)
        );
    }

    #[tokio::test]
    async fn plaintext_handshake() {
        let (mut client, server) = tokio::io::duplex(256);
        let keys = test_keys();

        let server_task = tokio::spawn(async move {
            let (read, write) = tokio::io::split(server);
            establish(read, write, &keys).await
        });

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        client.write_all(&[0, 2]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0, 2]);

        let (read, _write) = server_task.await.unwrap().unwrap();
        assert!(read.cipher.is_none());
    }

    #[tokio::test]
    async fn encrypted_handshake_agrees_on_key() {
        let (mut client, server) = tokio::io::duplex(1024);
        let keys = test_keys();
        let server_keys = keys.clone();

        let server_task = tokio::spawn(async move {
            let (read, write) = tokio::io::split(server);
            establish(read, write, &server_keys).await
        });

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut y_wire = [0u8; 64];
        for (i, byte) in y_wire.iter_mut().enumerate() {
            *byte = (200 - i) as u8;
        }
        let mut connect = vec![0u8, 66];
        connect.extend_from_slice(&y_wire);
        client.write_all(&connect).await.unwrap();

        let mut reply = [0u8; 9];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], 0);
        assert_eq!(reply[1], 9);
        let mut seed = [0u8; 7];
        seed.copy_from_slice(&reply[2..9]);

        let (mut server_read, mut server_write) = server_task.await.unwrap().unwrap();
        assert!(server_read.cipher.is_some());

        // The client derives the same key and can decrypt server output.
        let key = derive_shared_key(&keys, &y_wire, &seed);
        let mut client_cipher = Rc4::<U7>::new(rc4::Key::<U7>::from_slice(&key));
        server_write.send(b"hello shard").await.unwrap();
        let mut wire = [0u8; 11];
        client.read_exact(&mut wire).await.unwrap();
        client_cipher.apply_keystream(&mut wire);
        assert_eq!(&wire, b"hello shard");

        // And the reverse direction uses the independent inbound stream.
        let mut client_out = Rc4::<U7>::new(rc4::Key::<U7>::from_slice(&key));
        let mut payload = *b"ping";
        client_out.apply_keystream(&mut payload);
        client.write_all(&payload).await.unwrap();
        let mut got = [0u8; 4];
        server_read.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"ping");
    }
}
