//! OpenPGP encryption and decryption layers.
//!
//! [`EncryptingWriter`] wraps a byte sink; everything written to it ends up
//! as a single binary OpenPGP message (public-key encrypted session key
//! followed by an integrity-protected AES-128 data packet) on the sink.
//! [`decrypt`] does the reverse for binary or ASCII-armored messages.
//!
//! ## Message framing
//!
//! ```text
//! [PKESK (recipient key id, session key)][SEIPD v1 [literal data][MDC]]
//! ```
//!
//! The session key packet and the packet headers are written when the layer
//! is opened. Plaintext is enciphered as it arrives and leaves in
//! partial-length chunks of [`CHUNK_SIZE`] bytes, so at most one chunk per
//! packet is held in memory. [`EncryptingWriter::close`] writes the last
//! chunks and the modification detection code; without it the message is
//! truncated and will not decrypt.
//!
//! Decryption verifies the modification detection code before any plaintext
//! is handed out, so the recovered body is held in memory.

use crate::error::{PackError, Result, Stage};
use crate::key_manager::{PrivateKeyMaterial, PublicKeyMaterial};
use aes::Aes128;
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::BufEncryptor;
use pgp::composed::{Deserializable, Message, SignedPublicKey};
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use pgp::packet::{self, PublicKeyEncryptedSessionKey};
use pgp::types::{KeyTrait, Tag};
use rand_core::{OsRng, RngCore};
use sha1::{Digest, Sha1};
use std::io::{self, Cursor, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use zeroize::Zeroizing;

const ARMOR_HEADER: &[u8] = b"-----BEGIN PGP MESSAGE-----";

/// Cipher used for the session key of every message we produce.
const SESSION_CIPHER: SymmetricKeyAlgorithm = SymmetricKeyAlgorithm::AES128;

/// Size of every partial body chunk. Must be a power of two of at least 512.
pub const CHUNK_SIZE: usize = 8192;

/// Length octet announcing a partial chunk of `CHUNK_SIZE` bytes.
const PARTIAL_LENGTH_OCTET: u8 = 224 + CHUNK_SIZE.trailing_zeros() as u8;

const SEIPD_VERSION: u8 = 1;

/// Tag and length octets of the modification detection code packet.
const MDC_HEADER: [u8; 2] = [0xD3, 0x14];

/// Which component of the identity receives the session key.
#[derive(Debug, Clone, Copy)]
enum Recipient {
    Subkey(usize),
    Primary,
}

fn pick_recipient(key: &SignedPublicKey) -> Result<Recipient> {
    if let Some(idx) = key.public_subkeys.iter().position(|k| k.is_encryption_key()) {
        return Ok(Recipient::Subkey(idx));
    }
    if key.is_encryption_key() {
        return Ok(Recipient::Primary);
    }
    Err(PackError::key_policy(format!(
        "public key {:?} has no encryption-capable component",
        key.key_id()
    )))
}

fn session_key_packet(key: &SignedPublicKey, recipient: Recipient, session_key: &[u8]) -> Result<PublicKeyEncryptedSessionKey> {
    let mut rng = OsRng;
    match recipient {
        Recipient::Subkey(idx) => PublicKeyEncryptedSessionKey::from_session_key(
            &mut rng,
            session_key,
            SESSION_CIPHER,
            &key.public_subkeys[idx],
        ),
        Recipient::Primary => PublicKeyEncryptedSessionKey::from_session_key(&mut rng, session_key, SESSION_CIPHER, key),
    }
    .map_err(|e| PackError::crypto(format!("failed to encrypt session key: {}", e)))
}

fn pgp_io(e: pgp::errors::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

/// New-format packet whose body goes out in partial-length chunks.
struct PartialBody<W: Write> {
    inner: W,
    chunk: Zeroizing<Vec<u8>>,
}

impl<W: Write> PartialBody<W> {
    fn new(mut inner: W, tag: Tag) -> io::Result<Self> {
        inner.write_all(&[0b1100_0000 | tag as u8])?;
        Ok(Self {
            inner,
            chunk: Zeroizing::new(Vec::with_capacity(CHUNK_SIZE)),
        })
    }

    /// Emit the remainder with a definite length, which ends the packet.
    fn finish(mut self) -> io::Result<W> {
        pgp::util::write_packet_length(self.chunk.len(), &mut self.inner).map_err(pgp_io)?;
        self.inner.write_all(&self.chunk)?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for PartialBody<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(CHUNK_SIZE - self.chunk.len());
        self.chunk.extend_from_slice(&buf[..n]);
        if self.chunk.len() == CHUNK_SIZE {
            self.inner.write_all(&[PARTIAL_LENGTH_OCTET])?;
            self.inner.write_all(&self.chunk)?;
            self.chunk.clear();
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Body of the integrity-protected data packet: CFB with a zero IV over a
/// random prefix, the inner packets and a trailing SHA-1 of everything.
struct Sealer<W: Write> {
    cipher: BufEncryptor<Aes128>,
    mdc: Sha1,
    out: PartialBody<W>,
    scratch: Zeroizing<Vec<u8>>,
}

impl<W: Write> Sealer<W> {
    fn new(mut out: PartialBody<W>, session_key: &[u8]) -> Result<Self> {
        out.write_all(&[SEIPD_VERSION])
            .map_err(|e| PackError::io(Stage::Encryption, e))?;
        let iv = [0u8; 16];
        let cipher = BufEncryptor::<Aes128>::new_from_slices(session_key, &iv)
            .map_err(|e| PackError::crypto(format!("invalid session key: {}", e)))?;
        let mut sealer = Self {
            cipher,
            mdc: Sha1::new(),
            out,
            scratch: Zeroizing::new(Vec::with_capacity(CHUNK_SIZE)),
        };

        // block of random bytes whose last two repeat as a quick check
        let mut prefix = Zeroizing::new([0u8; 18]);
        OsRng.fill_bytes(&mut prefix[..16]);
        prefix[16] = prefix[14];
        prefix[17] = prefix[15];
        sealer
            .write_all(&prefix[..])
            .map_err(|e| PackError::io(Stage::Encryption, e))?;
        Ok(sealer)
    }

    fn finish(mut self) -> io::Result<W> {
        self.write_all(&MDC_HEADER)?;
        let mut digest = self.mdc.clone().finalize();
        self.cipher.encrypt(&mut digest);
        self.out.write_all(&digest)?;
        self.out.finish()
    }
}

impl<W: Write> Write for Sealer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.mdc.update(buf);
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.cipher.encrypt(&mut self.scratch);
        self.out.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

type LiteralBody<W> = PartialBody<Sealer<W>>;

/// Write side of the encryption layer.
pub struct EncryptingWriter<W: Write> {
    // `None` once closed
    literal: Option<LiteralBody<W>>,
    // handed back after close
    sink: Option<W>,
    plaintext_bytes: u64,
}

/// Wrap `sink` so that bytes written are enciphered to the identity in `key`.
///
/// The session key packet and the packet headers are written to `sink`
/// before this returns.
pub fn encrypt<W: Write>(mut sink: W, key: &PublicKeyMaterial) -> Result<EncryptingWriter<W>> {
    let recipient = pick_recipient(key.key())?;
    let session_key = Zeroizing::new(SESSION_CIPHER.new_session_key(&mut OsRng));
    let esk = session_key_packet(key.key(), recipient, &session_key)?;
    packet::write_packet(&mut sink, &esk)
        .map_err(|e| PackError::crypto(format!("failed to write session key packet: {}", e)))?;

    let io_err = |e: io::Error| PackError::io(Stage::Encryption, e);
    let seipd = PartialBody::new(sink, Tag::SymEncryptedProtectedData).map_err(io_err)?;
    let sealer = Sealer::new(seipd, &session_key)?;
    let mut literal = PartialBody::new(sealer, Tag::LiteralData).map_err(io_err)?;

    // binary mode, no file name, creation time
    let created = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);
    literal.write_all(&[b'b', 0]).map_err(io_err)?;
    literal.write_all(&created.to_be_bytes()).map_err(io_err)?;

    debug!(key_id = ?key.key().key_id(), ?recipient, "encryption layer opened");
    Ok(EncryptingWriter {
        literal: Some(literal),
        sink: None,
        plaintext_bytes: 0,
    })
}

impl<W: Write> EncryptingWriter<W> {
    /// Write the final chunks and the integrity trailer. Further writes fail.
    /// Calling this more than once is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(literal) = self.literal.take() else {
            return Ok(());
        };
        let mut sink = literal
            .finish()
            .and_then(Sealer::finish)
            .map_err(|e| PackError::io(Stage::Encryption, e))?;
        sink.flush().map_err(|e| PackError::io(Stage::Encryption, e))?;

        debug!(plaintext_bytes = self.plaintext_bytes, "encryption layer closed");
        self.sink = Some(sink);
        Ok(())
    }

    /// Close the layer and hand back the sink it wrapped.
    pub fn finish(mut self) -> Result<W> {
        self.close()?;
        self.sink
            .take()
            .ok_or_else(|| PackError::crypto("encryption layer has no sink"))
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let literal = self.literal.as_mut().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write after the encryption layer was closed",
            )
        })?;
        let n = literal.write(buf)?;
        self.plaintext_bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        // buffered chunks stay put, only complete chunks reach the sink
        match self.literal.as_mut() {
            Some(literal) => literal.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for EncryptingWriter<W> {
    fn drop(&mut self) {
        if self.literal.is_some() && self.plaintext_bytes > 0 {
            warn!(
                plaintext_bytes = self.plaintext_bytes,
                "encryption layer dropped without close, ciphertext is truncated"
            );
        }
    }
}

/// Plain byte stream recovered from an encrypted package.
#[derive(Debug)]
pub struct PlainReader {
    inner: Cursor<Vec<u8>>,
}

impl PlainReader {
    pub fn len(&self) -> u64 {
        self.inner.get_ref().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.inner.get_ref().is_empty()
    }
}

impl Read for PlainReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Parse the message in `source`. Binary packets start with a tag octet that
/// has its high bit set; anything else is taken as ASCII armor.
fn read_message(mut source: impl Read) -> Result<(Message, bool)> {
    let mut head = Vec::new();
    for byte in source.by_ref().bytes() {
        let byte = byte.map_err(|e| PackError::io(Stage::Encryption, e))?;
        head.push(byte);
        if !byte.is_ascii_whitespace() {
            break;
        }
    }
    let binary = head.last().map_or(false, |b| b & 0x80 != 0);

    let message = if binary {
        Message::from_bytes(Cursor::new(head).chain(source))
    } else {
        // armor parsing needs to seek
        let head_len = head.len();
        let mut armored = head;
        source
            .read_to_end(&mut armored)
            .map_err(|e| PackError::io(Stage::Encryption, e))?;
        let start = armored.len().min(head_len.saturating_sub(1));
        if !armored[start..].starts_with(ARMOR_HEADER) {
            return Err(PackError::crypto("malformed encrypted message: not OpenPGP data"));
        }
        Message::from_armor_single(Cursor::new(armored)).map(|(msg, _headers)| msg)
    }
    .map_err(|e| PackError::crypto(format!("malformed encrypted message: {}", e)))?;
    Ok((message, !binary))
}

/// Decrypt the message read from `source` with an unlocked private key.
///
/// Framing errors, a key that does not match the message and integrity
/// failures are all [`PackError::Crypto`]; no partial plaintext is returned.
pub fn decrypt(source: impl Read, key: &PrivateKeyMaterial) -> Result<PlainReader> {
    let (message, armored) = read_message(source)?;

    let (mut decrypter, key_ids) = message
        .decrypt(|| key.passphrase().to_string(), &[key.key()])
        .map_err(|e| PackError::crypto(format!("failed to decrypt package: {}", e)))?;
    let decrypted = decrypter
        .next()
        .ok_or_else(|| PackError::crypto("no session key in the message matches the private key"))?
        .map_err(|e| PackError::crypto(format!("failed to decrypt package: {}", e)))?;

    let plaintext = decrypted
        .get_content()
        .map_err(|e| PackError::crypto(format!("failed to read decrypted message: {}", e)))?
        .ok_or_else(|| PackError::crypto("decrypted message carries no literal data"))?;

    debug!(?key_ids, armored, plaintext_bytes = plaintext.len(), "decryption layer opened");
    Ok(PlainReader {
        inner: Cursor::new(plaintext),
    })
}
