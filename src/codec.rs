use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const DOMAIN_TAG: &[u8] = b"mixtally/canonical/v1";

/// Errors raised while encoding or decoding canonical byte records.
///
/// A decode failure on replicated state indicates replica corruption and is
/// surfaced as a storage failure by the contract.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of canonical record")]
    UnexpectedEof,
    #[error("length prefix {0} exceeds remaining record size")]
    LengthOutOfBounds(u64),
    #[error("invalid discriminant {value} for {kind}")]
    InvalidDiscriminant { kind: &'static str, value: u64 },
    #[error("malformed utf-8 string in canonical record")]
    MalformedString,
    #[error("malformed group element in canonical record")]
    MalformedElement,
    #[error("trailing {0} bytes after canonical record")]
    TrailingBytes(usize),
}

/// Writer producing the canonical, length-prefixed, big-endian encoding used
/// for fingerprints and for the stored form record. The same logical value
/// always yields byte-identical output on every replica.
pub struct CanonicalWriter {
    buffer: Vec<u8>,
}

impl CanonicalWriter {
    pub fn new(kind: &'static str) -> Self {
        let mut buffer = Vec::with_capacity(128);
        buffer.extend_from_slice(DOMAIN_TAG);
        buffer.extend_from_slice(&(kind.len() as u16).to_be_bytes());
        buffer.extend_from_slice(kind.as_bytes());
        Self { buffer }
    }

    /// A writer without the domain preamble, used for stored records where
    /// the key already scopes the value.
    pub fn bare() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    pub fn append_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn append_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn append_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.buffer
            .extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.buffer.extend_from_slice(bytes);
    }

    pub fn append_str(&mut self, value: &str) {
        self.append_bytes(value.as_bytes());
    }

    /// Appends any arkworks type in compressed canonical form.
    pub fn append_element<T: CanonicalSerialize>(&mut self, value: &T) {
        let mut bytes = Vec::new();
        value
            .serialize_compressed(&mut bytes)
            .expect("canonical serialization should not fail");
        self.append_bytes(&bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

/// Reader for records produced by [`CanonicalWriter::bare`].
pub struct CanonicalReader<'a> {
    buffer: &'a [u8],
}

impl<'a> CanonicalReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.buffer.len() < len {
            return Err(CodecError::UnexpectedEof);
        }
        let (head, tail) = self.buffer.split_at(len);
        self.buffer = tail;
        Ok(head)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("4 bytes")))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.take(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().expect("8 bytes")))
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_u32()? as usize;
        if len > self.buffer.len() {
            return Err(CodecError::LengthOutOfBounds(len as u64));
        }
        self.take(len)
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::MalformedString)
    }

    pub fn read_element<T: CanonicalDeserialize>(&mut self) -> Result<T, CodecError> {
        let bytes = self.read_bytes()?;
        T::deserialize_compressed(bytes).map_err(|_| CodecError::MalformedElement)
    }

    /// Reads a length prefix for a repeated field, bounded by the remaining
    /// record size so corrupt prefixes cannot trigger huge allocations.
    pub fn read_len(&mut self) -> Result<usize, CodecError> {
        let len = self.read_u32()? as usize;
        if len > self.buffer.len() {
            return Err(CodecError::LengthOutOfBounds(len as u64));
        }
        Ok(len)
    }

    pub fn finish(self) -> Result<(), CodecError> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes(self.buffer.len()))
        }
    }
}

/// Values with a canonical transcript used as BLS signing digest and as the
/// seed of the deterministic challenge stream.
pub trait Fingerprint {
    /// Logical kind string used for domain separation.
    fn domain_kind(&self) -> &'static str;

    /// Append this value's canonical representation into the writer.
    fn write_transcript(&self, writer: &mut CanonicalWriter);

    fn transcript_bytes(&self) -> Vec<u8> {
        let mut writer = CanonicalWriter::new(self.domain_kind());
        self.write_transcript(&mut writer);
        writer.finish()
    }

    /// SHA-256 over the canonical transcript.
    fn fingerprint(&self) -> [u8; 32] {
        let digest = Sha256::digest(self.transcript_bytes());
        digest.into()
    }
}
