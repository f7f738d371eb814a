//! Forward-only reader over the local headers and payloads of a ZIP stream.
//!
//! Entries are visited in the order they were written; the central directory
//! at the end of the archive is never consulted, so no seeking is needed.

use crate::crypto::{ZipCryptoKeys, ZipCryptoReader, ENCRYPTION_HEADER_SIZE};
use crate::error::ExtractError;
use crate::header::{read_record, DataDescriptor, LocalFileHeader, Record, DATA_DESCRIPTOR_SIG};
use crate::types::CompressionMethod;
use bzip2::bufread::BzDecoder;
use flate2::bufread::DeflateDecoder;
use std::io::{self, BufRead, BufReader, Read};

/// Sequential reader over the entries of a ZIP byte stream.
pub struct ZipStream<R> {
    inner: BufReader<R>,
    finished: bool,
}

impl<R: Read> ZipStream<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(8 * 1024, reader)
    }

    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        Self {
            inner: BufReader::with_capacity(capacity, reader),
            finished: false,
        }
    }

    /// Read the next local file header, or `None` once the central directory is reached.
    ///
    /// The previous entry's payload must have been consumed with
    /// [`copy_entry`](Self::copy_entry) or [`skip_entry`](Self::skip_entry).
    pub fn next_entry(&mut self) -> Result<Option<LocalFileHeader>, ExtractError> {
        if self.finished {
            return Ok(None);
        }

        match read_record(&mut self.inner)? {
            Record::LocalFile(header) => Ok(Some(header)),
            Record::EndOfEntries => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    /// Pass over an entry's payload without decoding it.
    ///
    /// Returns `false` if the payload is compressed and its size is only
    /// recorded after it, in which case the entry has to be decoded to find
    /// its end.
    pub fn skip_entry(&mut self, header: &LocalFileHeader) -> Result<bool, ExtractError> {
        let name = header.file_name.as_str();
        match header.known_compressed_size() {
            Some(size) => {
                let skipped = io::copy(&mut (&mut self.inner).take(size), &mut io::sink())?;
                if skipped < size {
                    return Err(ExtractError::Truncated(format!(
                        "{}: payload ended after {} of {} bytes",
                        name, skipped, size
                    )));
                }
                if header.has_data_descriptor() {
                    DataDescriptor::read(&mut self.inner, header.zip64)?;
                }
                Ok(true)
            }
            None if header.method == CompressionMethod::Stored => {
                let mut scan = DescriptorScan::new(&mut self.inner, header);
                io::copy(&mut scan, &mut io::sink())
                    .map_err(|e| ExtractError::from_entry_read(name, e))?;
                scan.into_descriptor(name)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Decode an entry's payload, handing each decoded chunk to `on_chunk`.
    ///
    /// `keys` must be present for encrypted entries. The CRC-32 and
    /// uncompressed size are verified once the payload ends, and the stream is
    /// left positioned at the next record. Returns the number of decoded bytes.
    pub fn copy_entry<F>(
        &mut self,
        header: &LocalFileHeader,
        keys: Option<ZipCryptoKeys>,
        buf: &mut [u8],
        mut on_chunk: F,
    ) -> Result<u64, ExtractError>
    where
        F: FnMut(&[u8]) -> Result<(), ExtractError>,
    {
        check_supported(header)?;
        let name = header.file_name.as_str();
        let mut hasher = crc32fast::Hasher::new();

        let (decoded, descriptor) = match header.known_compressed_size() {
            Some(size) => {
                let mut raw = (&mut self.inner).take(size);
                let decoded = decode_payload(&mut raw, header, keys, buf, &mut hasher, &mut on_chunk)?;

                // Decoders stop at their own end marker; drop any slack behind it.
                io::copy(&mut raw, &mut io::sink())?;
                if raw.limit() > 0 {
                    return Err(ExtractError::Truncated(format!(
                        "{}: payload ended {} bytes early",
                        name,
                        raw.limit()
                    )));
                }

                let descriptor = if header.has_data_descriptor() {
                    Some(DataDescriptor::read(&mut self.inner, header.zip64)?)
                } else {
                    None
                };
                (decoded, descriptor)
            }
            // A stored payload has no end marker of its own; it ends where its descriptor begins.
            None if header.method == CompressionMethod::Stored => {
                let mut scan = DescriptorScan::new(&mut self.inner, header);
                let decoded = decode_payload(
                    BufReader::new(&mut scan),
                    header,
                    keys,
                    buf,
                    &mut hasher,
                    &mut on_chunk,
                )?;
                (decoded, Some(scan.into_descriptor(name)?))
            }
            None => {
                let decoded = decode_payload(&mut self.inner, header, keys, buf, &mut hasher, &mut on_chunk)?;
                (decoded, Some(DataDescriptor::read(&mut self.inner, header.zip64)?))
            }
        };

        let (expected_crc, expected_size) = match descriptor {
            Some(descriptor) => (descriptor.crc32, descriptor.uncompressed_size),
            None => (header.crc32, header.uncompressed_size),
        };

        if !sizes_match(decoded, expected_size, header.zip64) {
            return Err(ExtractError::ChecksumMismatch(format!(
                "{}: decoded {} bytes, expected {}",
                name, decoded, expected_size
            )));
        }

        let actual_crc = hasher.finalize();
        if actual_crc != expected_crc {
            return Err(ExtractError::ChecksumMismatch(format!(
                "{}: crc {:#010x}, expected {:#010x}",
                name, actual_crc, expected_crc
            )));
        }

        Ok(decoded)
    }
}

/// Strip the encryption layer, if any, then decompress.
fn decode_payload<B, F>(
    source: B,
    header: &LocalFileHeader,
    keys: Option<ZipCryptoKeys>,
    buf: &mut [u8],
    hasher: &mut crc32fast::Hasher,
    on_chunk: &mut F,
) -> Result<u64, ExtractError>
where
    B: BufRead,
    F: FnMut(&[u8]) -> Result<(), ExtractError>,
{
    match (header.is_encrypted(), keys) {
        (true, Some(keys)) => {
            let plain = ZipCryptoReader::new(
                source,
                keys,
                header.password_check_byte(),
                &header.file_name,
            )?;
            decompress(plain, header, buf, hasher, on_chunk)
        }
        (true, None) => Err(ExtractError::PasswordRequired),
        (false, _) => decompress(source, header, buf, hasher, on_chunk),
    }
}

fn decompress<B, F>(
    source: B,
    header: &LocalFileHeader,
    buf: &mut [u8],
    hasher: &mut crc32fast::Hasher,
    on_chunk: &mut F,
) -> Result<u64, ExtractError>
where
    B: BufRead,
    F: FnMut(&[u8]) -> Result<(), ExtractError>,
{
    match header.method {
        CompressionMethod::Stored => pump(source, &header.file_name, buf, hasher, on_chunk),
        CompressionMethod::Deflate => {
            pump(DeflateDecoder::new(source), &header.file_name, buf, hasher, on_chunk)
        }
        CompressionMethod::Bzip2 => {
            pump(BzDecoder::new(source), &header.file_name, buf, hasher, on_chunk)
        }
        other => Err(unsupported(header, format!("compression method {:?}", other))),
    }
}

fn pump<D, F>(
    mut decoder: D,
    name: &str,
    buf: &mut [u8],
    hasher: &mut crc32fast::Hasher,
    on_chunk: &mut F,
) -> Result<u64, ExtractError>
where
    D: Read,
    F: FnMut(&[u8]) -> Result<(), ExtractError>,
{
    let mut decoded = 0u64;
    loop {
        let n = match decoder.read(buf) {
            Ok(0) => return Ok(decoded),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ExtractError::from_entry_read(name, e)),
        };
        hasher.update(&buf[..n]);
        decoded += n as u64;
        on_chunk(&buf[..n])?;
    }
}

/// Raw payload of a stored entry whose size is only known from its data descriptor.
///
/// Yields bytes until a signed descriptor is found whose compressed size
/// equals the number of bytes yielded so far. For plain entries the recorded
/// CRC and uncompressed size must agree too, so a descriptor signature inside
/// the data is passed through. The descriptor itself is consumed, leaving the
/// source at the next record. Unsigned descriptors cannot be found this way
/// and end in [`ExtractError::Truncated`].
struct DescriptorScan<'a, B> {
    inner: &'a mut B,
    encrypted: bool,
    zip64: bool,
    /// Raw bytes taken from `inner` that may start a descriptor.
    held: Vec<u8>,
    /// Payload bytes yielded so far.
    consumed: u64,
    crc: crc32fast::Hasher,
    descriptor: Option<DataDescriptor>,
}

impl<'a, B: BufRead> DescriptorScan<'a, B> {
    fn new(inner: &'a mut B, header: &LocalFileHeader) -> Self {
        Self {
            inner,
            encrypted: header.is_encrypted(),
            zip64: header.zip64,
            held: Vec::new(),
            consumed: 0,
            crc: crc32fast::Hasher::new(),
            descriptor: None,
        }
    }

    fn descriptor_len(&self) -> usize {
        if self.zip64 {
            24
        } else {
            16
        }
    }

    fn into_descriptor(self, name: &str) -> Result<DataDescriptor, ExtractError> {
        self.descriptor.ok_or_else(|| {
            ExtractError::Truncated(format!("{}: no data descriptor after stored payload", name))
        })
    }

    /// Parse `held` as a descriptor closing a payload of `consumed` bytes.
    fn held_descriptor(&self) -> Option<DataDescriptor> {
        if !self.held.starts_with(&DATA_DESCRIPTOR_SIG.to_le_bytes()) {
            return None;
        }
        let descriptor = DataDescriptor::read(&mut &self.held[..], self.zip64).ok()?;
        if descriptor.compressed_size != self.consumed {
            return None;
        }

        let plain = if self.encrypted {
            self.consumed.checked_sub(ENCRYPTION_HEADER_SIZE as u64)?
        } else {
            if descriptor.crc32 != self.crc.clone().finalize() {
                return None;
            }
            self.consumed
        };
        (descriptor.uncompressed_size == plain).then_some(descriptor)
    }

    fn account(&mut self, payload: &[u8]) {
        self.crc.update(payload);
        self.consumed += payload.len() as u64;
    }
}

impl<B: BufRead> Read for DescriptorScan<'_, B> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.descriptor.is_some() || out.is_empty() {
            return Ok(0);
        }

        loop {
            if !self.held.is_empty() {
                let wanted = self.descriptor_len();
                while self.held.len() < wanted {
                    let available = self.inner.fill_buf()?;
                    if available.is_empty() {
                        return Err(io::ErrorKind::UnexpectedEof.into());
                    }
                    let take = available.len().min(wanted - self.held.len());
                    self.held.extend_from_slice(&available[..take]);
                    self.inner.consume(take);
                }

                if let Some(descriptor) = self.held_descriptor() {
                    self.held.clear();
                    self.descriptor = Some(descriptor);
                    return Ok(0);
                }

                // Not a descriptor: hand out everything before the next possible one.
                let payload = signature_start(&self.held[1..]).map_or(self.held.len(), |i| i + 1);
                let n = payload.min(out.len());
                out[..n].copy_from_slice(&self.held[..n]);
                self.held.drain(..n);
                self.account(&out[..n]);
                return Ok(n);
            }

            let descriptor_len = self.descriptor_len();
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            match signature_start(available) {
                Some(0) => {
                    let take = available.len().min(descriptor_len);
                    self.held.extend_from_slice(&available[..take]);
                    self.inner.consume(take);
                }
                found => {
                    let n = found.unwrap_or(available.len()).min(out.len());
                    out[..n].copy_from_slice(&available[..n]);
                    self.inner.consume(n);
                    self.account(&out[..n]);
                    return Ok(n);
                }
            }
        }
    }
}

/// First offset where a descriptor signature starts, or where a prefix of one runs to the end.
fn signature_start(bytes: &[u8]) -> Option<usize> {
    let sig = DATA_DESCRIPTOR_SIG.to_le_bytes();
    (0..bytes.len()).find(|&i| {
        let tail = &bytes[i..];
        let len = tail.len().min(sig.len());
        tail[..len] == sig[..len]
    })
}

/// Reject entries this reader cannot decode, before any password is requested for them.
pub fn check_supported(header: &LocalFileHeader) -> Result<(), ExtractError> {
    if header.uses_strong_encryption() {
        return Err(unsupported(header, "strong encryption".to_string()));
    }

    match header.method {
        CompressionMethod::Aes => Err(unsupported(header, "AES encryption".to_string())),
        CompressionMethod::Unknown(method) => {
            Err(unsupported(header, format!("compression method {}", method)))
        }
        _ => Ok(()),
    }
}

fn unsupported(header: &LocalFileHeader, reason: String) -> ExtractError {
    ExtractError::UnsupportedEntry {
        entry: header.file_name.clone(),
        reason,
    }
}

/// Data descriptors without ZIP64 only carry the low 32 bits of the size.
fn sizes_match(decoded: u64, expected: u64, zip64: bool) -> bool {
    if zip64 {
        decoded == expected
    } else {
        decoded & 0xFFFF_FFFF == expected & 0xFFFF_FFFF
    }
}
