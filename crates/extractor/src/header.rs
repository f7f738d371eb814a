//! ZIP local header records, as they appear in a forward-only stream.

use crate::cp437::decode_cp437;
use crate::error::ExtractError;
use crate::types::{CompressionMethod, EntryHeader};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};

/// ZIP local file header signature (PK\x03\x04).
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4B50;

/// Central directory header signature (PK\x01\x02).
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x0201_4B50;

/// End of central directory signature (PK\x05\x06).
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4B50;

/// ZIP64 end of central directory signature (PK\x06\x06).
pub const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x0606_4B50;

/// Digital signature record (PK\x05\x05).
pub const DIGITAL_SIGNATURE_SIG: u32 = 0x0505_4B50;

/// Archive extra data record (PK\x06\x08), only written by central directory encryption.
pub const ARCHIVE_EXTRA_DATA_SIG: u32 = 0x0806_4B50;

/// Optional data descriptor signature (PK\x07\x08).
pub const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4B50;

/// Entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// CRC and sizes follow the payload in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// PKWARE strong encryption.
pub const FLAG_STRONG_ENCRYPTION: u16 = 0x0040;

/// Entry name and comment are UTF-8; otherwise they are CP437.
pub const FLAG_UTF8: u16 = 0x0800;

/// ZIP64 extended information extra field.
const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;

const ZIP64_MARKER_32: u32 = 0xFFFF_FFFF;

/// Fixed part of a local file header, after the signature.
const LOCAL_HEADER_FIXED_LEN: usize = 26;

/// What the next four bytes of the stream announce.
#[derive(Debug)]
pub enum Record {
    /// Another entry follows.
    LocalFile(LocalFileHeader),
    /// The entry stream is over: central directory or trailing records begin.
    EndOfEntries,
}

/// A parsed local file header.
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub method: CompressionMethod,
    pub mtime: u16,
    pub mdate: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub file_name: String,
    /// Whether the extra field carried ZIP64 sizes.
    pub zip64: bool,
}

/// Read the next record signature and, for a local file, the header behind it.
pub fn read_record<R: Read>(reader: &mut R) -> Result<Record, ExtractError> {
    let mut sig = [0u8; 4];
    read_exact_or_truncated(reader, &mut sig, "record signature")?;

    match u32::from_le_bytes(sig) {
        LOCAL_FILE_HEADER_SIG => Ok(Record::LocalFile(LocalFileHeader::read_body(reader)?)),
        CENTRAL_DIR_HEADER_SIG
        | END_OF_CENTRAL_DIR_SIG
        | ZIP64_END_OF_CENTRAL_DIR_SIG
        | DIGITAL_SIGNATURE_SIG
        | ARCHIVE_EXTRA_DATA_SIG => Ok(Record::EndOfEntries),
        other => Err(ExtractError::MalformedHeader(format!(
            "unexpected signature {:#010x}",
            other
        ))),
    }
}

impl LocalFileHeader {
    /// Parse everything after the signature: the fixed fields, the name and the extra field.
    fn read_body<R: Read>(reader: &mut R) -> Result<Self, ExtractError> {
        let mut fixed = [0u8; LOCAL_HEADER_FIXED_LEN];
        read_exact_or_truncated(reader, &mut fixed, "local file header")?;

        let mut cursor = Cursor::new(&fixed[..]);
        let version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let method = CompressionMethod::from_u16(cursor.read_u16::<LittleEndian>()?);
        let mtime = cursor.read_u16::<LittleEndian>()?;
        let mdate = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let name_len = cursor.read_u16::<LittleEndian>()? as usize;
        let extra_len = cursor.read_u16::<LittleEndian>()? as usize;

        let mut name = vec![0u8; name_len];
        read_exact_or_truncated(reader, &mut name, "entry name")?;
        let mut extra = vec![0u8; extra_len];
        read_exact_or_truncated(reader, &mut extra, "extra field")?;

        let (zip64, uncompressed_64, compressed_64) =
            parse_zip64_extra(&extra, uncompressed_size, compressed_size);

        Ok(Self {
            version_needed,
            flags,
            method,
            mtime,
            mdate,
            crc32,
            compressed_size: compressed_64.unwrap_or(compressed_size as u64),
            uncompressed_size: uncompressed_64.unwrap_or(uncompressed_size as u64),
            file_name: decode_name(&name, flags),
            zip64,
        })
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    pub fn uses_strong_encryption(&self) -> bool {
        self.flags & FLAG_STRONG_ENCRYPTION != 0
    }

    pub fn is_directory(&self) -> bool {
        self.file_name.ends_with('/') || self.file_name.ends_with('\\')
    }

    /// Size of the stored payload, if the local header knows it.
    ///
    /// With a data descriptor the header sizes are normally zero, but writers
    /// that could seek back fill them in anyway; a non-zero compressed size is
    /// taken as real.
    pub fn known_compressed_size(&self) -> Option<u64> {
        (!self.has_data_descriptor() || self.compressed_size != 0).then_some(self.compressed_size)
    }

    pub fn known_uncompressed_size(&self) -> Option<u64> {
        self.known_compressed_size().map(|_| self.uncompressed_size)
    }

    /// Byte the decrypted encryption header must end with for a correct password.
    ///
    /// Writers that stream (data descriptor set) cannot know the CRC up front
    /// and use the high byte of the DOS time instead.
    pub fn password_check_byte(&self) -> u8 {
        if self.has_data_descriptor() {
            (self.mtime >> 8) as u8
        } else {
            (self.crc32 >> 24) as u8
        }
    }

    pub fn to_entry_header(&self) -> EntryHeader {
        EntryHeader {
            path: self.file_name.clone(),
            is_directory: self.is_directory(),
            is_encrypted: self.is_encrypted(),
            method: self.method,
            compressed_size: self.known_compressed_size(),
            uncompressed_size: self.known_uncompressed_size(),
        }
    }
}

/// Entry names are UTF-8 only when the writer says so; anything else is CP437.
fn decode_name(raw: &[u8], flags: u16) -> String {
    if flags & FLAG_UTF8 != 0 {
        String::from_utf8_lossy(raw).into_owned()
    } else {
        decode_cp437(raw)
    }
}

/// CRC and sizes trailing an entry written with [`FLAG_DATA_DESCRIPTOR`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Read a data descriptor. The leading signature is optional.
    pub fn read<R: Read>(reader: &mut R, zip64: bool) -> Result<Self, ExtractError> {
        let mut word = [0u8; 4];
        read_exact_or_truncated(reader, &mut word, "data descriptor")?;
        let first = u32::from_le_bytes(word);

        let crc32 = if first == DATA_DESCRIPTOR_SIG {
            read_exact_or_truncated(reader, &mut word, "data descriptor")?;
            u32::from_le_bytes(word)
        } else {
            first
        };

        let (compressed_size, uncompressed_size) = if zip64 {
            let mut sizes = [0u8; 16];
            read_exact_or_truncated(reader, &mut sizes, "data descriptor")?;
            let mut cursor = Cursor::new(&sizes[..]);
            (
                cursor.read_u64::<LittleEndian>()?,
                cursor.read_u64::<LittleEndian>()?,
            )
        } else {
            let mut sizes = [0u8; 8];
            read_exact_or_truncated(reader, &mut sizes, "data descriptor")?;
            let mut cursor = Cursor::new(&sizes[..]);
            (
                cursor.read_u32::<LittleEndian>()? as u64,
                cursor.read_u32::<LittleEndian>()? as u64,
            )
        };

        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }
}

/// Pull 64-bit sizes out of the ZIP64 extra field.
///
/// Values are only present for header fields set to 0xFFFFFFFF, in the order
/// uncompressed size, compressed size.
fn parse_zip64_extra(
    extra: &[u8],
    uncompressed_size: u32,
    compressed_size: u32,
) -> (bool, Option<u64>, Option<u64>) {
    let mut offset = 0;
    while offset + 4 <= extra.len() {
        let id = u16::from_le_bytes([extra[offset], extra[offset + 1]]);
        let size = u16::from_le_bytes([extra[offset + 2], extra[offset + 3]]) as usize;
        offset += 4;
        let end = (offset + size).min(extra.len());

        if id == ZIP64_EXTRA_FIELD_ID {
            let mut field = Cursor::new(&extra[offset..end]);
            let uncompressed = if uncompressed_size == ZIP64_MARKER_32 {
                field.read_u64::<LittleEndian>().ok()
            } else {
                None
            };
            let compressed = if compressed_size == ZIP64_MARKER_32 {
                field.read_u64::<LittleEndian>().ok()
            } else {
                None
            };
            return (true, uncompressed, compressed);
        }

        offset = end;
    }

    (false, None, None)
}

/// `read_exact` that reports a short stream as [`ExtractError::Truncated`].
pub(crate) fn read_exact_or_truncated<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &str,
) -> Result<(), ExtractError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ExtractError::Truncated(format!("stream ended inside {}", what))
        } else {
            ExtractError::Io(e)
        }
    })
}
