//! Header probing: learn about an archive from its first local header alone.

use crate::error::ExtractError;
use crate::header::{read_record, Record};
use crate::types::EntryHeader;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read the first local file header of a ZIP stream.
///
/// Only the header itself is consumed, never the entry payload. Returns
/// `None` when the stream starts directly with the central directory, which
/// is how an archive without entries looks.
///
/// # Errors
///
/// Returns an error if:
/// - The stream does not start with a ZIP record ([`ExtractError::MalformedHeader`])
/// - The stream ends inside the header ([`ExtractError::Truncated`])
pub fn probe_first_entry<R: Read>(reader: &mut R) -> Result<Option<EntryHeader>, ExtractError> {
    match read_record(reader)? {
        Record::LocalFile(header) => {
            tracing::debug!(
                entry = %header.file_name,
                encrypted = header.is_encrypted(),
                "probed first entry"
            );
            Ok(Some(header.to_entry_header()))
        }
        Record::EndOfEntries => Ok(None),
    }
}

/// Whether the first entry of the stream is encrypted.
///
/// An archive without entries counts as not encrypted.
pub fn is_first_entry_encrypted<R: Read>(reader: &mut R) -> Result<bool, ExtractError> {
    Ok(probe_first_entry(reader)?.map_or(false, |entry| entry.is_encrypted))
}

/// Probe the archive stored at `path`.
pub fn probe_path(path: &Path) -> Result<Option<EntryHeader>, ExtractError> {
    let mut file = File::open(path)?;
    probe_first_entry(&mut file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{END_OF_CENTRAL_DIR_SIG, FLAG_ENCRYPTED, LOCAL_FILE_HEADER_SIG};
    use crate::types::CompressionMethod;
    use std::io::Cursor;

    fn header_bytes(name: &str, flags: u16, method: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&LOCAL_FILE_HEADER_SIG.to_le_bytes());
        buf.extend_from_slice(&20u16.to_le_bytes());
        buf.extend_from_slice(&flags.to_le_bytes());
        buf.extend_from_slice(&method.to_le_bytes());
        buf.extend_from_slice(&[0u8; 8]); // time, date, crc
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_probe_plain_entry() {
        let mut cursor = Cursor::new(header_bytes("docs/readme.txt", 0, 8, b"payload"));
        let entry = probe_first_entry(&mut cursor).unwrap().unwrap();

        assert_eq!(entry.path, "docs/readme.txt");
        assert!(!entry.is_encrypted);
        assert!(!entry.is_directory);
        assert_eq!(entry.method, CompressionMethod::Deflate);
        assert_eq!(entry.compressed_size, Some(7));
    }

    #[test]
    fn test_probe_does_not_consume_payload() {
        let data = header_bytes("a.txt", 0, 0, b"payload");
        let header_len = data.len() - b"payload".len();
        let mut cursor = Cursor::new(data);

        probe_first_entry(&mut cursor).unwrap();
        assert_eq!(cursor.position() as usize, header_len);
    }

    #[test]
    fn test_probe_encrypted() {
        let mut cursor = Cursor::new(header_bytes("secret.txt", FLAG_ENCRYPTED, 8, &[0u8; 20]));
        assert!(is_first_entry_encrypted(&mut cursor).unwrap());

        let mut cursor = Cursor::new(header_bytes("plain.txt", 0, 8, b""));
        assert!(!is_first_entry_encrypted(&mut cursor).unwrap());
    }

    #[test]
    fn test_probe_empty_archive() {
        let mut cursor = Cursor::new(END_OF_CENTRAL_DIR_SIG.to_le_bytes().to_vec());
        assert!(probe_first_entry(&mut cursor).unwrap().is_none());

        let mut cursor = Cursor::new(END_OF_CENTRAL_DIR_SIG.to_le_bytes().to_vec());
        assert!(!is_first_entry_encrypted(&mut cursor).unwrap());
    }

    #[test]
    fn test_probe_not_a_zip() {
        let mut cursor = Cursor::new(b"%PDF-1.7 not a zip".to_vec());
        assert!(matches!(
            probe_first_entry(&mut cursor),
            Err(ExtractError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_probe_truncated() {
        let data = header_bytes("a.txt", 0, 0, b"");
        let mut cursor = Cursor::new(data[..20].to_vec());
        assert!(matches!(
            probe_first_entry(&mut cursor),
            Err(ExtractError::Truncated(_))
        ));

        let mut empty = Cursor::new(Vec::new());
        assert!(matches!(
            probe_first_entry(&mut empty),
            Err(ExtractError::Truncated(_))
        ));
    }
}
