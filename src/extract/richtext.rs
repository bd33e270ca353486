//! Rich text / legacy binary document extractor (§4.3).
//!
//! Handles formats with no first-class parser in the dependency stack
//! (RTF, legacy `.doc`, HTML) via a best-effort strings scan: runs of
//! printable ASCII and printable UTF-16LE characters of length >= 4 are
//! treated as text fragments and joined. This is deliberately lossy —
//! it recovers prose from binary containers without parsing their
//! structure, the same tradeoff `strings(1)` makes.

const MIN_RUN_LEN: usize = 4;

pub struct RichTextResult {
    pub text: String,
    pub warnings: Vec<&'static str>,
}

pub fn extract_richtext(bytes: &[u8]) -> RichTextResult {
    if let Some(html_text) = try_strip_html_tags(bytes) {
        return RichTextResult {
            text: html_text,
            warnings: Vec::new(),
        };
    }

    let ascii_runs = scan_ascii_runs(bytes);
    let utf16_runs = scan_utf16le_runs(bytes);

    let mut combined = ascii_runs;
    combined.extend(utf16_runs);

    RichTextResult {
        text: combined.join("\n"),
        warnings: vec!["binary_document_best_effort_scan"],
    }
}

fn try_strip_html_tags(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    let lower = text.to_ascii_lowercase();
    if !(lower.contains("<html") || lower.contains("<!doctype html") || lower.contains("<body")) {
        return None;
    }
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    Some(out.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn scan_ascii_runs(bytes: &[u8]) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for &b in bytes {
        if (0x20..0x7f).contains(&b) {
            current.push(b as char);
        } else {
            if current.len() >= MIN_RUN_LEN {
                runs.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if current.len() >= MIN_RUN_LEN {
        runs.push(current);
    }
    runs
}

fn scan_utf16le_runs(bytes: &[u8]) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current: Vec<u16> = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        let unit = u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        if (0x20..0x7f).contains(&unit) {
            current.push(unit);
        } else if !current.is_empty() {
            flush_utf16_run(&mut current, &mut runs);
        }
        i += 2;
    }
    flush_utf16_run(&mut current, &mut runs);
    runs
}

fn flush_utf16_run(current: &mut Vec<u16>, runs: &mut Vec<String>) {
    if current.len() >= MIN_RUN_LEN {
        if let Ok(s) = String::from_utf16(current) {
            runs.push(s);
        }
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_html_tags() {
        let html = b"<html><body><p>hello world</p></body></html>";
        let result = extract_richtext(html);
        assert_eq!(result.text, "hello world");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn scans_ascii_runs_in_binary_blob() {
        let mut blob = vec![0u8, 1, 2, 3];
        blob.extend_from_slice(b"hello there");
        blob.extend_from_slice(&[0xff, 0xfe, 0x00]);
        let result = extract_richtext(&blob);
        assert!(result.text.contains("hello there"));
        assert_eq!(result.warnings, vec!["binary_document_best_effort_scan"]);
    }

    #[test]
    fn short_runs_are_discarded() {
        let blob = vec![0u8, b'h', b'i', 0u8];
        let result = extract_richtext(&blob);
        assert!(result.text.is_empty());
    }

    #[test]
    fn scans_utf16le_runs() {
        let units: Vec<u16> = "word".encode_utf16().collect();
        let mut bytes = Vec::new();
        for u in units {
            bytes.extend_from_slice(&u.to_le_bytes());
        }
        let result = extract_richtext(&bytes);
        assert!(result.text.contains("word"));
    }
}
