/// Inclusive byte range resolved against a known body size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

fn digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parses a single `bytes=start-end?` range. Suffix ranges (`bytes=-500`),
/// multiple ranges and unsatisfiable ranges are rejected, which makes the
/// caller fall back to the network.
pub fn parse_range(header: &str, size: u64) -> Option<ByteRange> {
    const PREFIX: &str = "bytes=";
    let prefix = header.get(..PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(PREFIX) {
        return None;
    }
    let (start, end) = header[PREFIX.len()..].split_once('-')?;
    let start = digits(start)?;
    let last = size.checked_sub(1)?;
    let end = if end.is_empty() {
        last
    } else {
        digits(end)?.min(last)
    };
    if end < start {
        return None;
    }
    Some(ByteRange { start, end })
}
