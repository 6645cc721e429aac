/// Cover image formats the package can carry. Detection works on the bytes
/// themselves; the URL suffix lies often enough (query-string resizers,
/// extensionless CDN paths) that it is never consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
    Gif,
    Svg,
}

impl MediaType {
    pub fn content_type(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Gif => "image/gif",
            MediaType::Svg => "image/svg+xml",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "jpg",
            MediaType::Png => "png",
            MediaType::Gif => "gif",
            MediaType::Svg => "svg",
        }
    }

    /// Sniffs the format from magic numbers, `None` when the bytes match no
    /// supported format.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(MediaType::Jpeg)
        } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(MediaType::Png)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(MediaType::Gif)
        } else if looks_like_svg(data) {
            Some(MediaType::Svg)
        } else {
            None
        }
    }
}

// SVG has no magic number; accept a document whose first tag is <svg>,
// allowing an XML declaration and comments before it.
fn looks_like_svg(data: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&data[..data.len().min(512)]);
    let trimmed = head.trim_start();
    trimmed.starts_with("<svg") || (trimmed.starts_with("<?xml") && head.contains("<svg"))
}

#[test]
fn test_sniffs_raster_formats() {
    assert_eq!(
        Some(MediaType::Jpeg),
        MediaType::sniff(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10])
    );
    assert_eq!(
        Some(MediaType::Png),
        MediaType::sniff(b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR")
    );
    assert_eq!(Some(MediaType::Gif), MediaType::sniff(b"GIF89a\x01\x00"));
}

#[test]
fn test_sniffs_svg() {
    assert_eq!(
        Some(MediaType::Svg),
        MediaType::sniff(b"<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\"/>")
    );
    assert_eq!(Some(MediaType::Svg), MediaType::sniff(b"  <svg/>"));
}

#[test]
fn test_unknown_bytes_are_absent() {
    assert_eq!(None, MediaType::sniff(b"BM6\x00\x00\x00"));
    assert_eq!(None, MediaType::sniff(b""));
}
