//! Container format detection for captured clips.
//!
//! Clips arrive from heterogeneous capture paths (different browsers record
//! WebM, MP4, or QuickTime), so scratch files must be named with the right
//! extension before the engine sees them. Detection prefers magic bytes over
//! the declared MIME type; an ambiguous input falls back to an mp4 guess.

use thiserror::Error;

/// Container format of a raw clip payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    /// MPEG-4 Part 14 container (.mp4)
    Mp4,
    /// QuickTime movie container (.mov)
    Mov,
    /// WebM container (.webm)
    WebM,
    /// Matroska container (.mkv)
    Mkv,
    /// Container format could not be determined
    Unknown,
}

/// Errors that can occur during format detection.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Detection requires at least 12 bytes of file header.
    #[error("insufficient data for format detection: need at least 12 bytes, got {0}")]
    InsufficientData(usize),
}

/// Minimum number of header bytes needed for reliable detection.
pub const MIN_DETECTION_BYTES: usize = 12;

/// Detects the container format from file header bytes.
///
/// # Errors
///
/// - `ContainerError::InsufficientData` - Less than 12 bytes provided
pub fn detect_container_format(data: &[u8]) -> Result<ContainerFormat, ContainerError> {
    if data.len() < MIN_DETECTION_BYTES {
        return Err(ContainerError::InsufficientData(data.len()));
    }

    // ISO base media: size prefix then "ftyp" and a brand.
    if &data[4..8] == b"ftyp" {
        let brand = &data[8..12];
        if brand.starts_with(b"qt") {
            return Ok(ContainerFormat::Mov);
        }
        return Ok(ContainerFormat::Mp4);
    }

    // EBML header shared by WebM and Matroska; the DocType string inside the
    // header tells them apart.
    if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        let head = &data[..data.len().min(64)];
        if contains(head, b"webm") {
            return Ok(ContainerFormat::WebM);
        }
        return Ok(ContainerFormat::Mkv);
    }

    Ok(ContainerFormat::Unknown)
}

/// Resolves the scratch-file extension for a payload, combining magic-byte
/// sniffing with the declared MIME type. Ambiguous inputs default to mp4.
pub fn sniff_extension(data: &[u8], declared_mime: Option<&str>) -> &'static str {
    if let Ok(format) = detect_container_format(data)
        && format != ContainerFormat::Unknown
    {
        return extension(format);
    }
    if let Some(mime) = declared_mime {
        return extension(from_mime(mime));
    }
    extension(ContainerFormat::Unknown)
}

/// File extension conventionally used for a container format.
pub fn extension(format: ContainerFormat) -> &'static str {
    match format {
        ContainerFormat::Mp4 => "mp4",
        ContainerFormat::Mov => "mov",
        ContainerFormat::WebM => "webm",
        ContainerFormat::Mkv => "mkv",
        ContainerFormat::Unknown => "mp4", // container guess for ambiguous inputs
    }
}

/// MIME type served for a container format.
pub fn mime_type(format: ContainerFormat) -> &'static str {
    match format {
        ContainerFormat::Mp4 | ContainerFormat::Unknown => "video/mp4",
        ContainerFormat::Mov => "video/quicktime",
        ContainerFormat::WebM => "video/webm",
        ContainerFormat::Mkv => "video/x-matroska",
    }
}

/// Maps a declared MIME type to a container format.
pub fn from_mime(mime: &str) -> ContainerFormat {
    match mime.split(';').next().unwrap_or(mime).trim() {
        "video/mp4" => ContainerFormat::Mp4,
        "video/quicktime" => ContainerFormat::Mov,
        "video/webm" => ContainerFormat::WebM,
        "video/x-matroska" => ContainerFormat::Mkv,
        _ => ContainerFormat::Unknown,
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp4_header() -> Vec<u8> {
        let mut data = vec![0x00, 0x00, 0x00, 0x20];
        data.extend_from_slice(b"ftypisom");
        data.extend_from_slice(&[0u8; 8]);
        data
    }

    #[test]
    fn test_detects_mp4_from_ftyp_brand() {
        assert_eq!(
            detect_container_format(&mp4_header()).unwrap(),
            ContainerFormat::Mp4
        );
    }

    #[test]
    fn test_detects_mov_from_quicktime_brand() {
        let mut data = vec![0x00, 0x00, 0x00, 0x14];
        data.extend_from_slice(b"ftypqt  ");
        data.extend_from_slice(&[0u8; 8]);
        assert_eq!(
            detect_container_format(&data).unwrap(),
            ContainerFormat::Mov
        );
    }

    #[test]
    fn test_detects_webm_from_ebml_doctype() {
        let mut data = vec![0x1A, 0x45, 0xDF, 0xA3];
        data.extend_from_slice(b"\x42\x82\x84webm");
        data.extend_from_slice(&[0u8; 8]);
        assert_eq!(
            detect_container_format(&data).unwrap(),
            ContainerFormat::WebM
        );
    }

    #[test]
    fn test_short_header_is_insufficient() {
        let result = detect_container_format(b"short");
        assert!(matches!(result, Err(ContainerError::InsufficientData(5))));
    }

    #[test]
    fn test_sniff_prefers_magic_bytes_over_declared_mime() {
        assert_eq!(sniff_extension(&mp4_header(), Some("video/webm")), "mp4");
    }

    #[test]
    fn test_sniff_falls_back_to_declared_mime() {
        assert_eq!(sniff_extension(&[0u8; 16], Some("video/webm")), "webm");
    }

    #[test]
    fn test_ambiguous_input_defaults_to_mp4() {
        assert_eq!(sniff_extension(&[0u8; 16], None), "mp4");
        assert_eq!(sniff_extension(b"x", Some("application/octet-stream")), "mp4");
    }
}
