use crate::error::{ProviderError, Result};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use std::sync::Arc;

/// Image handed to an embedding or extraction provider.
#[derive(Clone, Debug)]
pub enum ImageSource {
    Url(String),
    Bytes { data: Arc<[u8]>, mime: &'static str },
}

impl ImageSource {
    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        let mime = sniff_mime(&data);
        Self::Bytes { data, mime }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// URL as-is, or the bytes rendered as a base64 data URI.
    pub fn to_uri(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Bytes { data, mime } => format!("data:{mime};base64,{}", STANDARD.encode(data)),
        }
    }

    /// URL as-is, or the bare base64 payload without a data URI prefix.
    pub fn to_url_or_base64(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Bytes { data, .. } => STANDARD.encode(data),
        }
    }

    pub fn len_hint(&self) -> usize {
        match self {
            Self::Url(url) => url.len(),
            Self::Bytes { data, .. } => data.len(),
        }
    }
}

pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Strips a leading `data:<mime>;base64,` prefix, if any.
pub fn strip_data_uri_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("data:") {
        return trimmed;
    }
    match trimmed.find(";base64,") {
        Some(pos) => &trimmed[pos + ";base64,".len()..],
        None => trimmed,
    }
}

/// Decodes a base64 query image, optionally prefixed with a data URI header.
pub fn decode_base64_image(raw: &str) -> Result<Vec<u8>> {
    let payload: String = strip_data_uri_prefix(raw)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if payload.is_empty() {
        return Err(ProviderError::InvalidInput("image payload is empty".to_string()));
    }
    let trimmed = payload.trim_end_matches('=');
    let bytes = STANDARD_NO_PAD
        .decode(trimmed)
        .map_err(|err| ProviderError::InvalidInput(format!("image is not valid base64: {err}")))?;
    if bytes.is_empty() {
        return Err(ProviderError::InvalidInput("image payload is empty".to_string()));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn data_uri_prefix_is_stripped() {
        assert_eq!(strip_data_uri_prefix("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_uri_prefix("  AAAA "), "AAAA");
        assert_eq!(strip_data_uri_prefix("data:text/plain,hi"), "data:text/plain,hi");
    }

    #[test]
    fn decodes_prefixed_and_bare_payloads() {
        let encoded = STANDARD.encode(PNG_HEADER);
        let prefixed = format!("data:image/png;base64,{encoded}");
        assert_eq!(decode_base64_image(&encoded).unwrap(), PNG_HEADER.to_vec());
        assert_eq!(decode_base64_image(&prefixed).unwrap(), PNG_HEADER.to_vec());

        let unpadded = encoded.trim_end_matches('=');
        assert_eq!(decode_base64_image(unpadded).unwrap(), PNG_HEADER.to_vec());
    }

    #[test]
    fn rejects_empty_and_garbage_payloads() {
        assert!(matches!(
            decode_base64_image("data:image/png;base64,"),
            Err(ProviderError::InvalidInput(_))
        ));
        assert!(matches!(
            decode_base64_image("not base64 at all!"),
            Err(ProviderError::InvalidInput(_))
        ));
    }

    #[test]
    fn bytes_source_renders_data_uri_with_sniffed_mime() {
        let source = ImageSource::from_bytes(PNG_HEADER.to_vec());
        assert!(source.to_uri().starts_with("data:image/png;base64,"));
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(sniff_mime(b"hello"), "application/octet-stream");
    }
}
