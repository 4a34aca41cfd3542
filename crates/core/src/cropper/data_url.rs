//! `data:` URL helpers for committed crops.

use crate::error::{AppError, Result};
use crate::image_processing::OutputBinary;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

/// A base64 `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl(String);

impl DataUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The MIME type embedded in the header.
    pub fn mime(&self) -> Option<&str> {
        parse(&self.0).ok().map(|(mime, _)| mime)
    }
}

impl std::fmt::Display for DataUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodes raw bytes as a base64 data URL.
pub fn to_data_url(bytes: &[u8], mime: &str) -> DataUrl {
    DataUrl(format!("data:{};base64,{}", mime, BASE64.encode(bytes)))
}

/// Decodes a data URL back into a named byte buffer with its embedded MIME type.
///
/// # Errors
///
/// Returns [`AppError::Decode`] if the header is malformed, is not base64,
/// or the payload does not decode.
pub fn to_binary_file(data_url: &str, file_name: impl Into<String>) -> Result<OutputBinary> {
    let (mime, payload) = parse(data_url)?;
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| AppError::decode(format!("invalid base64 payload: {}", e)))?;

    Ok(OutputBinary {
        file_name: file_name.into(),
        mime: mime.to_string(),
        bytes,
    })
}

fn parse(data_url: &str) -> Result<(&str, &str)> {
    let (header, payload) = data_url
        .trim()
        .split_once(',')
        .ok_or_else(|| AppError::decode("data URL has no payload separator"))?;

    let params = header
        .strip_prefix("data:")
        .ok_or_else(|| AppError::decode("missing 'data:' scheme"))?;
    let (mime, encoding) = params
        .split_once(';')
        .ok_or_else(|| AppError::decode("data URL header has no MIME type"))?;

    if mime.is_empty() {
        return Err(AppError::decode("data URL header has no MIME type"));
    }
    if !encoding.split(';').any(|p| p.eq_ignore_ascii_case("base64")) {
        return Err(AppError::decode("only base64 data URLs are supported"));
    }

    Ok((mime, payload))
}
