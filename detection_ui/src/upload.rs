use image::{ImageFormat, RgbImage};
use std::{io::Cursor, path::Path};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("Unsupported file type `{0}`. Please upload one of: {1}")]
    UnsupportedExtension(String, String),
    #[error("The file is not a valid {expected} image: {reason}")]
    Undecodable { expected: String, reason: String },
}

impl UploadError {
    pub fn kind(&self) -> &'static str {
        "UnsupportedFormatError"
    }
}

/// File extensions the upload control accepts, lowercased, without dots.
#[derive(Debug, Clone)]
pub struct AcceptedFormats {
    extensions: Vec<String>,
}

impl AcceptedFormats {
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        let extensions = extensions
            .iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        Self { extensions }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Value for an `<input type="file" accept=...>` attribute.
    pub fn accept_attribute(&self) -> String {
        self.extensions
            .iter()
            .map(|ext| format!(".{}", ext))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn listing(&self) -> String {
        self.extensions.join(", ")
    }

    fn format_for(&self, file_name: &str) -> Result<ImageFormat, UploadError> {
        let extension = Path::new(file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if !self.extensions.contains(&extension) {
            return Err(UploadError::UnsupportedExtension(
                file_name.to_string(),
                self.listing(),
            ));
        }

        ImageFormat::from_extension(&extension)
            .ok_or_else(|| UploadError::UnsupportedExtension(file_name.to_string(), self.listing()))
    }

    fn admits(&self, format: ImageFormat) -> bool {
        format
            .extensions_str()
            .iter()
            .any(|ext| self.extensions.iter().any(|accepted| accepted.as_str() == *ext))
    }
}

/// Checks the extension, then sniffs and decodes the content. Anything that
/// is not 8-bit RGB is converted to it.
pub fn decode_upload(
    file_name: &str,
    image_data: &[u8],
    formats: &AcceptedFormats,
) -> Result<RgbImage, UploadError> {
    let expected = formats.format_for(file_name)?;
    let undecodable = |reason: String| UploadError::Undecodable {
        expected: format!("{:?}", expected).to_uppercase(),
        reason,
    };

    let image_reader = image::ImageReader::new(Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| undecodable(e.to_string()))?;

    match image_reader.format() {
        Some(format) if formats.admits(format) => {}
        Some(format) => {
            return Err(undecodable(format!(
                "content is {:?}, which is not accepted",
                format
            )))
        }
        None => return Err(undecodable("unrecognised content".to_string())),
    }

    let decoded = image_reader
        .decode()
        .map_err(|e| undecodable(e.to_string()))?;

    tracing::debug!(
        "Decoded {} ({}x{}, {:?})",
        file_name,
        decoded.width(),
        decoded.height(),
        decoded.color()
    );

    Ok(decoded.to_rgb8())
}
