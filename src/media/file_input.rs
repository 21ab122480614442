use thiserror::Error;

use crate::models::{CapturedImage, ImageOrigin};

/// A file picked through the upload input, before validation.
#[derive(Clone)]
pub struct SelectedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

impl std::fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Why a selected file never entered the session. The message is user-facing.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FileRejection {
    #[error("The selected file is empty. Please choose another photo.")]
    Empty,
    #[error("Please choose an image file (JPG, PNG or HEIC).")]
    NotAnImage { mime_type: String },
    #[error("This photo is {size_mb:.1} MB. Please choose an image under {limit_mb} MB.")]
    TooLarge { size_mb: f64, limit_mb: usize },
}

pub fn validate_file(file: SelectedFile, max_bytes: usize) -> Result<CapturedImage, FileRejection> {
    if file.bytes.is_empty() {
        return Err(FileRejection::Empty);
    }

    let mime_type = file.mime_type.trim().to_ascii_lowercase();
    if !mime_type.starts_with("image/") {
        return Err(FileRejection::NotAnImage { mime_type });
    }

    if file.bytes.len() > max_bytes {
        return Err(FileRejection::TooLarge {
            size_mb: file.bytes.len() as f64 / (1024.0 * 1024.0),
            limit_mb: max_bytes / (1024 * 1024),
        });
    }

    Ok(CapturedImage::new(file.bytes, mime_type, file.name, ImageOrigin::File))
}
