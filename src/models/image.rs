use serde::{Deserialize, Serialize};

/// Where a captured image came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ImageOrigin {
    Camera,
    File,
}

/// In-memory image owned by a capture session until it is discarded.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
    pub origin: ImageOrigin,
}

impl CapturedImage {
    pub fn new(
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
        origin: ImageOrigin,
    ) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            file_name: file_name.into(),
            origin,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Extension used when naming the stored object.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/heic" | "image/heif" => "heic",
            "application/pdf" => "pdf",
            _ => "jpg",
        }
    }
}

// Payloads can be several megabytes; keep them out of log lines.
impl std::fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedImage")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("file_name", &self.file_name)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Image summary exposed in state snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub byte_len: usize,
    pub mime_type: String,
    pub file_name: String,
    pub origin: ImageOrigin,
}

impl From<&CapturedImage> for ImageSummary {
    fn from(image: &CapturedImage) -> Self {
        Self {
            byte_len: image.len(),
            mime_type: image.mime_type.clone(),
            file_name: image.file_name.clone(),
            origin: image.origin,
        }
    }
}
