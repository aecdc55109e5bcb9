use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const JPEG_MIME: &str = "image/jpeg";

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(RequestId);

impl RequestId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Testing,
    Comparison,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::Testing => Mode::Comparison,
            Mode::Comparison => Mode::Testing,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Testing => "testing",
            Mode::Comparison => "comparison",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A still frame grabbed from the camera. Never mutated once captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub captured_at: DateTime<Utc>,
}

impl CapturedImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            captured_at: Utc::now(),
        }
    }

    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self::new(bytes, JPEG_MIME)
    }

    pub fn file_extension(&self) -> &str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/bmp" => "bmp",
            _ => "bin",
        }
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            STANDARD.encode(&self.bytes)
        )
    }
}

/// Opaque model blob supplied by the operator. Not inspected client-side.
#[derive(Clone, PartialEq, Eq)]
pub struct ModelArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ModelArtifact {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("filename", &self.filename)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

/// Image reference returned by the comparison service, displayable as-is
/// (data URI or URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessedImage(pub String);

impl ProcessedImage {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_image: Option<ProcessedImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub resolved_at: DateTime<Utc>,
}

impl ComparisonResult {
    pub fn succeeded(request_id: RequestId, processed_image: ProcessedImage) -> Self {
        Self {
            request_id,
            processed_image: Some(processed_image),
            error: None,
            resolved_at: Utc::now(),
        }
    }

    pub fn failed(request_id: RequestId, error: impl Into<String>) -> Self {
        Self {
            request_id,
            processed_image: None,
            error: Some(error.into()),
            resolved_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
