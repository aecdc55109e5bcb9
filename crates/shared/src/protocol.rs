use serde::{Deserialize, Serialize};

use crate::domain::{CapturedImage, ModelArtifact, ProcessedImage, RequestId};

pub const MODEL_FIELD: &str = "model";
pub const IMAGE_FIELD_PREFIX: &str = "image_";

pub fn image_field_name(index: usize) -> String {
    format!("{IMAGE_FIELD_PREFIX}{index}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionImage {
    pub field_name: String,
    pub image: CapturedImage,
}

/// Everything sent for one comparison request: the model plus the comparison
/// images in capture order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonSubmission {
    pub request_id: RequestId,
    pub model: ModelArtifact,
    pub images: Vec<SubmissionImage>,
}

impl ComparisonSubmission {
    pub fn new(request_id: RequestId, model: ModelArtifact, images: &[CapturedImage]) -> Self {
        let images = images
            .iter()
            .enumerate()
            .map(|(index, image)| SubmissionImage {
                field_name: image_field_name(index),
                image: image.clone(),
            })
            .collect();
        Self {
            request_id,
            model,
            images,
        }
    }

    pub fn field_count(&self) -> usize {
        self.images.len() + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareResponse {
    pub processed_image: ProcessedImage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceErrorBody {
    pub error: String,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
