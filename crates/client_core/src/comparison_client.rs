//! HTTP client for the remote comparison service.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::{
    domain::ProcessedImage,
    protocol::{CompareResponse, ComparisonSubmission, ServiceErrorBody, MODEL_FIELD},
};
use tracing::{debug, warn};

use crate::{
    settings::{ClientSettings, ImagePartEncoding},
    ComparisonService,
};

const MODEL_MIME: &str = "application/octet-stream";

pub struct HttpComparisonService {
    http: Client,
    compare_url: String,
    image_encoding: ImagePartEncoding,
}

impl HttpComparisonService {
    pub fn new(compare_url: impl Into<String>, image_encoding: ImagePartEncoding) -> Self {
        Self {
            http: Client::new(),
            compare_url: compare_url.into(),
            image_encoding,
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(settings.compare_url.clone(), settings.image_encoding)
    }

    fn build_form(&self, submission: ComparisonSubmission) -> Result<Form> {
        let model = Part::bytes(submission.model.bytes)
            .file_name(submission.model.filename)
            .mime_str(MODEL_MIME)?;
        let mut form = Form::new().part(MODEL_FIELD, model);

        for entry in submission.images {
            form = match self.image_encoding {
                ImagePartEncoding::Binary => {
                    let file_name = format!(
                        "{}.{}",
                        entry.field_name,
                        entry.image.file_extension()
                    );
                    let part = Part::bytes(entry.image.bytes)
                        .file_name(file_name)
                        .mime_str(&entry.image.mime_type)
                        .with_context(|| {
                            format!("invalid image mime type {:?}", entry.image.mime_type)
                        })?;
                    form.part(entry.field_name, part)
                }
                ImagePartEncoding::DataUri => {
                    let data_uri = entry.image.to_data_uri();
                    form.text(entry.field_name, data_uri)
                }
            };
        }

        Ok(form)
    }
}

#[async_trait]
impl ComparisonService for HttpComparisonService {
    async fn compare(&self, submission: ComparisonSubmission) -> Result<ProcessedImage> {
        let request_id = submission.request_id;
        let image_count = submission.images.len();
        let form = self.build_form(submission)?;

        debug!(%request_id, images = image_count, url = %self.compare_url, "posting comparison");
        let response = self
            .http
            .post(&self.compare_url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("failed to reach comparison service at {}", self.compare_url))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%request_id, %status, "comparison service rejected request");
            match response.json::<ServiceErrorBody>().await {
                Ok(detail) => bail!("comparison service returned {status}: {}", detail.error),
                Err(_) => bail!("comparison service returned {status}"),
            }
        }

        let parsed: CompareResponse = response
            .json()
            .await
            .context("malformed comparison response")?;
        if parsed.processed_image.as_str().trim().is_empty() {
            bail!("malformed comparison response: empty processed_image");
        }
        Ok(parsed.processed_image)
    }
}

#[cfg(test)]
#[path = "tests/comparison_client_tests.rs"]
mod tests;
