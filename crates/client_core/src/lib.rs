use std::{collections::BTreeSet, path::Path, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{CapturedImage, ComparisonResult, Mode, ModelArtifact, ProcessedImage, RequestId},
    error::{Notice, NoticeKind},
    protocol::ComparisonSubmission,
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod comparison_client;
pub mod settings;
pub use comparison_client::HttpComparisonService;
pub use settings::{load_settings, ClientSettings, ImagePartEncoding};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn activate(&self) -> Result<()>;
    async fn deactivate(&self) -> Result<()>;
    async fn capture_frame(&self) -> Result<CapturedImage>;
}

pub struct MissingFrameSource;

#[async_trait]
impl FrameSource for MissingFrameSource {
    async fn activate(&self) -> Result<()> {
        Err(anyhow!("no camera attached"))
    }

    async fn deactivate(&self) -> Result<()> {
        Ok(())
    }

    async fn capture_frame(&self) -> Result<CapturedImage> {
        Err(anyhow!("no camera attached"))
    }
}

#[async_trait]
pub trait ComparisonService: Send + Sync {
    async fn compare(&self, submission: ComparisonSubmission) -> Result<ProcessedImage>;
}

pub struct MissingComparisonService;

#[async_trait]
impl ComparisonService for MissingComparisonService {
    async fn compare(&self, _submission: ComparisonSubmission) -> Result<ProcessedImage> {
        Err(anyhow!("comparison service is unavailable"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("capture failed: camera not ready")]
    CameraNotReady,
    #[error("Please capture images and upload a model for comparison.")]
    NothingToCompare {
        missing_images: bool,
        missing_model: bool,
    },
    #[error("failed to read model file {path}: {reason}")]
    ModelUnreadable { path: String, reason: String },
}

impl SessionError {
    pub fn notice(&self) -> Notice {
        let kind = match self {
            SessionError::CameraNotReady | SessionError::ModelUnreadable { .. } => {
                NoticeKind::ResourceUnavailable
            }
            SessionError::NothingToCompare { .. } => NoticeKind::PreconditionNotMet,
        };
        Notice::new(kind, self.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    ModeChanged(Mode),
    WebcamChanged(bool),
    ImageCaptured {
        mode: Mode,
        index: usize,
    },
    ImagesCleared(Mode),
    ModelUploaded {
        filename: String,
    },
    ComparisonIssued {
        request_id: RequestId,
        image_count: usize,
    },
    ComparisonResolved(ComparisonResult),
    StaleComparisonDiscarded {
        request_id: RequestId,
    },
    Notice(Notice),
}

#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub mode: Mode,
    pub testing_images: Vec<CapturedImage>,
    pub comparison_images: Vec<CapturedImage>,
    pub webcam_active: bool,
    pub model_filename: Option<String>,
    pub comparison_result: Option<ComparisonResult>,
    pub pending_requests: Vec<RequestId>,
}

impl SessionSnapshot {
    pub fn active_images(&self) -> &[CapturedImage] {
        match self.mode {
            Mode::Testing => &self.testing_images,
            Mode::Comparison => &self.comparison_images,
        }
    }

    pub fn has_model(&self) -> bool {
        self.model_filename.is_some()
    }
}

#[derive(Default)]
struct SessionState {
    mode: Mode,
    testing_images: Vec<CapturedImage>,
    comparison_images: Vec<CapturedImage>,
    webcam_active: bool,
    model: Option<ModelArtifact>,
    comparison_result: Option<ComparisonResult>,
    last_request_id: RequestId,
    pending_requests: BTreeSet<RequestId>,
}

impl SessionState {
    fn images_mut(&mut self, mode: Mode) -> &mut Vec<CapturedImage> {
        match mode {
            Mode::Testing => &mut self.testing_images,
            Mode::Comparison => &mut self.comparison_images,
        }
    }
}

pub struct ComparisonTicket {
    pub request_id: RequestId,
    task: JoinHandle<()>,
}

impl ComparisonTicket {
    pub async fn resolved(self) {
        if let Err(err) = self.task.await {
            warn!(request_id = %self.request_id, error = %err, "comparison task aborted");
        }
    }
}

pub struct SessionController {
    settings: ClientSettings,
    frame_source: Arc<dyn FrameSource>,
    comparison_service: Arc<dyn ComparisonService>,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(settings: ClientSettings) -> Arc<Self> {
        let service = Arc::new(HttpComparisonService::from_settings(&settings));
        Self::new_with_dependencies(settings, Arc::new(MissingFrameSource), service)
    }

    pub fn new_with_frame_source(
        settings: ClientSettings,
        frame_source: Arc<dyn FrameSource>,
    ) -> Arc<Self> {
        let service = Arc::new(HttpComparisonService::from_settings(&settings));
        Self::new_with_dependencies(settings, frame_source, service)
    }

    pub fn new_with_dependencies(
        settings: ClientSettings,
        frame_source: Arc<dyn FrameSource>,
        comparison_service: Arc<dyn ComparisonService>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            settings,
            frame_source,
            comparison_service,
            inner: Mutex::new(SessionState::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let guard = self.inner.lock().await;
        SessionSnapshot {
            mode: guard.mode,
            testing_images: guard.testing_images.clone(),
            comparison_images: guard.comparison_images.clone(),
            webcam_active: guard.webcam_active,
            model_filename: guard.model.as_ref().map(|model| model.filename.clone()),
            comparison_result: guard.comparison_result.clone(),
            pending_requests: guard.pending_requests.iter().copied().collect(),
        }
    }

    pub async fn mode(&self) -> Mode {
        self.inner.lock().await.mode
    }

    pub async fn is_webcam_active(&self) -> bool {
        self.inner.lock().await.webcam_active
    }

    pub async fn comparison_result(&self) -> Option<ComparisonResult> {
        self.inner.lock().await.comparison_result.clone()
    }

    pub async fn toggle_webcam(&self) -> bool {
        let active = {
            let mut guard = self.inner.lock().await;
            guard.webcam_active = !guard.webcam_active;
            guard.webcam_active
        };

        let outcome = if active {
            self.frame_source.activate().await
        } else {
            self.frame_source.deactivate().await
        };
        if let Err(err) = outcome {
            warn!(active, error = %err, "frame source did not follow webcam toggle");
        }

        debug!(active, "webcam toggled");
        let _ = self.events.send(SessionEvent::WebcamChanged(active));
        active
    }

    pub async fn capture_photo(&self) -> Result<usize, SessionError> {
        if !self.inner.lock().await.webcam_active {
            return Err(self.raise(SessionError::CameraNotReady));
        }

        let image = match self.frame_source.capture_frame().await {
            Ok(image) => image,
            Err(err) => {
                warn!(error = %err, "frame source could not deliver a frame");
                return Err(self.raise(SessionError::CameraNotReady));
            }
        };

        let (mode, index) = {
            let mut guard = self.inner.lock().await;
            // Webcam may have been switched off (or the mode toggled) while
            // the frame was in flight.
            if !guard.webcam_active {
                drop(guard);
                debug!("dropping frame captured after webcam went inactive");
                return Err(self.raise(SessionError::CameraNotReady));
            }
            let mode = guard.mode;
            let images = guard.images_mut(mode);
            images.push(image);
            let index = images.len() - 1;
            guard.webcam_active = false;
            (mode, index)
        };

        if let Err(err) = self.frame_source.deactivate().await {
            warn!(error = %err, "frame source did not deactivate after capture");
        }

        info!(%mode, index, "captured photo");
        let _ = self.events.send(SessionEvent::ImageCaptured { mode, index });
        let _ = self.events.send(SessionEvent::WebcamChanged(false));
        Ok(index)
    }

    pub async fn upload_model(&self, artifact: ModelArtifact) {
        let filename = artifact.filename.clone();
        info!(%filename, size_bytes = artifact.size_bytes(), "model uploaded");
        self.inner.lock().await.model = Some(artifact);
        let _ = self.events.send(SessionEvent::ModelUploaded { filename });
    }

    pub async fn upload_model_from_path(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                return Err(self.raise(SessionError::ModelUnreadable {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                }));
            }
        };
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.upload_model(ModelArtifact::new(filename, bytes)).await;
        Ok(())
    }

    pub async fn clear_testing_images(&self) {
        self.clear_images(Mode::Testing).await;
    }

    pub async fn clear_comparison_images(&self) {
        self.clear_images(Mode::Comparison).await;
    }

    async fn clear_images(&self, mode: Mode) {
        let cleared = {
            let mut guard = self.inner.lock().await;
            let images = guard.images_mut(mode);
            let cleared = images.len();
            images.clear();
            cleared
        };
        debug!(%mode, cleared, "cleared images");
        let _ = self.events.send(SessionEvent::ImagesCleared(mode));
    }

    // Testing -> Comparison drops the testing images; the reverse keeps them.
    pub async fn toggle_mode(&self) -> Mode {
        let (mode, was_active) = {
            let mut guard = self.inner.lock().await;
            if guard.mode == Mode::Testing {
                guard.testing_images.clear();
            }
            guard.mode = guard.mode.toggled();
            let was_active = guard.webcam_active;
            guard.webcam_active = false;
            (guard.mode, was_active)
        };

        if was_active {
            if let Err(err) = self.frame_source.deactivate().await {
                warn!(error = %err, "frame source did not deactivate on mode switch");
            }
        }

        info!(%mode, "mode switched");
        let _ = self.events.send(SessionEvent::ModeChanged(mode));
        if was_active {
            let _ = self.events.send(SessionEvent::WebcamChanged(false));
        }
        mode
    }

    /// Returns as soon as the request is issued; outcomes bind in the order
    /// they resolve, not the order they were issued.
    pub async fn compare_images(self: &Arc<Self>) -> Result<ComparisonTicket, SessionError> {
        let submission = {
            let mut guard = self.inner.lock().await;
            let missing_images = guard.comparison_images.is_empty();
            match guard.model.clone() {
                Some(model) if !missing_images => {
                    let request_id = guard.last_request_id.next();
                    guard.last_request_id = request_id;
                    guard.pending_requests.insert(request_id);
                    ComparisonSubmission::new(request_id, model, &guard.comparison_images)
                }
                model => {
                    drop(guard);
                    return Err(self.raise(SessionError::NothingToCompare {
                        missing_images,
                        missing_model: model.is_none(),
                    }));
                }
            }
        };

        let request_id = submission.request_id;
        let image_count = submission.images.len();
        info!(%request_id, images = image_count, "issuing comparison request");
        let _ = self.events.send(SessionEvent::ComparisonIssued {
            request_id,
            image_count,
        });

        let controller = Arc::clone(self);
        let timeout = self.settings.request_timeout;
        let task = tokio::spawn(async move {
            let call = controller.comparison_service.compare(submission);
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(anyhow!("comparison request timed out after {limit:?}")),
                },
                None => call.await,
            };
            controller.bind_comparison_outcome(request_id, outcome).await;
        });

        Ok(ComparisonTicket { request_id, task })
    }

    async fn bind_comparison_outcome(&self, request_id: RequestId, outcome: Result<ProcessedImage>) {
        let result = match outcome {
            Ok(image) => ComparisonResult::succeeded(request_id, image),
            Err(err) => {
                warn!(%request_id, error = %format!("{err:#}"), "comparison request failed");
                ComparisonResult::failed(request_id, format!("{err:#}"))
            }
        };

        let bound = {
            let mut guard = self.inner.lock().await;
            guard.pending_requests.remove(&request_id);
            let superseded = self.settings.discard_stale_results
                && guard
                    .comparison_result
                    .as_ref()
                    .is_some_and(|current| current.request_id > request_id);
            if !superseded {
                guard.comparison_result = Some(result.clone());
            }
            !superseded
        };

        if !bound {
            info!(%request_id, "discarding stale comparison outcome");
            let _ = self
                .events
                .send(SessionEvent::StaleComparisonDiscarded { request_id });
            return;
        }

        info!(%request_id, success = result.is_success(), "comparison resolved");
        let failure = result.error.clone();
        let _ = self.events.send(SessionEvent::ComparisonResolved(result));
        if let Some(message) = failure {
            let _ = self.events.send(SessionEvent::Notice(Notice::new(
                NoticeKind::RequestFailure,
                message,
            )));
        }
    }

    fn raise(&self, err: SessionError) -> SessionError {
        debug!(error = %err, "session notice");
        let _ = self.events.send(SessionEvent::Notice(err.notice()));
        err
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
