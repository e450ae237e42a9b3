// src/orchestrator.rs
//! Top-level transformation flow.
//!
//! One [`TransformFlow`] instance owns the UI-facing state machine for one
//! editing session: import a photo through the external picker, analyze and
//! validate it, then run the user-initiated generation. All coordination
//! flags live on the instance, so several flows (several tabs) can run
//! independently in one process.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::{LimitsConfig, PollConfig};
use crate::errors::RestyleError;
use crate::models::{
    Credential, GenerationOutcome, PickerSession, SelectedMediaItem, ValidationResult,
};
use crate::prompt;
use crate::services::image_proxy::{FetchPurpose, ImageFetchProxy, ImageFetcher, ImageUse};
use crate::services::picker::{CancelHandle, PickerApi, PollOutcome, SessionPoller, SharedUiHandle};
use crate::services::{GenerationApi, ImageProcessor, VisionApi};
use crate::validation;

/// UI-facing states of one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowState {
    Idle,
    PickerOpen,
    Analyzing,
    Validated,
    Blocked,
    Generating,
    Generated,
    GenerationFailed,
    Error,
}

/// Collaborators a flow drives, kept behind seams for testing.
#[derive(Clone)]
pub struct FlowDeps {
    pub picker: Arc<dyn PickerApi>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub vision: Arc<dyn VisionApi>,
    pub generator: Arc<dyn GenerationApi>,
}

/// Read-only snapshot of a flow for the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSnapshot {
    pub state: FlowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picker_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    pub warnings: Vec<String>,
    pub hair_labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationOutcome>,
    /// Set once the flow wants the picker popup dismissed.
    pub close_picker: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedImport {
    pub session_id: String,
    pub picker_uri: String,
}

struct FlowInner {
    state: FlowState,
    session_id: Option<String>,
    picker_uri: Option<String>,
    preview_url: Option<String>,
    analysis_url: Option<String>,
    validation: Option<ValidationResult>,
    warnings: Vec<String>,
    hair_labels: Vec<String>,
    error: Option<String>,
    result: Option<GenerationOutcome>,
    /// Bumped on every import/reset; async continuations compare it before
    /// writing, so a stale poll loop cannot resolve into a newer session's
    /// state.
    epoch: u64,
}

impl FlowInner {
    fn new() -> Self {
        Self {
            state: FlowState::Idle,
            session_id: None,
            picker_uri: None,
            preview_url: None,
            analysis_url: None,
            validation: None,
            warnings: Vec::new(),
            hair_labels: Vec::new(),
            error: None,
            result: None,
            epoch: 0,
        }
    }

    fn clear_selection(&mut self) {
        self.preview_url = None;
        self.analysis_url = None;
        self.validation = None;
        self.warnings.clear();
        self.hair_labels.clear();
        self.error = None;
        self.result = None;
    }
}

pub struct TransformFlow {
    deps: FlowDeps,
    poll_config: PollConfig,
    limits: LimitsConfig,
    processor: ImageProcessor,
    inner: Mutex<FlowInner>,
    cancel: std::sync::Mutex<Option<CancelHandle>>,
    ui: std::sync::Mutex<Option<Arc<SharedUiHandle>>>,
}

impl TransformFlow {
    pub fn new(deps: FlowDeps, poll_config: PollConfig, limits: LimitsConfig) -> Self {
        Self {
            deps,
            poll_config,
            limits,
            processor: ImageProcessor::new(),
            inner: Mutex::new(FlowInner::new()),
            cancel: std::sync::Mutex::new(None),
            ui: std::sync::Mutex::new(None),
        }
    }

    /// Start a fresh import: cancel any in-flight poll loop, create a new
    /// picker session and spawn its poll loop. Returns the picker URI for
    /// the browser to open.
    pub async fn start_import(
        self: &Arc<Self>,
        credential: &Credential,
    ) -> Result<StartedImport, RestyleError> {
        // A prior loop must be dead to the flow before the new session
        // exists; its epoch is also invalidated below.
        self.cancel_picker();

        let poller = SessionPoller::new(self.deps.picker.clone(), self.poll_config.clone());
        let session = match poller.create_session(credential).await {
            Ok(session) => session,
            Err(e) => {
                let mut inner = self.inner.lock().await;
                inner.state = FlowState::Error;
                inner.error = Some(e.to_string());
                return Err(e);
            }
        };

        let ui = SharedUiHandle::new();
        let epoch;
        {
            let mut inner = self.inner.lock().await;
            inner.epoch += 1;
            epoch = inner.epoch;
            inner.clear_selection();
            inner.state = FlowState::PickerOpen;
            inner.session_id = Some(session.session_id.clone());
            inner.picker_uri = Some(session.picker_uri.clone());
        }
        *self.cancel.lock().unwrap() = Some(poller.cancel_handle());
        *self.ui.lock().unwrap() = Some(ui.clone());

        let started = StartedImport {
            session_id: session.session_id.clone(),
            picker_uri: session.picker_uri.clone(),
        };

        let flow = self.clone();
        let credential = credential.clone();
        tokio::spawn(async move {
            flow.drive_selection(credential, epoch, poller, session, ui)
                .await;
        });

        Ok(started)
    }

    async fn drive_selection(
        self: Arc<Self>,
        credential: Credential,
        epoch: u64,
        poller: SessionPoller,
        mut session: PickerSession,
        ui: Arc<SharedUiHandle>,
    ) {
        let outcome = poller
            .poll_until_selected(&credential, &mut session, ui.as_ref())
            .await;

        match outcome {
            Ok(PollOutcome::Selected(items)) => match items.into_iter().next() {
                Some(item) => self.handle_selected(&credential, epoch, item).await,
                None => self.enter_idle(epoch).await,
            },
            Ok(PollOutcome::NothingSelected) | Ok(PollOutcome::Cancelled) => {
                self.enter_idle(epoch).await
            }
            Err(e) => self.enter_error(epoch, e.to_string()).await,
        }
    }

    /// Selection automatically flows into fetch, analysis and validation.
    async fn handle_selected(&self, credential: &Credential, epoch: u64, item: SelectedMediaItem) {
        let preview = ImageFetchProxy::resolve_selection(&item, ImageUse::Preview);
        let analysis = ImageFetchProxy::resolve_selection(&item, ImageUse::Analysis);
        let analysis_url = analysis.external_url.clone();
        {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch {
                return;
            }
            inner.state = FlowState::Analyzing;
            inner.preview_url = Some(preview.proxy_path);
            inner.analysis_url = Some(analysis.external_url);
        }

        let analyzed = self.analyze(credential, &analysis_url).await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            return;
        }
        match analyzed {
            Ok((validation_result, quality, hair_labels)) => {
                inner.warnings = validation_result.warnings.clone();
                inner.warnings.extend(quality);
                inner.hair_labels = hair_labels;
                if validation_result.is_valid {
                    inner.state = FlowState::Validated;
                } else {
                    inner.state = FlowState::Blocked;
                    inner.error = validation_result.error_message.clone();
                }
                inner.validation = Some(validation_result);
            }
            Err(e) => {
                warn!("Analysis failed: {e}");
                inner.state = FlowState::Error;
                inner.error = Some(e.to_string());
            }
        }
    }

    async fn analyze(
        &self,
        credential: &Credential,
        analysis_url: &str,
    ) -> Result<(ValidationResult, Vec<String>, Vec<String>), RestyleError> {
        let (bytes, _content_type) = self
            .deps
            .fetcher
            .fetch(analysis_url, credential, FetchPurpose::Pipeline)
            .await?;
        self.processor.validate_image(&bytes)?;

        let analysis = self.deps.vision.annotate(&bytes).await?;
        let result = validation::validate(&analysis);
        let quality = validation::assess_quality(&analysis);
        let hair_labels = validation::extract_hair_labels(&analysis);
        Ok((result, quality, hair_labels))
    }

    /// User-initiated generation, gated by input validation. Collaborator
    /// failures land in the snapshot as the `error` state; only caller
    /// mistakes (bad input, wrong state) are returned as errors.
    pub async fn apply(
        &self,
        credential: &Credential,
        hair_color: &str,
        hair_style: &str,
    ) -> Result<FlowSnapshot, RestyleError> {
        prompt::validate_input(hair_color, hair_style)
            .map_err(|e| RestyleError::InvalidInput(e.to_string()))?;

        let (epoch, instruction, analysis_url) = {
            let mut inner = self.inner.lock().await;
            let ready = matches!(
                inner.state,
                FlowState::Validated | FlowState::Generated | FlowState::GenerationFailed
            );
            if !ready {
                return Err(RestyleError::FlowState(format!(
                    "generation is not available in state {:?}",
                    inner.state
                )));
            }
            let analysis_url = inner
                .analysis_url
                .clone()
                .ok_or_else(|| RestyleError::FlowState("no selected image".into()))?;
            let instruction =
                prompt::build_restyle_prompt(hair_color, hair_style, inner.validation.as_ref());
            inner.state = FlowState::Generating;
            inner.result = None;
            inner.error = None;
            (inner.epoch, instruction, analysis_url)
        };

        let generated = self.generate(credential, &analysis_url, &instruction).await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            return Err(RestyleError::FlowState("flow was reset".into()));
        }
        match generated {
            Ok(outcome) => {
                if outcome.success {
                    info!("Generation succeeded ({})", outcome.model);
                    inner.state = FlowState::Generated;
                } else {
                    // Expected outcome, not a failure of the pipeline.
                    info!("Generation produced no image: {}", outcome.message);
                    inner.state = FlowState::GenerationFailed;
                }
                inner.result = Some(outcome);
            }
            Err(e) => {
                warn!("Generation failed: {e}");
                inner.state = FlowState::Error;
                inner.error = Some(e.to_string());
            }
        }
        Ok(Self::snapshot_of(&inner, &self.ui))
    }

    async fn generate(
        &self,
        credential: &Credential,
        analysis_url: &str,
        instruction: &str,
    ) -> Result<GenerationOutcome, RestyleError> {
        let (bytes, _content_type) = self
            .deps
            .fetcher
            .fetch(analysis_url, credential, FetchPurpose::Pipeline)
            .await?;

        // Inline payloads inflate by ~33% under base64; shrink to leave
        // headroom under the upstream cap.
        let budget = self.limits.max_image_bytes * 3 / 4;
        let prepared = self.processor.shrink_to_budget(&bytes, budget)?;
        self.deps.generator.transform(&prepared, instruction).await
    }

    /// Advisory from the browser that the picker popup closed.
    pub fn picker_closed(&self) {
        if let Some(ui) = self.ui.lock().unwrap().as_ref() {
            ui.mark_closed();
        }
    }

    /// Stop the in-flight poll loop, if any. Synchronous and idempotent.
    pub fn cancel_picker(&self) {
        if let Some(cancel) = self.cancel.lock().unwrap().take() {
            cancel.cancel();
        }
    }

    /// Back to `Idle`, discarding the selection and any results.
    pub async fn reset(&self) {
        self.cancel_picker();
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        inner.clear_selection();
        inner.session_id = None;
        inner.picker_uri = None;
        inner.state = FlowState::Idle;
    }

    pub async fn snapshot(&self) -> FlowSnapshot {
        let inner = self.inner.lock().await;
        Self::snapshot_of(&inner, &self.ui)
    }

    fn snapshot_of(
        inner: &FlowInner,
        ui: &std::sync::Mutex<Option<Arc<SharedUiHandle>>>,
    ) -> FlowSnapshot {
        let close_picker = ui
            .lock()
            .unwrap()
            .as_ref()
            .map(|ui| ui.close_requested())
            .unwrap_or(false);
        FlowSnapshot {
            state: inner.state,
            session_id: inner.session_id.clone(),
            picker_uri: inner.picker_uri.clone(),
            preview_url: inner.preview_url.clone(),
            warnings: inner.warnings.clone(),
            hair_labels: inner.hair_labels.clone(),
            validation: inner.validation.clone(),
            error: inner.error.clone(),
            result: inner.result.clone(),
            close_picker,
        }
    }

    async fn enter_idle(&self, epoch: u64) {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            return;
        }
        inner.clear_selection();
        inner.state = FlowState::Idle;
    }

    async fn enter_error(&self, epoch: u64, message: String) {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            return;
        }
        inner.state = FlowState::Error;
        inner.error = Some(message);
    }
}

/// Live flows by id; one entry per editing session/tab.
#[derive(Default)]
pub struct FlowRegistry {
    flows: RwLock<HashMap<Uuid, Arc<TransformFlow>>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, flow: Arc<TransformFlow>) -> Uuid {
        let id = Uuid::new_v4();
        self.flows.write().await.insert(id, flow);
        id
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<TransformFlow>> {
        self.flows.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &Uuid) -> Option<Arc<TransformFlow>> {
        self.flows.write().await.remove(id)
    }
}
