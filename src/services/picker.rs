// src/services/picker.rs
//! Session-based selection handshake against the external picker service.
//!
//! Flow: create a session, hand the picker URI to the browser, then poll the
//! session until the user finishes selecting (or the wait is bounded off).
//! The popup-closed signal is advisory only; completion is authoritative from
//! the polled session state, because closing races with the server recording
//! the selection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use tokio::time::sleep;

use crate::config::PollConfig;
use crate::errors::RestyleError;
use crate::models::{
    Credential, PickedMediaItem, PickerSession, PollResponse, SelectedMediaItem, SessionCreated,
    SessionState,
};

/// Upstream picker endpoints, kept behind a seam so the poll loop can be
/// exercised without the network.
#[async_trait]
pub trait PickerApi: Send + Sync {
    async fn create_session(&self, credential: &Credential) -> Result<SessionCreated, RestyleError>;

    async fn poll_session(
        &self,
        credential: &Credential,
        session_id: &str,
    ) -> Result<PollResponse, RestyleError>;

    async fn list_selected(
        &self,
        credential: &Credential,
        session_id: &str,
    ) -> Result<Vec<PickedMediaItem>, RestyleError>;
}

/// Advisory view of the external picker window. `is_closed` is a heartbeat,
/// not a hard stop; `close` asks the hosting UI to dismiss the window.
pub trait PickerUiHandle: Send + Sync {
    fn is_closed(&self) -> bool;
    fn close(&self);
}

/// Shared flag pair backing [`PickerUiHandle`] for the HTTP surface: the
/// browser reports closure, the poll loop requests it.
#[derive(Debug, Default)]
pub struct SharedUiHandle {
    closed: AtomicBool,
    close_requested: AtomicBool,
}

impl SharedUiHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }
}

impl PickerUiHandle for SharedUiHandle {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.close_requested.store(true, Ordering::SeqCst);
    }
}

/// Cloneable cancellation flag for one poll loop. Checked at the top of every
/// iteration and again after every sleep, so no poll request is issued after
/// `cancel()` returns.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous and idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How a poll loop ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The user finished selecting; items fetched at most once per session.
    Selected(Vec<SelectedMediaItem>),
    /// The picker window closed and the grace window elapsed without the
    /// server signalling a selection.
    NothingSelected,
    /// The caller cancelled; not an error.
    Cancelled,
}

pub struct SessionPoller {
    api: Arc<dyn PickerApi>,
    config: PollConfig,
    cancel: CancelHandle,
}

impl SessionPoller {
    pub fn new(api: Arc<dyn PickerApi>, config: PollConfig) -> Self {
        Self {
            api,
            config,
            cancel: CancelHandle::new(),
        }
    }

    /// Handle the caller keeps to cancel this poller's loop.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Create the upstream session. One call, no retry; upstream failure is
    /// terminal for this attempt.
    pub async fn create_session(
        &self,
        credential: &Credential,
    ) -> Result<PickerSession, RestyleError> {
        let created = self.api.create_session(credential).await?;
        info!("Picker session created: {}", created.id);
        Ok(PickerSession::new(created.id, created.picker_uri))
    }

    /// Poll until the user finishes selecting, the attempt cap is reached, the
    /// window closes without a selection, or the caller cancels.
    pub async fn poll_until_selected(
        &self,
        credential: &Credential,
        session: &mut PickerSession,
        ui: &dyn PickerUiHandle,
    ) -> Result<PollOutcome, RestyleError> {
        session.begin_polling();

        // Give the external UI time to render before the first poll.
        sleep(self.config.initial_delay).await;

        let mut attempts: u32 = 0;
        let mut grace_left: Option<u32> = None;

        loop {
            if self.cancel.is_cancelled() {
                info!("Poll loop cancelled for session {}", session.session_id);
                session.finish(SessionState::Cancelled);
                return Ok(PollOutcome::Cancelled);
            }

            if attempts >= self.config.max_attempts {
                warn!(
                    "Poll attempt cap ({}) reached for session {}",
                    self.config.max_attempts, session.session_id
                );
                ui.close();
                session.finish(SessionState::TimedOut);
                return Err(RestyleError::PollTimeout);
            }

            if ui.is_closed() {
                match grace_left {
                    None => {
                        // The window closing can race the server recording
                        // the selection; allow a few more polls.
                        debug!(
                            "Picker window reported closed; entering grace window ({} attempts)",
                            self.config.grace_attempts
                        );
                        grace_left = Some(self.config.grace_attempts);
                    }
                    Some(0) => {
                        info!(
                            "No selection made for session {} before the window closed",
                            session.session_id
                        );
                        session.finish(SessionState::Cancelled);
                        return Ok(PollOutcome::NothingSelected);
                    }
                    Some(_) => {}
                }
            }

            attempts += 1;
            let response = match self.api.poll_session(credential, &session.session_id).await {
                Ok(response) => response,
                Err(e) => {
                    ui.close();
                    session.finish(SessionState::Errored);
                    return Err(e);
                }
            };

            if response.media_items_set {
                let items = match self
                    .selected_items(credential, session, response.media_items)
                    .await
                {
                    Ok(items) => items,
                    Err(e) => {
                        ui.close();
                        session.finish(SessionState::Errored);
                        return Err(e);
                    }
                };
                info!(
                    "Session {} completed with {} selected item(s) after {} poll(s)",
                    session.session_id,
                    items.len(),
                    attempts
                );
                ui.close();
                session.finish(SessionState::Completed);
                return Ok(PollOutcome::Selected(items));
            }

            if let Some(n) = grace_left.as_mut() {
                *n = n.saturating_sub(1);
            }

            let interval = response
                .polling_config
                .as_ref()
                .and_then(|c| c.interval())
                .unwrap_or(self.config.default_interval);
            sleep(interval).await;
        }
    }

    /// Selected items come inline from the poll response when present; older
    /// responses omit them and need the fallback list call.
    async fn selected_items(
        &self,
        credential: &Credential,
        session: &PickerSession,
        inline: Option<Vec<PickedMediaItem>>,
    ) -> Result<Vec<SelectedMediaItem>, RestyleError> {
        let picked = match inline {
            Some(items) if !items.is_empty() => items,
            _ => {
                debug!(
                    "Poll response omitted media items; falling back to list call for session {}",
                    session.session_id
                );
                self.api.list_selected(credential, &session.session_id).await?
            }
        };
        Ok(picked.iter().filter_map(SelectedMediaItem::from_picked).collect())
    }
}

/// Production [`PickerApi`] over the external picker REST endpoints.
pub struct GooglePickerClient {
    http: Client,
    base_url: String,
}

impl GooglePickerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PickerApi for GooglePickerClient {
    async fn create_session(&self, credential: &Credential) -> Result<SessionCreated, RestyleError> {
        if credential.is_empty() {
            return Err(RestyleError::Auth);
        }

        let response = self
            .http
            .post(format!("{}/sessions", self.base_url))
            .bearer_auth(&credential.access_token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| RestyleError::SessionCreate {
                status: 0,
                body: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestyleError::SessionCreate {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| RestyleError::Serialization(e.to_string()))
    }

    async fn poll_session(
        &self,
        credential: &Credential,
        session_id: &str,
    ) -> Result<PollResponse, RestyleError> {
        let response = self
            .http
            .get(format!("{}/sessions/{}", self.base_url, session_id))
            .bearer_auth(&credential.access_token)
            .send()
            .await
            .map_err(|e| RestyleError::Poll(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestyleError::Poll(format!("status {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| RestyleError::Serialization(e.to_string()))
    }

    async fn list_selected(
        &self,
        credential: &Credential,
        session_id: &str,
    ) -> Result<Vec<PickedMediaItem>, RestyleError> {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ListResponse {
            #[serde(default)]
            media_items: Vec<PickedMediaItem>,
        }

        let response = self
            .http
            .get(format!("{}/mediaItems", self.base_url))
            .query(&[("sessionId", session_id)])
            .bearer_auth(&credential.access_token)
            .send()
            .await
            .map_err(|e| RestyleError::Poll(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestyleError::Poll(format!(
                "media list failed, status {status}: {body}"
            )));
        }

        let list: ListResponse = response
            .json()
            .await
            .map_err(|e| RestyleError::Serialization(e.to_string()))?;
        Ok(list.media_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::models::{MediaFile, PollingConfig};

    fn test_config(max_attempts: u32) -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_millis(100),
            default_interval: Duration::from_millis(100),
            max_attempts,
            grace_attempts: 3,
        }
    }

    fn item(url: &str) -> PickedMediaItem {
        PickedMediaItem {
            id: None,
            media_file: Some(MediaFile {
                base_url: url.to_string(),
                mime_type: Some("image/jpeg".into()),
                width: None,
                height: None,
            }),
            base_url: None,
            mime_type: None,
        }
    }

    /// Scripted picker: pops one poll response per call, counts calls.
    struct ScriptedPicker {
        responses: Mutex<Vec<PollResponse>>,
        poll_count: AtomicUsize,
        list_count: AtomicUsize,
        listed: Vec<PickedMediaItem>,
    }

    impl ScriptedPicker {
        fn new(responses: Vec<PollResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                poll_count: AtomicUsize::new(0),
                list_count: AtomicUsize::new(0),
                listed: Vec::new(),
            }
        }

        fn with_listed(mut self, listed: Vec<PickedMediaItem>) -> Self {
            self.listed = listed;
            self
        }

        fn polls(&self) -> usize {
            self.poll_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PickerApi for ScriptedPicker {
        async fn create_session(
            &self,
            _credential: &Credential,
        ) -> Result<SessionCreated, RestyleError> {
            Ok(SessionCreated {
                id: "session-1".into(),
                picker_uri: "https://picker.example/session-1".into(),
            })
        }

        async fn poll_session(
            &self,
            _credential: &Credential,
            _session_id: &str,
        ) -> Result<PollResponse, RestyleError> {
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(PollResponse::default())
            } else {
                Ok(responses.remove(0))
            }
        }

        async fn list_selected(
            &self,
            _credential: &Credential,
            _session_id: &str,
        ) -> Result<Vec<PickedMediaItem>, RestyleError> {
            self.list_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.listed.clone())
        }
    }

    #[derive(Default)]
    struct TestUi {
        closed: AtomicBool,
        close_calls: AtomicUsize,
    }

    impl PickerUiHandle for TestUi {
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn close(&self) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn credential() -> Credential {
        Credential::new("token")
    }

    #[tokio::test(start_paused = true)]
    async fn completes_with_inline_items() {
        let api = Arc::new(ScriptedPicker::new(vec![
            PollResponse::default(),
            PollResponse {
                media_items_set: true,
                polling_config: None,
                media_items: Some(vec![item("https://cdn.example/photo1")]),
            },
        ]));
        let poller = SessionPoller::new(api.clone(), test_config(150));
        let mut session = poller.create_session(&credential()).await.unwrap();
        let ui = TestUi::default();

        let outcome = poller
            .poll_until_selected(&credential(), &mut session, &ui)
            .await
            .unwrap();

        match outcome {
            PollOutcome::Selected(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].base_reference, "https://cdn.example/photo1");
            }
            other => panic!("expected Selected, got {other:?}"),
        }
        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(api.polls(), 2);
        assert_eq!(api.list_count.load(Ordering::SeqCst), 0);
        assert_eq!(ui.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_list_call_when_poll_omits_items() {
        let api = Arc::new(
            ScriptedPicker::new(vec![PollResponse {
                media_items_set: true,
                polling_config: None,
                media_items: None,
            }])
            .with_listed(vec![item("https://cdn.example/photo2")]),
        );
        let poller = SessionPoller::new(api.clone(), test_config(150));
        let mut session = PickerSession::new("session-1", "uri");
        let ui = TestUi::default();

        let outcome = poller
            .poll_until_selected(&credential(), &mut session, &ui)
            .await
            .unwrap();

        assert_eq!(api.list_count.load(Ordering::SeqCst), 1);
        match outcome {
            PollOutcome::Selected(items) => {
                assert_eq!(items[0].base_reference, "https://cdn.example/photo2")
            }
            other => panic!("expected Selected, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_cap_yields_timeout_and_closes_ui_once() {
        let api = Arc::new(ScriptedPicker::new(Vec::new()));
        let poller = SessionPoller::new(api.clone(), test_config(5));
        let mut session = PickerSession::new("session-1", "uri");
        let ui = TestUi::default();

        let err = poller
            .poll_until_selected(&credential(), &mut session, &ui)
            .await
            .unwrap_err();

        assert!(matches!(err, RestyleError::PollTimeout));
        assert_eq!(session.state, SessionState::TimedOut);
        assert_eq!(api.polls(), 5);
        assert_eq!(ui.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_all_further_polls() {
        let api = Arc::new(ScriptedPicker::new(Vec::new()));
        let poller = Arc::new(SessionPoller::new(api.clone(), test_config(150)));
        let cancel = poller.cancel_handle();

        let task = {
            let poller = poller.clone();
            tokio::spawn(async move {
                let mut session = PickerSession::new("session-1", "uri");
                let ui = TestUi::default();
                poller
                    .poll_until_selected(&credential(), &mut session, &ui)
                    .await
            })
        };

        // Let a few polls happen, then cancel mid-loop.
        tokio::time::sleep(Duration::from_millis(450)).await;
        let polls_before = api.polls();
        assert!(polls_before > 0);
        cancel.cancel();
        cancel.cancel(); // idempotent

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);

        // No poll request fires after cancellation, no matter how much time
        // passes.
        let polls_at_cancel = api.polls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.polls(), polls_at_cancel);
        assert!(polls_at_cancel <= polls_before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_ui_gets_a_grace_window_then_no_selection() {
        let api = Arc::new(ScriptedPicker::new(Vec::new()));
        let poller = SessionPoller::new(api.clone(), test_config(150));
        let mut session = PickerSession::new("session-1", "uri");
        let ui = TestUi::default();
        ui.closed.store(true, Ordering::SeqCst);

        let outcome = poller
            .poll_until_selected(&credential(), &mut session, &ui)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::NothingSelected);
        assert_eq!(session.state, SessionState::Cancelled);
        // Exactly the grace window of polls ran after closure was observed.
        assert_eq!(api.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn late_completion_during_grace_window_still_wins() {
        let api = Arc::new(ScriptedPicker::new(vec![
            PollResponse::default(),
            PollResponse {
                media_items_set: true,
                polling_config: None,
                media_items: Some(vec![item("https://cdn.example/late")]),
            },
        ]));
        let poller = SessionPoller::new(api.clone(), test_config(150));
        let mut session = PickerSession::new("session-1", "uri");
        let ui = TestUi::default();
        ui.closed.store(true, Ordering::SeqCst);

        let outcome = poller
            .poll_until_selected(&credential(), &mut session, &ui)
            .await
            .unwrap();

        assert!(matches!(outcome, PollOutcome::Selected(_)));
        assert_eq!(session.state, SessionState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn server_suggested_interval_is_honored() {
        let api = Arc::new(ScriptedPicker::new(vec![
            PollResponse {
                media_items_set: false,
                polling_config: Some(PollingConfig {
                    poll_interval: Some("10s".into()),
                }),
                media_items: None,
            },
            PollResponse {
                media_items_set: true,
                polling_config: None,
                media_items: Some(vec![item("https://cdn.example/photo")]),
            },
        ]));
        let poller = SessionPoller::new(api.clone(), test_config(150));

        let start = tokio::time::Instant::now();
        let mut session = PickerSession::new("session-1", "uri");
        let ui = TestUi::default();
        poller
            .poll_until_selected(&credential(), &mut session, &ui)
            .await
            .unwrap();

        // initial delay (100ms) + server-suggested 10s before the second poll.
        assert!(start.elapsed() >= Duration::from_millis(10_100));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_error_is_terminal() {
        struct FailingPicker;

        #[async_trait]
        impl PickerApi for FailingPicker {
            async fn create_session(
                &self,
                _credential: &Credential,
            ) -> Result<SessionCreated, RestyleError> {
                Err(RestyleError::SessionCreate {
                    status: 401,
                    body: "expired".into(),
                })
            }

            async fn poll_session(
                &self,
                _credential: &Credential,
                _session_id: &str,
            ) -> Result<PollResponse, RestyleError> {
                Err(RestyleError::Poll("boom".into()))
            }

            async fn list_selected(
                &self,
                _credential: &Credential,
                _session_id: &str,
            ) -> Result<Vec<PickedMediaItem>, RestyleError> {
                Ok(Vec::new())
            }
        }

        let poller = SessionPoller::new(Arc::new(FailingPicker), test_config(150));
        let mut session = PickerSession::new("session-1", "uri");
        let ui = TestUi::default();

        let err = poller
            .poll_until_selected(&credential(), &mut session, &ui)
            .await
            .unwrap_err();
        assert!(matches!(err, RestyleError::Poll(_)));
        assert_eq!(session.state, SessionState::Errored);
        assert_eq!(ui.close_calls.load(Ordering::SeqCst), 1);

        let create_err = poller.create_session(&credential()).await.unwrap_err();
        assert!(matches!(
            create_err,
            RestyleError::SessionCreate { status: 401, .. }
        ));
    }
}
