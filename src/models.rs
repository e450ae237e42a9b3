// src/models.rs
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bearer credential for calls against the photo library and its picker.
///
/// The token itself is minted by the auth layer (cookie-based); this crate
/// only carries it to upstream requests.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.trim().is_empty()
    }
}

/// Authenticated request context extracted from cookies.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub credential: Credential,
}

/// Lifecycle of one picker session. Everything past `Polling` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Polling,
    Completed,
    TimedOut,
    Cancelled,
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Created | SessionState::Polling)
    }
}

/// A server-side handle for one in-progress external media selection.
///
/// The external service owns the session beyond our terminal states; we only
/// discard our handle.
#[derive(Debug, Clone)]
pub struct PickerSession {
    pub session_id: String,
    pub picker_uri: String,
    pub state: SessionState,
}

impl PickerSession {
    pub fn new(session_id: impl Into<String>, picker_uri: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            picker_uri: picker_uri.into(),
            state: SessionState::Created,
        }
    }

    pub fn begin_polling(&mut self) {
        if self.state == SessionState::Created {
            self.state = SessionState::Polling;
        }
    }

    /// Move to a terminal state. Terminal states never transition again.
    pub fn finish(&mut self, state: SessionState) {
        debug_assert!(state.is_terminal());
        if !self.state.is_terminal() {
            self.state = state;
        }
    }
}

/// Picker session-create response shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub id: String,
    pub picker_uri: String,
}

/// Picker poll response shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    #[serde(default)]
    pub media_items_set: bool,
    #[serde(default)]
    pub polling_config: Option<PollingConfig>,
    #[serde(default)]
    pub media_items: Option<Vec<PickedMediaItem>>,
}

/// Server-suggested poll cadence. The interval comes over the wire as a
/// duration string ("2s", "1.5s").
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingConfig {
    #[serde(default)]
    pub poll_interval: Option<String>,
}

impl PollingConfig {
    pub fn interval(&self) -> Option<Duration> {
        let raw = self.poll_interval.as_deref()?;
        let seconds: f64 = raw.trim().strip_suffix('s')?.parse().ok()?;
        if seconds.is_finite() && seconds > 0.0 {
            Some(Duration::from_secs_f64(seconds))
        } else {
            None
        }
    }
}

/// One media item as returned by the picker service.
///
/// The canonical shape nests the locator under `mediaFile`; a bare top-level
/// `baseUrl` is accepted as a compat shim for older responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickedMediaItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub media_file: Option<MediaFile>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub base_url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl PickedMediaItem {
    pub fn base_url(&self) -> Option<&str> {
        self.media_file
            .as_ref()
            .map(|f| f.base_url.as_str())
            .or(self.base_url.as_deref())
    }
}

/// An immutable locator for one selected image. Re-selection produces a new
/// value, never a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedMediaItem {
    pub base_reference: String,
    pub mime_type: Option<String>,
}

impl SelectedMediaItem {
    /// Build from a wire item; `None` when the item carries no locator.
    pub fn from_picked(item: &PickedMediaItem) -> Option<Self> {
        let base_reference = item.base_url()?.to_string();
        let mime_type = item
            .media_file
            .as_ref()
            .and_then(|f| f.mime_type.clone())
            .or_else(|| item.mime_type.clone());
        Some(Self {
            base_reference,
            mime_type,
        })
    }
}

/// Five-point ordinal likelihood scale used by the vision service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Likelihood {
    #[default]
    Unknown,
    VeryUnlikely,
    Unlikely,
    Possible,
    Likely,
    VeryLikely,
}

impl Likelihood {
    /// Ordinal level; `Unknown` ranks lowest alongside `VeryUnlikely`.
    pub fn level(&self) -> u8 {
        match self {
            Likelihood::Unknown | Likelihood::VeryUnlikely => 0,
            Likelihood::Unlikely => 1,
            Likelihood::Possible => 2,
            Likelihood::Likely => 3,
            Likelihood::VeryLikely => 4,
        }
    }
}

/// Structured result of one vision analysis call. Read-only input to the
/// validator; never mutated.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionAnalysis {
    #[serde(default)]
    pub face_annotations: Vec<FaceAnnotation>,
    #[serde(default)]
    pub safe_search_annotation: Option<SafeSearchAnnotation>,
    #[serde(default)]
    pub label_annotations: Vec<LabelAnnotation>,
    #[serde(default)]
    pub image_properties_annotation: Option<ImageProperties>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceAnnotation {
    #[serde(default)]
    pub detection_confidence: Option<f32>,
    #[serde(default)]
    pub bounding_poly: Option<BoundingPoly>,
    #[serde(default)]
    pub pan_angle: Option<f32>,
    #[serde(default)]
    pub tilt_angle: Option<f32>,
    #[serde(default)]
    pub under_exposed_likelihood: Likelihood,
    #[serde(default)]
    pub blurred_likelihood: Likelihood,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BoundingPoly {
    #[serde(default)]
    pub vertices: Vec<Vertex>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct Vertex {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SafeSearchAnnotation {
    #[serde(default)]
    pub adult: Likelihood,
    #[serde(default)]
    pub spoof: Likelihood,
    #[serde(default)]
    pub medical: Likelihood,
    #[serde(default)]
    pub violence: Likelihood,
    #[serde(default)]
    pub racy: Likelihood,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LabelAnnotation {
    pub description: String,
    #[serde(default)]
    pub score: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProperties {
    #[serde(default)]
    pub dominant_colors: Option<DominantColors>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DominantColors {
    #[serde(default)]
    pub colors: Vec<ColorInfo>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorInfo {
    #[serde(default)]
    pub color: Option<RgbColor>,
    #[serde(default)]
    pub pixel_fraction: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct RgbColor {
    #[serde(default)]
    pub red: f32,
    #[serde(default)]
    pub green: f32,
    #[serde(default)]
    pub blue: f32,
}

/// Outcome of content validation: a hard gate plus advisory warnings.
///
/// Blocking findings and advisories are split so callers can proceed on
/// degraded confidence but never on a blocked image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub has_detected_face: bool,
    pub is_safe_content: bool,
    pub face_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
}

/// Result of one generation call. A well-formed response that produced no
/// image is an expected outcome (`success: false`), not an error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data_url: Option<String>,
    pub message: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

/// One persisted before/after pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformation {
    pub id: String,
    pub user_id: String,
    pub original_image_url: String,
    pub transformed_image_url: String,
    #[serde(default)]
    pub hair_color: Option<String>,
    #[serde(default)]
    pub hair_style: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One page of persisted transformations, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationPage {
    pub transformations: Vec<Transformation>,
    pub count: usize,
    pub limit: usize,
    pub has_more: bool,
    pub last_doc_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_config_parses_duration_strings() {
        let cfg = PollingConfig {
            poll_interval: Some("2s".into()),
        };
        assert_eq!(cfg.interval(), Some(Duration::from_secs(2)));

        let cfg = PollingConfig {
            poll_interval: Some("1.5s".into()),
        };
        assert_eq!(cfg.interval(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn polling_config_rejects_garbage() {
        for raw in ["", "fast", "-3s", "0s", "2m"] {
            let cfg = PollingConfig {
                poll_interval: Some(raw.into()),
            };
            assert_eq!(cfg.interval(), None, "accepted {raw:?}");
        }
        assert_eq!(PollingConfig::default().interval(), None);
    }

    #[test]
    fn picked_item_prefers_media_file_locator() {
        let item = PickedMediaItem {
            id: None,
            media_file: Some(MediaFile {
                base_url: "https://cdn.example/canonical".into(),
                mime_type: Some("image/jpeg".into()),
                width: None,
                height: None,
            }),
            base_url: Some("https://cdn.example/legacy".into()),
            mime_type: None,
        };
        assert_eq!(item.base_url(), Some("https://cdn.example/canonical"));

        let selected = SelectedMediaItem::from_picked(&item).unwrap();
        assert_eq!(selected.base_reference, "https://cdn.example/canonical");
        assert_eq!(selected.mime_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn picked_item_falls_back_to_bare_locator() {
        let item = PickedMediaItem {
            id: None,
            media_file: None,
            base_url: Some("https://cdn.example/legacy".into()),
            mime_type: Some("image/png".into()),
        };
        assert_eq!(item.base_url(), Some("https://cdn.example/legacy"));
        let selected = SelectedMediaItem::from_picked(&item).unwrap();
        assert_eq!(selected.mime_type.as_deref(), Some("image/png"));

        let empty = PickedMediaItem {
            id: None,
            media_file: None,
            base_url: None,
            mime_type: None,
        };
        assert!(SelectedMediaItem::from_picked(&empty).is_none());
    }

    #[test]
    fn session_terminal_states_are_sticky() {
        let mut session = PickerSession::new("s1", "https://picker.example/s1");
        assert_eq!(session.state, SessionState::Created);
        session.begin_polling();
        assert_eq!(session.state, SessionState::Polling);
        session.finish(SessionState::Completed);
        session.finish(SessionState::Errored);
        assert_eq!(session.state, SessionState::Completed);
    }

    #[test]
    fn likelihood_levels_are_ordered() {
        assert_eq!(Likelihood::Unknown.level(), 0);
        assert_eq!(Likelihood::VeryUnlikely.level(), 0);
        assert!(Likelihood::Possible.level() < Likelihood::Likely.level());
        assert_eq!(Likelihood::VeryLikely.level(), 4);
    }

    #[test]
    fn likelihood_deserializes_wire_names() {
        let l: Likelihood = serde_json::from_str("\"VERY_UNLIKELY\"").unwrap();
        assert_eq!(l, Likelihood::VeryUnlikely);
        let l: Likelihood = serde_json::from_str("\"LIKELY\"").unwrap();
        assert_eq!(l, Likelihood::Likely);
    }
}
