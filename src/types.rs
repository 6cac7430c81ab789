//! Core data types for the preference pipeline
//!
//! This module defines the types that flow through the pipeline: raw frame
//! samples, the persisted Seed (trial record), the optional ground-truth
//! Label attachment, and the Judge's Recommendation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Pose landmark subset captured for one frame
///
/// Coordinates are normalized image coordinates; shoulder `z` is the relative
/// depth reported by the pose model (closer to the camera = smaller value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseSample {
    /// Nose x coordinate (normalized)
    pub nose_x: f64,
    /// Nose y coordinate (normalized)
    pub nose_y: f64,
    /// Nose landmark visibility (0-1)
    pub nose_vis: f64,
    /// Left shoulder depth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_shoulder_z: Option<f64>,
    /// Left shoulder visibility (0-1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_shoulder_vis: Option<f64>,
    /// Right shoulder depth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_shoulder_z: Option<f64>,
    /// Right shoulder visibility (0-1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_shoulder_vis: Option<f64>,
}

/// One frame's raw reading from the capture collaborator
///
/// Samples are ephemeral: they exist only as input to the feature extractor
/// and are never persisted individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the start of the trial
    pub t: f64,
    /// Instantaneous frame rate at capture time
    pub fps: f64,
    /// Per-class facial emotion probabilities (class name → probability)
    pub emotions: BTreeMap<String, f64>,
    /// Pose landmarks, when the pose model detected a subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose: Option<PoseSample>,
}

/// Descriptive content for one option, produced by the upstream
/// option-description collaborator and stored verbatim on the Seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusContent {
    /// Option identifier within the session (e.g. "opt1")
    pub id: String,
    /// Short display title
    pub title: String,
    /// Persuasive summary text
    pub summary: String,
    /// One-line punchline for the option
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buying_point: Option<String>,
    /// Supporting points
    #[serde(default)]
    pub pros: Vec<String>,
    /// Trade-offs
    #[serde(default)]
    pub cons: Vec<String>,
}

/// Head gesture classification from nose-coordinate variance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GestureLabel {
    /// Both axes nearly motionless
    #[serde(rename = "Static")]
    Static,
    /// Horizontal movement dominates (negation / confusion)
    #[serde(rename = "Head Shaking")]
    HeadShaking,
    /// Vertical movement dominates (agreement / understanding)
    #[serde(rename = "Head Nodding")]
    HeadNodding,
    /// Movement without a dominant axis
    #[serde(rename = "Dynamic")]
    Dynamic,
    /// Pose coverage too low to classify
    #[serde(rename = "Not Detected")]
    NotDetected,
}

/// Posture classification from shoulder-depth drift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostureLabel {
    /// Subject moved toward the camera over the trial
    #[serde(rename = "Leaning Forward")]
    LeaningForward,
    /// Subject moved away from the camera over the trial
    #[serde(rename = "Leaning Backward")]
    LeaningBackward,
    /// No meaningful depth drift
    #[serde(rename = "Stable Posture")]
    Stable,
    /// Shoulder visibility too low to classify
    #[serde(rename = "Unknown")]
    Unknown,
}

/// Gaze stability classification from nose-coordinate dispersion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GazeLabel {
    #[serde(rename = "Highly Focused")]
    HighlyFocused,
    #[serde(rename = "Distracted/Searching")]
    Distracted,
    #[serde(rename = "Normal Gaze")]
    Normal,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GestureLabel::Static => "Static",
            GestureLabel::HeadShaking => "Head Shaking",
            GestureLabel::HeadNodding => "Head Nodding",
            GestureLabel::Dynamic => "Dynamic",
            GestureLabel::NotDetected => "Not Detected",
        };
        f.write_str(s)
    }
}

impl fmt::Display for PostureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PostureLabel::LeaningForward => "Leaning Forward",
            PostureLabel::LeaningBackward => "Leaning Backward",
            PostureLabel::Stable => "Stable Posture",
            PostureLabel::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

impl fmt::Display for GazeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GazeLabel::HighlyFocused => "Highly Focused",
            GazeLabel::Distracted => "Distracted/Searching",
            GazeLabel::Normal => "Normal Gaze",
            GazeLabel::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Dominant emotion over the trial (highest mean probability, Neutral excluded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominantEmotion {
    /// Emotion class name, or "None" when no non-neutral class was observed
    pub emotion: String,
    /// Mean probability of that class across all frames
    pub score: f64,
}

/// Posture metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureMetrics {
    pub label: PostureLabel,
    /// Early-trial minus late-trial mean shoulder depth
    pub z_diff: f64,
}

/// Gesture metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureMetrics {
    pub label: GestureLabel,
    /// Smoothed nose x variance, scaled by 10,000
    pub var_x: f64,
    /// Smoothed nose y variance, scaled by 10,000
    pub var_y: f64,
}

/// Gaze metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeMetrics {
    pub label: GazeLabel,
}

/// Behavioral metrics extracted from one trial's sample series
///
/// Immutable once written by the feature extractor; later pipeline stages may
/// attach a [`Label`] to the Seed but never touch the metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorMetrics {
    /// Trial duration in seconds (largest sample offset)
    pub duration_sec: f64,
    /// Mean frame rate across the trial
    pub fps_mean: f64,
    /// Dominant emotion with its mean score
    pub dominant_emotion: DominantEmotion,
    /// Mean probability per emotion class
    pub emotion_full_stats: BTreeMap<String, f64>,
    /// Posture classification
    pub posture: PostureMetrics,
    /// Head gesture classification
    pub gesture: GestureMetrics,
    /// Gaze stability classification
    pub gaze: GazeMetrics,
}

/// Identity of a Seed: one option viewed within one session
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeedKey {
    pub session_id: String,
    pub option_id: String,
}

impl SeedKey {
    pub fn new(session_id: impl Into<String>, option_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            option_id: option_id.into(),
        }
    }
}

impl fmt::Display for SeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.option_id)
    }
}

/// Seed provenance metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedMeta {
    /// Experiment session this trial belongs to
    pub session_id: String,
    /// Option identifier within the session
    pub option_id: String,
    /// When the Seed was produced
    pub recorded_at: DateTime<Utc>,
    /// Decision context supplied by the operator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_context: Option<String>,
    /// Name of the raw capture the samples came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Human ground truth attached to a Seed after the trial
///
/// Presence of a label is the sole gate for inclusion in guideline synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    /// Self-reported preference, 1 (hate) to 5 (love)
    pub preference_score: u8,
    /// Subject's own comment on the option
    pub comment: String,
    /// Ground-truth analysis connecting observed behavior to the self-report
    pub expert_analysis: String,
    /// When the label was attached
    pub labeled_at: DateTime<Utc>,
}

/// Persisted per-trial record: extracted metrics plus optional ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    /// Provenance metadata
    pub meta: SeedMeta,
    /// Option description shown during the trial, stored verbatim
    pub stimulus_content: StimulusContent,
    /// Extracted behavioral metrics
    pub behavior_metrics: BehaviorMetrics,
    /// Deterministic natural-language summary of the metrics
    pub rule_based_interpretation: String,
    /// Ground-truth attachment, set only by the Labeler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
}

impl Seed {
    /// Identity of this Seed
    pub fn key(&self) -> SeedKey {
        SeedKey::new(self.meta.session_id.clone(), self.meta.option_id.clone())
    }

    /// Whether ground truth has been attached
    pub fn is_labeled(&self) -> bool {
        self.label.is_some()
    }
}

/// The Judge's ranked recommendation for one session
///
/// Returned to the caller; never persisted by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Per-option rationale, keyed by option title
    pub analysis_per_option: BTreeMap<String, String>,
    /// Title of the predicted preferred option
    pub final_recommendation: String,
    /// Why the winning option won, in terms of the guideline's signals
    pub winning_reason: String,
}

/// A full trial recording handed to the extractor: the option metadata plus
/// the ordered frame samples captured while the subject read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecording {
    /// Session this trial belongs to
    pub session_id: String,
    /// Option shown during the trial
    pub stimulus: StimulusContent,
    /// Operator-supplied decision context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_context: Option<String>,
    /// Name of the raw capture source, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Ordered frame samples
    pub samples: Vec<Sample>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_gesture_label_serialization() {
        let json = serde_json::to_string(&GestureLabel::HeadShaking).unwrap();
        assert_eq!(json, "\"Head Shaking\"");

        let parsed: GestureLabel = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, GestureLabel::HeadShaking);
    }

    #[test]
    fn test_posture_label_serialization() {
        let json = serde_json::to_string(&PostureLabel::Stable).unwrap();
        assert_eq!(json, "\"Stable Posture\"");
    }

    #[test]
    fn test_seed_key_ordering_is_lexical() {
        let mut keys = vec![
            SeedKey::new("abc123", "opt3"),
            SeedKey::new("abc123", "opt1"),
            SeedKey::new("aaa999", "opt2"),
        ];
        keys.sort();
        assert_eq!(keys[0], SeedKey::new("aaa999", "opt2"));
        assert_eq!(keys[1], SeedKey::new("abc123", "opt1"));
        assert_eq!(keys[2], SeedKey::new("abc123", "opt3"));
    }

    #[test]
    fn test_sample_deserialization() {
        let json = r#"{
            "t": 1.25,
            "fps": 29.7,
            "emotions": {"Happiness": 0.6, "Neutral": 0.3, "Sadness": 0.1},
            "pose": {
                "nose_x": 0.51,
                "nose_y": 0.42,
                "nose_vis": 0.98,
                "left_shoulder_z": -0.31,
                "left_shoulder_vis": 0.91
            }
        }"#;

        let sample: Sample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.emotions.len(), 3);
        let pose = sample.pose.unwrap();
        assert_eq!(pose.nose_vis, 0.98);
        assert_eq!(pose.right_shoulder_z, None);
    }

    #[test]
    fn test_seed_without_label_round_trips() {
        let seed = Seed {
            meta: SeedMeta {
                session_id: "abc123".to_string(),
                option_id: "opt1".to_string(),
                recorded_at: Utc::now(),
                user_context: Some("anniversary weekend".to_string()),
                source: None,
            },
            stimulus_content: StimulusContent {
                id: "opt1".to_string(),
                title: "A".to_string(),
                summary: "summary".to_string(),
                buying_point: None,
                pros: vec!["cheap".to_string()],
                cons: vec![],
            },
            behavior_metrics: BehaviorMetrics {
                duration_sec: 12.0,
                fps_mean: 30.0,
                dominant_emotion: DominantEmotion {
                    emotion: "Happiness".to_string(),
                    score: 0.4,
                },
                emotion_full_stats: BTreeMap::new(),
                posture: PostureMetrics {
                    label: PostureLabel::Stable,
                    z_diff: 0.0,
                },
                gesture: GestureMetrics {
                    label: GestureLabel::Static,
                    var_x: 0.01,
                    var_y: 0.02,
                },
                gaze: GazeMetrics {
                    label: GazeLabel::Normal,
                },
            },
            rule_based_interpretation: "User showed neutral behavior with no significant signals."
                .to_string(),
            label: None,
        };

        let json = serde_json::to_string(&seed).unwrap();
        assert!(!json.contains("\"label\""));

        let parsed: Seed = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, seed);
        assert!(!parsed.is_labeled());
        assert_eq!(parsed.key(), SeedKey::new("abc123", "opt1"));
    }
}
