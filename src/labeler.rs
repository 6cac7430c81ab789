//! Ground-truth labeling
//!
//! The labeler attaches the subject's self-reported preference to an existing
//! Seed. When a reasoning service is supplied it also drafts the
//! `expert_analysis` paragraph connecting the observed behavior to the
//! self-report; without one, the subject's comment stands in as the analysis
//! text. Labeling never touches the extracted metrics.
//!
//! Relabeling is an explicit caller decision: an already-labeled Seed is
//! either skipped or overwritten per [`OverwritePolicy`], never silently
//! replaced.

use crate::error::{DataError, PipelineError, StateError};
use crate::service::{encode_json, GenerationRequest, ReasoningService};
use crate::store::SeedStore;
use crate::types::{Label, Seed};
use chrono::Utc;
use tracing::{info, warn};

const ANALYST_SYSTEM_PROMPT: &str = "\
You are a senior behavioral psychologist. Your task is to write a ground-truth \
analysis based on the subject's self-reported preference and their observed \
non-verbal behavior.

INPUT:
1. Observed behavior (posture, gaze, emotions detected by the capture pipeline)
2. The subject's actual preference (score 1-5 and their comment)

OUTPUT:
Write a professional, 3-4 sentence analysis.
- Connect the observed behavior to the actual preference.
- If the behavior matched the preference (e.g. liked it and nodded), explain it as a strong signal.
- If there was a discrepancy (e.g. liked it but frowned), interpret it carefully.
- Tone: clinical, objective, insightful.";

/// What to do when the target Seed already carries a label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Leave the existing label in place
    Skip,
    /// Replace the existing label
    Overwrite,
}

/// Result of one labeling call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOutcome {
    /// A label was attached
    Labeled {
        /// Whether an existing label was replaced
        replaced: bool,
    },
    /// The Seed was already labeled and the policy said to keep it
    AlreadyLabeled,
}

/// Attaches ground truth to stored Seeds
pub struct Labeler<'a> {
    service: Option<&'a dyn ReasoningService>,
}

impl<'a> Labeler<'a> {
    /// Labeler without a reasoning service; the subject's comment doubles
    /// as the expert analysis.
    pub fn new() -> Self {
        Self { service: None }
    }

    /// Labeler that drafts the expert analysis via the reasoning service
    pub fn with_service(service: &'a dyn ReasoningService) -> Self {
        Self {
            service: Some(service),
        }
    }

    /// Attach a preference score and comment to the Seed at
    /// `(session_id, option_id)`.
    ///
    /// Fails with [`DataError::InvalidScore`] outside 1-5 and
    /// [`StateError::SeedNotFound`] for an unknown key. A service failure
    /// while drafting the analysis is fatal here; nothing is written.
    pub fn label(
        &self,
        store: &mut SeedStore,
        session_id: &str,
        option_id: &str,
        score: u8,
        comment: &str,
        policy: OverwritePolicy,
    ) -> Result<LabelOutcome, PipelineError> {
        if !(1..=5).contains(&score) {
            return Err(DataError::InvalidScore(score).into());
        }

        let mut seed =
            store
                .get(session_id, option_id)?
                .ok_or_else(|| StateError::SeedNotFound {
                    session_id: session_id.to_string(),
                    option_id: option_id.to_string(),
                })?;

        let replaced = seed.is_labeled();
        if replaced {
            match policy {
                OverwritePolicy::Skip => {
                    warn!(key = %seed.key(), "seed already labeled, keeping existing label");
                    return Ok(LabelOutcome::AlreadyLabeled);
                }
                OverwritePolicy::Overwrite => {
                    warn!(key = %seed.key(), "seed already labeled, overwriting");
                }
            }
        }

        let expert_analysis = match self.service {
            Some(service) => self.draft_analysis(service, &seed, score, comment)?,
            None => comment.to_string(),
        };

        seed.label = Some(Label {
            preference_score: score,
            comment: comment.to_string(),
            expert_analysis,
            labeled_at: Utc::now(),
        });
        store.put(&seed)?;

        info!(key = %seed.key(), score, "label attached");
        Ok(LabelOutcome::Labeled { replaced })
    }

    fn draft_analysis(
        &self,
        service: &dyn ReasoningService,
        seed: &Seed,
        score: u8,
        comment: &str,
    ) -> Result<String, PipelineError> {
        let metrics = encode_json(&seed.behavior_metrics)?;
        let prompt = format!(
            "### Content Info\n\
             Option: {title}\n\n\
             ### Observed Behavior\n\
             - Summary: {interpretation}\n\
             - Key Metrics: {metrics}\n\n\
             ### Subject's Self-Report (Ground Truth)\n\
             - Preference Score: {score} / 5  (1=Hate, 5=Love)\n\
             - Subject's Comment: \"{comment}\"\n\n\
             Based on this, write the expert analysis paragraph.",
            title = seed.stimulus_content.title,
            interpretation = seed.rule_based_interpretation,
            metrics = metrics,
            score = score,
            comment = comment,
        );

        let text = service.generate(&GenerationRequest::text(ANALYST_SYSTEM_PROMPT, prompt))?;
        Ok(text.trim().to_string())
    }
}

impl Default for Labeler<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::service::testing::ScriptedService;
    use crate::types::{
        BehaviorMetrics, DominantEmotion, GazeLabel, GazeMetrics, GestureLabel, GestureMetrics,
        PostureLabel, PostureMetrics, SeedMeta, StimulusContent,
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn make_seed(session_id: &str, option_id: &str) -> Seed {
        Seed {
            meta: SeedMeta {
                session_id: session_id.to_string(),
                option_id: option_id.to_string(),
                recorded_at: Utc::now(),
                user_context: None,
                source: None,
            },
            stimulus_content: StimulusContent {
                id: option_id.to_string(),
                title: "Quiet Mountain Cabin".to_string(),
                summary: "A remote cabin stay".to_string(),
                buying_point: None,
                pros: vec![],
                cons: vec![],
            },
            behavior_metrics: BehaviorMetrics {
                duration_sec: 10.0,
                fps_mean: 30.0,
                dominant_emotion: DominantEmotion {
                    emotion: "Happiness".to_string(),
                    score: 0.5,
                },
                emotion_full_stats: BTreeMap::new(),
                posture: PostureMetrics {
                    label: PostureLabel::LeaningForward,
                    z_diff: 0.1,
                },
                gesture: GestureMetrics {
                    label: GestureLabel::HeadNodding,
                    var_x: 0.02,
                    var_y: 0.3,
                },
                gaze: GazeMetrics {
                    label: GazeLabel::HighlyFocused,
                },
            },
            rule_based_interpretation: "The user leaned forward.".to_string(),
            label: None,
        }
    }

    fn store_with_seed(dir: &tempfile::TempDir) -> SeedStore {
        let mut store = SeedStore::open(dir.path()).unwrap();
        store.put(&make_seed("abc123", "opt1")).unwrap();
        store
    }

    #[test]
    fn test_label_without_service_uses_comment() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_seed(&dir);

        let outcome = Labeler::new()
            .label(
                &mut store,
                "abc123",
                "opt1",
                4,
                "cozy, I liked it",
                OverwritePolicy::Skip,
            )
            .unwrap();

        assert_eq!(outcome, LabelOutcome::Labeled { replaced: false });
        let seed = store.get("abc123", "opt1").unwrap().unwrap();
        let label = seed.label.unwrap();
        assert_eq!(label.preference_score, 4);
        assert_eq!(label.comment, "cozy, I liked it");
        assert_eq!(label.expert_analysis, "cozy, I liked it");
    }

    #[test]
    fn test_label_with_service_drafts_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_seed(&dir);
        let service = ScriptedService::new(vec![Ok(
            "Strong congruent approach signals across posture and gesture.".to_string(),
        )]);

        let outcome = Labeler::with_service(&service)
            .label(
                &mut store,
                "abc123",
                "opt1",
                5,
                "loved it",
                OverwritePolicy::Skip,
            )
            .unwrap();

        assert_eq!(outcome, LabelOutcome::Labeled { replaced: false });
        assert_eq!(service.call_count(), 1);

        let prompt = &service.prompts()[0];
        assert!(prompt.contains("Quiet Mountain Cabin"));
        assert!(prompt.contains("Preference Score: 5"));
        assert!(prompt.contains("\"loved it\""));
        // Ground truth goes into the prompt; metrics come from the seed.
        assert!(prompt.contains("Leaning Forward"));

        let seed = store.get("abc123", "opt1").unwrap().unwrap();
        assert_eq!(
            seed.label.unwrap().expert_analysis,
            "Strong congruent approach signals across posture and gesture."
        );
    }

    #[test]
    fn test_invalid_score_rejected_before_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_seed(&dir);

        for score in [0u8, 6, 200] {
            let err = Labeler::new()
                .label(
                    &mut store,
                    "abc123",
                    "opt1",
                    score,
                    "x",
                    OverwritePolicy::Skip,
                )
                .unwrap_err();
            assert!(matches!(
                err,
                PipelineError::Data(DataError::InvalidScore(s)) if s == score
            ));
        }
    }

    #[test]
    fn test_unknown_key_is_seed_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_seed(&dir);

        let err = Labeler::new()
            .label(
                &mut store,
                "abc123",
                "opt9",
                3,
                "x",
                OverwritePolicy::Skip,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::State(StateError::SeedNotFound { .. })
        ));
    }

    #[test]
    fn test_skip_policy_keeps_existing_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_seed(&dir);
        let labeler = Labeler::new();

        labeler
            .label(
                &mut store,
                "abc123",
                "opt1",
                2,
                "first",
                OverwritePolicy::Skip,
            )
            .unwrap();
        let outcome = labeler
            .label(
                &mut store,
                "abc123",
                "opt1",
                5,
                "second",
                OverwritePolicy::Skip,
            )
            .unwrap();

        assert_eq!(outcome, LabelOutcome::AlreadyLabeled);
        let label = store.get("abc123", "opt1").unwrap().unwrap().label.unwrap();
        assert_eq!(label.preference_score, 2);
        assert_eq!(label.comment, "first");
    }

    #[test]
    fn test_overwrite_policy_replaces_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_seed(&dir);
        let labeler = Labeler::new();

        labeler
            .label(
                &mut store,
                "abc123",
                "opt1",
                2,
                "first",
                OverwritePolicy::Skip,
            )
            .unwrap();
        let outcome = labeler
            .label(
                &mut store,
                "abc123",
                "opt1",
                5,
                "second",
                OverwritePolicy::Overwrite,
            )
            .unwrap();

        assert_eq!(outcome, LabelOutcome::Labeled { replaced: true });
        let label = store.get("abc123", "opt1").unwrap().unwrap().label.unwrap();
        assert_eq!(label.preference_score, 5);
        assert_eq!(label.comment, "second");
    }

    #[test]
    fn test_service_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_seed(&dir);
        let service = ScriptedService::new(vec![Err(ServiceError::RateLimited)]);

        let err = Labeler::with_service(&service)
            .label(
                &mut store,
                "abc123",
                "opt1",
                4,
                "liked",
                OverwritePolicy::Skip,
            )
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Service(ServiceError::RateLimited)
        ));
        assert!(!store.get("abc123", "opt1").unwrap().unwrap().is_labeled());
    }
}
