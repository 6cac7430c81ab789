//! Guideline-driven session judging
//!
//! The judge applies the active guideline to one session's Seeds and predicts
//! which option the subject subconsciously preferred. It reasons only from
//! observable behavior: option titles, metrics, and the rule-based
//! interpretation go into the request; ground-truth labels are withheld.
//!
//! Exactly one reasoning-service call is issued per evaluation, and the
//! response is validated strictly: every analyzed title must come from the
//! supplied set and the final recommendation must be one of them. Anything
//! else fails the evaluation; no best-effort result is returned.

use crate::error::{PipelineError, ServiceError, StateError};
use crate::service::{encode_json, strip_code_fences, GenerationRequest, ReasoningService};
use crate::store::{GuidelineStore, SeedStore};
use crate::types::{BehaviorMetrics, Recommendation, Seed};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

const JUDGE_SYSTEM_PROMPT: &str = "\
You are a behavioral judge agent. Your job is to strictly follow the provided \
diagnostic guideline to evaluate user preferences.

RULES:
1. Do NOT use your own subjective opinion. Use the interpretation rules in the guideline.
2. Analyze the user's behavior for EACH option provided.
3. Compare the options and select the one with the highest predicted preference.
4. Explain your reasoning based on the specific signals defined in the guideline.

OUTPUT FORMAT (JSON):
{
  \"analysis_per_option\": {
    \"Option A Title\": \"Reasoning based on guideline...\",
    \"Option B Title\": \"Reasoning based on guideline...\"
  },
  \"final_recommendation\": \"Title of the best option\",
  \"winning_reason\": \"Why this option won (referencing behavioral signals)\"
}";

/// Per-option payload forwarded to the reasoning service. Deliberately omits
/// the ground-truth label fields.
#[derive(Debug, Serialize)]
struct OptionSummary<'a> {
    option_title: &'a str,
    behavior_metrics: &'a BehaviorMetrics,
    rule_based_interpretation: &'a str,
}

/// Ranks one session's options against the active guideline
pub struct Judge<'a> {
    service: &'a dyn ReasoningService,
}

impl<'a> Judge<'a> {
    pub fn new(service: &'a dyn ReasoningService) -> Self {
        Self { service }
    }

    /// Evaluate every option of `session_id` against the active guideline.
    ///
    /// Fails with [`StateError::SessionNotFound`] when the session has no
    /// Seeds and [`StateError::NoGuideline`] when no synthesis has succeeded
    /// yet; neither case reaches the reasoning service. A response that does
    /// not parse, names an option outside the supplied set, or recommends an
    /// unknown title fails with [`PipelineError::Inference`].
    pub fn evaluate(
        &self,
        seeds: &SeedStore,
        guidelines: &GuidelineStore,
        session_id: &str,
    ) -> Result<Recommendation, PipelineError> {
        let session = seeds.get_session(session_id)?;
        if session.is_empty() {
            return Err(StateError::SessionNotFound(session_id.to_string()).into());
        }

        let guideline = guidelines
            .load()?
            .ok_or(StateError::NoGuideline)?;

        let prompt = build_prompt(&guideline, session_id, &session)?;
        info!(session_id, options = session.len(), "judging session");

        let raw = self
            .service
            .generate(&GenerationRequest::json(JUDGE_SYSTEM_PROMPT, prompt))?;

        let recommendation = parse_response(&raw)?;
        validate_titles(&recommendation, &session)?;

        info!(
            session_id,
            recommendation = %recommendation.final_recommendation,
            "session judged"
        );
        Ok(recommendation)
    }
}

fn build_prompt(
    guideline: &str,
    session_id: &str,
    session: &[Seed],
) -> Result<String, ServiceError> {
    let summaries: Vec<OptionSummary<'_>> = session
        .iter()
        .map(|seed| OptionSummary {
            option_title: &seed.stimulus_content.title,
            behavior_metrics: &seed.behavior_metrics,
            rule_based_interpretation: &seed.rule_based_interpretation,
        })
        .collect();
    let data = encode_json(&summaries)?;

    Ok(format!(
        "### Reference Document\n\
         [Diagnostic Guideline]\n\
         {guideline}\n\n\
         ### Task\n\
         Compare the following {count} options viewed by the user in session {session_id}.\n\
         Predict which option the user subconsciously preferred based on the guideline.\n\
         Key your analysis exactly by the option titles given below; analyze every option\n\
         and recommend exactly one of them.\n\n\
         [Observed Options Data]\n\
         {data}",
        guideline = guideline,
        count = session.len(),
        session_id = session_id,
        data = data,
    ))
}

fn parse_response(raw: &str) -> Result<Recommendation, PipelineError> {
    serde_json::from_str(strip_code_fences(raw)).map_err(|e| {
        warn!(error = %e, "judge response did not parse");
        PipelineError::Inference(format!("unparsable judge response: {}", e))
    })
}

/// Reject invented option titles and out-of-set recommendations
fn validate_titles(
    recommendation: &Recommendation,
    session: &[Seed],
) -> Result<(), PipelineError> {
    let supplied: BTreeSet<&str> = session
        .iter()
        .map(|s| s.stimulus_content.title.as_str())
        .collect();

    for title in recommendation.analysis_per_option.keys() {
        if !supplied.contains(title.as_str()) {
            return Err(PipelineError::Inference(format!(
                "analysis names unknown option \"{}\"",
                title
            )));
        }
    }

    if !supplied.contains(recommendation.final_recommendation.as_str()) {
        return Err(PipelineError::Inference(format!(
            "recommendation \"{}\" is not one of the supplied options",
            recommendation.final_recommendation
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::ScriptedService;
    use crate::types::{
        DominantEmotion, GazeLabel, GazeMetrics, GestureLabel, GestureMetrics, Label,
        PostureLabel, PostureMetrics, SeedMeta, StimulusContent,
    };
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn seed_with_title(session_id: &str, option_id: &str, title: &str) -> Seed {
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
                title: title.to_string(),
                summary: "summary".to_string(),
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
            label: Some(Label {
                preference_score: 5,
                comment: "secret ground truth".to_string(),
                expert_analysis: "secret analysis".to_string(),
                labeled_at: Utc::now(),
            }),
        }
    }

    fn stores_with_session(dir: &tempfile::TempDir) -> (SeedStore, GuidelineStore) {
        let mut seeds = SeedStore::open(dir.path().join("seeds")).unwrap();
        seeds.put(&seed_with_title("abc123", "opt1", "A")).unwrap();
        seeds.put(&seed_with_title("abc123", "opt2", "B")).unwrap();
        seeds.put(&seed_with_title("abc123", "opt3", "C")).unwrap();

        let guidelines = GuidelineStore::new(dir.path().join("guideline.md"));
        guidelines.replace("# Guideline\nForward lean wins.").unwrap();
        (seeds, guidelines)
    }

    fn valid_response() -> String {
        serde_json::json!({
            "analysis_per_option": {
                "A": "Stable posture, weak signals.",
                "B": "Forward lean with sustained focus.",
                "C": "Distracted gaze."
            },
            "final_recommendation": "B",
            "winning_reason": "Strongest approach signals under the posture rules."
        })
        .to_string()
    }

    #[test]
    fn test_unknown_session_never_calls_service() {
        let dir = tempfile::tempdir().unwrap();
        let (seeds, guidelines) = stores_with_session(&dir);
        let service = ScriptedService::new(vec![]);

        let err = Judge::new(&service)
            .evaluate(&seeds, &guidelines, "zzz999")
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::State(StateError::SessionNotFound(ref s)) if s == "zzz999"
        ));
        assert_eq!(service.call_count(), 0);
    }

    #[test]
    fn test_missing_guideline_never_calls_service() {
        let dir = tempfile::tempdir().unwrap();
        let mut seeds = SeedStore::open(dir.path().join("seeds")).unwrap();
        seeds.put(&seed_with_title("abc123", "opt1", "A")).unwrap();
        let guidelines = GuidelineStore::new(dir.path().join("guideline.md"));
        let service = ScriptedService::new(vec![]);

        let err = Judge::new(&service)
            .evaluate(&seeds, &guidelines, "abc123")
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::State(StateError::NoGuideline)
        ));
        assert_eq!(service.call_count(), 0);
    }

    #[test]
    fn test_valid_response_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let (seeds, guidelines) = stores_with_session(&dir);
        let service = ScriptedService::new(vec![Ok(valid_response())]);

        let recommendation = Judge::new(&service)
            .evaluate(&seeds, &guidelines, "abc123")
            .unwrap();

        assert_eq!(service.call_count(), 1);
        assert_eq!(recommendation.final_recommendation, "B");
        assert_eq!(recommendation.analysis_per_option.len(), 3);

        // Labels are withheld: the prompt carries metrics and interpretation
        // but never the ground truth.
        let prompt = &service.prompts()[0];
        assert!(prompt.contains("Forward lean wins."));
        assert!(prompt.contains("\"option_title\": \"B\""));
        assert!(prompt.contains("The user leaned forward."));
        assert!(!prompt.contains("secret ground truth"));
        assert!(!prompt.contains("secret analysis"));
        assert!(!prompt.contains("preference_score"));
    }

    #[test]
    fn test_fenced_json_response_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let (seeds, guidelines) = stores_with_session(&dir);
        let fenced = format!("```json\n{}\n```", valid_response());
        let service = ScriptedService::new(vec![Ok(fenced)]);

        let recommendation = Judge::new(&service)
            .evaluate(&seeds, &guidelines, "abc123")
            .unwrap();
        assert_eq!(recommendation.final_recommendation, "B");
    }

    #[test]
    fn test_invented_option_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (seeds, guidelines) = stores_with_session(&dir);
        let response = serde_json::json!({
            "analysis_per_option": {
                "A": "x", "B": "y", "C": "z", "Phantom Option": "invented"
            },
            "final_recommendation": "B",
            "winning_reason": "r"
        })
        .to_string();
        let service = ScriptedService::new(vec![Ok(response)]);

        let err = Judge::new(&service)
            .evaluate(&seeds, &guidelines, "abc123")
            .unwrap_err();

        assert!(matches!(err, PipelineError::Inference(ref m) if m.contains("Phantom Option")));
    }

    #[test]
    fn test_out_of_set_recommendation_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (seeds, guidelines) = stores_with_session(&dir);
        let response = serde_json::json!({
            "analysis_per_option": {"A": "x", "B": "y", "C": "z"},
            "final_recommendation": "D",
            "winning_reason": "r"
        })
        .to_string();
        let service = ScriptedService::new(vec![Ok(response)]);

        let err = Judge::new(&service)
            .evaluate(&seeds, &guidelines, "abc123")
            .unwrap_err();

        assert!(matches!(err, PipelineError::Inference(ref m) if m.contains("\"D\"")));
    }

    #[test]
    fn test_unparsable_response_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (seeds, guidelines) = stores_with_session(&dir);
        let service = ScriptedService::new(vec![Ok("the best option is B".to_string())]);

        let err = Judge::new(&service)
            .evaluate(&seeds, &guidelines, "abc123")
            .unwrap_err();

        assert!(matches!(err, PipelineError::Inference(_)));
    }

    #[test]
    fn test_service_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let (seeds, guidelines) = stores_with_session(&dir);
        let service = ScriptedService::new(vec![Err(ServiceError::Timeout)]);

        let err = Judge::new(&service)
            .evaluate(&seeds, &guidelines, "abc123")
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Service(ServiceError::Timeout)
        ));
    }
}
