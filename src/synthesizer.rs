//! Guideline synthesis
//!
//! Turns the labeled-Seed corpus into the single active guideline document
//! via a two-stage protocol, executed as a unit:
//!
//! 1. **Draft.** Each labeled Seed (lexical key order) is submitted on its
//!    own and yields a short case-specific interpretive rule. A per-case
//!    service failure is logged and the case skipped; one bad case never
//!    aborts the synthesis.
//! 2. **Consolidate.** The surviving drafts are merged in one request into a
//!    structured document with posture, gaze/gesture, and emotion rule
//!    sections plus a scoring rubric. This call is fatal on failure.
//!
//! Only on full success does the result replace the active guideline; every
//! failure path leaves the previous guideline untouched.

use crate::error::{PipelineError, ServiceError, StateError};
use crate::service::{encode_json, GenerationRequest, ReasoningService};
use crate::store::{GuidelineStore, SeedStore};
use crate::types::{Seed, SeedKey};
use tracing::{info, warn};

const DRAFTER_SYSTEM_PROMPT: &str = "\
You are a lead researcher in behavioral psychology studying how non-verbal \
behavior predicts preference.

You will receive ONE labeled case: observed behavioral metrics, an expert's \
ground-truth analysis, and the subject's actual preference score.

TASK:
Write a short interpretive rule draft (2-4 sentences) capturing what this \
single case teaches about mapping behavioral signals to preference. State \
the rule in general terms (e.g. \"Leaning forward with sustained focus \
suggests high interest\"), grounded only in this case.";

const CONSOLIDATOR_SYSTEM_PROMPT: &str = "\
You are a lead researcher in behavioral psychology. Your goal is to \
synthesize a diagnostic guideline from per-case rule drafts.

TASK:
1. Identify the consistent patterns across the drafts.
2. Resolve contradictions conservatively; prefer rules supported by several cases.
3. Produce a step-by-step guideline that future agents can apply to predict preference.

OUTPUT FORMAT (Markdown):
A clean Markdown document titled \"Behavioral Analysis Guideline for Preference Prediction\" with sections:
- Step 1: Analyze Posture (interpretation rules)
- Step 2: Analyze Gaze & Gestures (interpretation rules)
- Step 3: Analyze Micro-expressions (interpretation rules)
- Final Scoring Rubric (how to derive a 1-5 score)";

/// What one synthesis run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisReport {
    /// Labeled Seeds found in the store
    pub cases_total: usize,
    /// Cases whose draft call succeeded
    pub drafts_succeeded: usize,
    /// Keys of cases skipped after a draft failure
    pub skipped: Vec<SeedKey>,
    /// The new active guideline text
    pub guideline: String,
}

/// Bootstraps the diagnostic guideline from labeled Seeds
pub struct GuidelineSynthesizer<'a> {
    service: &'a dyn ReasoningService,
}

impl<'a> GuidelineSynthesizer<'a> {
    pub fn new(service: &'a dyn ReasoningService) -> Self {
        Self { service }
    }

    /// Run the full draft/consolidate protocol and atomically replace the
    /// active guideline on success.
    ///
    /// Fails with [`StateError::InsufficientData`] when the store holds no
    /// labeled Seeds. If every draft call fails, the last service error is
    /// returned and consolidation is never attempted. All failure paths
    /// leave the previous guideline in place.
    pub fn synthesize(
        &self,
        seeds: &SeedStore,
        guidelines: &GuidelineStore,
    ) -> Result<SynthesisReport, PipelineError> {
        let labeled = seeds.labeled_seeds()?;
        if labeled.is_empty() {
            return Err(StateError::InsufficientData.into());
        }

        info!(cases = labeled.len(), "drafting case rules");

        let mut drafts: Vec<(SeedKey, String)> = Vec::new();
        let mut skipped = Vec::new();
        let mut last_error: Option<ServiceError> = None;

        for seed in &labeled {
            let key = seed.key();
            match self.draft_case(seed) {
                Ok(draft) => drafts.push((key, draft)),
                Err(e) => {
                    warn!(key = %key, error = %e, "case draft failed, skipping");
                    skipped.push(key);
                    last_error = Some(e);
                }
            }
        }

        if drafts.is_empty() {
            // last_error is always set here: every case failed.
            let e = last_error.unwrap_or(ServiceError::EmptyResponse);
            return Err(e.into());
        }

        let guideline = self.consolidate(&drafts)?;
        guidelines.replace(&guideline)?;

        info!(
            drafts = drafts.len(),
            skipped = skipped.len(),
            "guideline replaced"
        );

        Ok(SynthesisReport {
            cases_total: labeled.len(),
            drafts_succeeded: drafts.len(),
            skipped,
            guideline,
        })
    }

    fn draft_case(&self, seed: &Seed) -> Result<String, ServiceError> {
        let label = match &seed.label {
            Some(label) => label,
            // labeled_seeds() only returns labeled Seeds
            None => return Err(ServiceError::InvalidRequest("unlabeled case".to_string())),
        };
        let metrics = encode_json(&seed.behavior_metrics)?;
        let prompt = format!(
            "[Case {key}]\n\
             - Observed Metrics: {metrics}\n\
             - Behavioral Summary: {interpretation}\n\
             - Expert Analysis (Ground Truth): {analysis}\n\
             - Actual Preference Score: {score} / 5\n\n\
             Write the interpretive rule draft for this case.",
            key = seed.key(),
            metrics = metrics,
            interpretation = seed.rule_based_interpretation,
            analysis = label.expert_analysis,
            score = label.preference_score,
        );

        let text = self
            .service
            .generate(&GenerationRequest::text(DRAFTER_SYSTEM_PROMPT, prompt))?;
        Ok(text.trim().to_string())
    }

    fn consolidate(&self, drafts: &[(SeedKey, String)]) -> Result<String, ServiceError> {
        let mut body = String::new();
        for (key, draft) in drafts {
            body.push_str(&format!("[Draft from case {}]\n{}\n\n", key, draft));
        }
        let prompt = format!(
            "Here are {count} per-case rule drafts.\n\
             Synthesize a unified behavioral analysis guideline based ONLY on these drafts.\n\n\
             [Rule Drafts]\n{body}",
            count = drafts.len(),
            body = body,
        );

        let text = self
            .service
            .generate(&GenerationRequest::text(CONSOLIDATOR_SYSTEM_PROMPT, prompt))?;
        Ok(text.trim().to_string())
    }
}
