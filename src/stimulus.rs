//! Option description
//!
//! Upstream collaborator that turns the operator's raw option strings into
//! the persuasive [`StimulusContent`] records shown to the subject during a
//! trial. The Seed stores the returned records verbatim.

use crate::error::PipelineError;
use crate::service::{strip_code_fences, GenerationRequest, ReasoningService};
use crate::types::StimulusContent;
use serde::Deserialize;
use tracing::info;

const CURATOR_SYSTEM_PROMPT: &str = "\
You are a charismatic curator who helps people realize the hidden value of \
their choices. Your goal is not just to explain options, but to highlight \
clearly why a user should choose each one.

TASKS:
1. Identify the core value proposition of each option (why is this special?).
2. Write a persuasive description that appeals to emotions and practical benefits.
3. Make the user feel \"I really need this\".

OUTPUT FORMAT (JSON ONLY):
{
  \"options\": [
    {
      \"id\": \"opt1\",
      \"title\": \"<short, attractive title>\",
      \"summary\": \"<persuasive pitch, 3-4 sentences, benefits not just facts>\",
      \"buying_point\": \"<one punchline sentence: the biggest reason to pick this>\",
      \"pros\": [\"<benefit 1>\", \"<benefit 2>\"],
      \"cons\": [\"<trade-off 1>\", \"<trade-off 2>\"]
    }
  ]
}

RULES:
- Tone: engaging, insightful, persuasive (but not scammy).
- Focus on benefits (what they get), not just features (what it is).
- Use ids opt1, opt2, ... in the order the options are given.";

#[derive(Debug, Deserialize)]
struct DescribedOptions {
    #[serde(default)]
    options: Vec<StimulusContent>,
}

/// Describe raw option strings for presentation to the subject.
///
/// Returns one [`StimulusContent`] per input option, in input order, with
/// ids `opt1`, `opt2`, ... A response with the wrong option count or
/// out-of-order ids fails with [`PipelineError::Inference`].
pub fn describe_options(
    service: &dyn ReasoningService,
    options: &[String],
    user_context: Option<&str>,
) -> Result<Vec<StimulusContent>, PipelineError> {
    if options.is_empty() {
        return Ok(Vec::new());
    }

    let options_block: String = options
        .iter()
        .enumerate()
        .map(|(i, opt)| format!("{}. {}\n", i + 1, opt))
        .collect();
    let context_block = match user_context {
        Some(context) => format!("\n[Decision Context]\n{}\n", context),
        None => String::new(),
    };
    let prompt = format!(
        "Please analyze the following options and create a persuasive guide for the user.\n\
         Focus on WHY they should choose each one.\n\
         {context_block}\n\
         [Options]\n\
         {options_block}",
        context_block = context_block,
        options_block = options_block,
    );

    let mut request = GenerationRequest::json(CURATOR_SYSTEM_PROMPT, prompt);
    // A little creative latitude makes the pitches land better.
    request.temperature = Some(0.7);

    let raw = service.generate(&request)?;
    let described: DescribedOptions = serde_json::from_str(strip_code_fences(&raw))
        .map_err(|e| PipelineError::Inference(format!("unparsable option descriptions: {}", e)))?;

    if described.options.len() != options.len() {
        return Err(PipelineError::Inference(format!(
            "expected {} described options, got {}",
            options.len(),
            described.options.len()
        )));
    }
    for (i, content) in described.options.iter().enumerate() {
        let expected = format!("opt{}", i + 1);
        if content.id != expected {
            return Err(PipelineError::Inference(format!(
                "described option {} carries id \"{}\", expected \"{}\"",
                i + 1,
                content.id,
                expected
            )));
        }
    }

    info!(count = described.options.len(), "options described");
    Ok(described.options)
}
