//! Parser for sectioned prompt-service replies.
//!
//! Language models are asked to answer in labelled sections:
//!
//! ```text
//! ANALYSIS: ...
//! PROMPT: ...
//! NEGATIVE: ...
//! CONFIDENCE: HIGH
//! FOLDER: chair_oak
//! ```
//!
//! Sections may appear in any order. A reply without any label is taken as
//! the prompt verbatim.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::error::ServiceError;
use super::types::{GeneratedPrompt, IndustryDomain, RenderStyle};
use crate::identity::sanitize_handle;

/// Negative prompt used when the reply carries none.
pub const FALLBACK_NEGATIVE_PROMPT: &str =
    "cartoon, anime, stylized, low quality, blurry, deformed, unrealistic proportions, bad anatomy";

const FALLBACK_CONFIDENCE: &str = "MEDIUM";

static SECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t>*#]*(ANALYSIS|NEGATIVE(?: PROMPT)?|PROMPT|CONFIDENCE|FOLDER)[ \t*]*:")
        .expect("section regex is valid")
});

#[derive(Default)]
struct Sections {
    analysis: Option<String>,
    prompt: Option<String>,
    negative: Option<String>,
    confidence: Option<String>,
    folder: Option<String>,
}

fn clean(text: &str) -> String {
    text.replace("```", "").trim().to_string()
}

fn split_sections(text: &str) -> Option<Sections> {
    let markers: Vec<(usize, usize, String)> = SECTION_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let label = caps.get(1)?.as_str().to_string();
            Some((whole.start(), whole.end(), label))
        })
        .collect();

    if markers.is_empty() {
        return None;
    }

    let mut sections = Sections::default();
    for (i, (_, body_start, label)) in markers.iter().enumerate() {
        let body_end = markers
            .get(i + 1)
            .map(|(start, _, _)| *start)
            .unwrap_or(text.len());
        let body = clean(&text[*body_start..body_end]);
        if body.is_empty() {
            continue;
        }

        let slot = match label.as_str() {
            "ANALYSIS" => &mut sections.analysis,
            "PROMPT" => &mut sections.prompt,
            "CONFIDENCE" => &mut sections.confidence,
            "FOLDER" => &mut sections.folder,
            _ => &mut sections.negative,
        };
        if slot.is_none() {
            *slot = Some(body);
        }
    }

    Some(sections)
}

/// Parses a prompt-service reply.
///
/// `domain` and `style` are the effective hints of the request; they are
/// echoed into the result since the reply does not restate them.
pub fn parse_prompt_reply(
    text: &str,
    domain: IndustryDomain,
    style: RenderStyle,
) -> Result<GeneratedPrompt, ServiceError> {
    let sections = split_sections(text).unwrap_or_else(|| Sections {
        prompt: Some(clean(text)),
        ..Default::default()
    });

    let prompt = sections
        .prompt
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ServiceError::invalid("reply contains no prompt"))?;

    let suggested_identifier = sections
        .folder
        .map(|f| sanitize_handle(f.lines().next().unwrap_or_default()))
        .filter(|f| !f.is_empty());

    Ok(GeneratedPrompt {
        prompt,
        negative_prompt: sections
            .negative
            .unwrap_or_else(|| FALLBACK_NEGATIVE_PROMPT.to_string()),
        analysis: sections.analysis,
        confidence: Some(
            sections
                .confidence
                .unwrap_or_else(|| FALLBACK_CONFIDENCE.to_string()),
        ),
        detected_domain: domain.as_str().to_string(),
        style: style.as_str().to_string(),
        suggested_identifier,
    })
}
