//! Prompt templates sent to the model.
//!
//! Placeholders use the `{{name}}` form and are filled by [`fill`]. Unknown
//! placeholders are left untouched.

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Instruction for the SEO metadata call. `{{length_rules}}` is rendered by
/// [`crate::metadata::build_metadata_prompt`].
pub const METADATA: &str = r#"You are an SEO specialist for a stock photography marketplace.
Analyze the attached image and write metadata that helps buyers find it.

{{length_rules}}

Rules:
- The title is a natural, descriptive phrase. No quotes, no trailing period.
- The description mentions the main subject, colors, objects, setting and mood.
- Keywords are single words or short long-tail phrases, most important first, no duplicates.
- The rating is an integer from 1 (weak commercial value) to 5 (excellent commercial value).

Respond with JSON only, in exactly this shape:
{"title": "...", "description": "...", "keywords": "keyword one, keyword two, ...", "rating": 4}"#;

pub const METADATA_LENGTH_FIXED: &str = "- Title: about {{title_length}} words.
- Description: about {{description_length}} words.
- Keywords: exactly {{keyword_count}} comma-separated keywords.";

pub const METADATA_LENGTH_AUTO: &str = "- Title: choose the length that best describes the image (usually 8-15 words).
- Description: choose the length the image deserves (usually 50-120 words).
- Keywords: choose as many relevant keywords as the image supports (usually 15-45).";

/// Stage 1 of the prompt pipeline.
pub const RESEARCH: &str = r#"You are a market research analyst for a leading stock imagery marketplace.
Study the idea below and write a short strategic brief for a creative director.

Idea: {{idea}}
Image style: {{style}}

Cover:
1. The core concepts behind the idea.
2. 15-20 keywords buyers actually search for, literal and conceptual.
3. Visual trends that sell for this subject right now: palette, lighting, composition.
4. Two or three narrower niches worth targeting.

Answer as a concise bullet list. This is a brief, not creative writing."#;

/// Stage 2 of the prompt pipeline.
pub const CREATIVE: &str = r#"You are the creative director of a digital art studio.
Using the research brief below, brainstorm {{count}} distinct image concepts.
Do not write final prompts yet; each concept is one short descriptive sentence.
Vary subject, angle, composition and mood between concepts.

Research brief:
"""
{{research}}
"""

Return a JSON array of {{count}} strings and nothing else."#;

/// Stage 3 of the prompt pipeline.
pub const REFINE: &str = r#"You are a prompt engineer doing final quality control.
Turn each creative concept into a detailed, production-ready prompt for a text-to-image model.

Concepts:
"""
{{concepts}}
"""

Original idea: {{idea}}
Requested style: {{style}}

Instructions:
1. Write one complete prompt per concept.
2. Add technical detail: resolution, lighting, lens or rendering terms, focus.
3. For "photorealistic" use camera language (for example "85mm f/1.8, shallow depth of field").
   For "vector" use illustration language (for example "flat design, clean lines, minimal palette").
4. Negative prompts requested: {{negative}}. When true, add a concise "negativePrompt" per item
   listing typical failure modes (blurry, watermark, text, deformed). When false, omit it.

Return a single JSON object:
{"prompts": [{"prompt": "...", "negativePrompt": "..."}]}"#;

/// Single-call bulk prompt generation with a built-in content policy.
pub const BULK: &str = r#"You are the creative director of a stock imagery agency that only publishes halal (Islamically permissible) images.
Turn the user's idea into {{count}} unique, marketable prompts for a text-to-image model.

Content policy, without exception:
- No faces of people or animals. Show living beings from behind, in silhouette, or through hands, clothing and overall form.
- People wear modest clothing. No nudity or revealing outfits.
- No alcohol, pork, gambling, idols or anything else impermissible.
- No depiction of prophets or revered religious figures.
- No non-Islamic religious symbols such as crosses or statues of deities.

Within that policy, be inventive and commercial:
- Favour subjects that sell: landscapes, architecture, geometric patterns, calligraphy, nature, still life, technology, abstract art.
- Every prompt is rich in detail: lighting, camera angle or lens, art style, composition and mood.
- Every prompt is clearly different from the others. Vary subject, style, lighting and composition, not just a word or two.

User idea: {{idea}}

Respond with JSON only, in exactly this shape:
{"prompts": ["first prompt", "second prompt"]}"#;

/// Minimal call used to check whether a key works.
pub const PROBE: &str = "Reply with the single word: ok";

/// Replaces every `{{key}}` in `template` with its value, in a single pass.
/// Placeholders inside substituted values are not expanded.
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let placeholder =
        PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("static regex is valid"));
    placeholder
        .replace_all(template, |caps: &Captures<'_>| {
            vars.iter()
                .find(|(key, _)| *key == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
