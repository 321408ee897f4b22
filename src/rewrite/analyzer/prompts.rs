//! 提示词构造

use crate::rewrite::rules::ReplacementRule;

const EXCLUSIONS: &str = "\
Do NOT select phrases that:
- Contain or overlap with dates, years, or specific time references
- Are proper nouns (people, places, companies, organizations, historical events)
- Would make the sentence less precise, factually inaccurate, or temporally vague";

const PRESERVATION: &str = "\
Ensure replacements preserve:
   - The grammatical structure
   - The meaning and tone
   - Natural sentence flow";

/// 为段落加上从 0 开始的编号标记
pub fn combine_paragraphs(blocks: &[String]) -> String {
    blocks
        .iter()
        .enumerate()
        .map(|(index, text)| format!("[Paragraph {}]\n{}", index, text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn describe_concepts(concepts: &[String]) -> String {
    match concepts {
        [single] => format!("concept: \"{}\"", single),
        many => format!(
            "concepts: {}",
            many.iter()
                .map(|c| format!("\"{}\"", c))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// 批量分析提示词
pub fn batch_prompt(blocks: &[String], rules: &[ReplacementRule]) -> String {
    let rules_description = rules
        .iter()
        .map(|rule| {
            format!(
                "- Rule ID \"{}\": {} → Replacement word: \"{}\"",
                rule.id,
                describe_concepts(rule.concepts()),
                rule.replacement
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a context-aware AI trained to help users learn vocabulary by replacing concepts naturally and accurately.

Your task is to analyze the given text (which contains multiple paragraphs) and find phrases that match ANY of the replacement rules below. For each paragraph, identify phrases that can be replaced according to the rules.

Text to analyze:
"""
{text}
"""

Replacement Rules:
{rules}

Instructions:
1. For each paragraph, identify phrases that convey the same meaning as any of the concepts above and can be replaced with a grammatically adapted form of the corresponding replacement word.
2. {preservation}
3. You may adapt the form of replacement words to fit the context (tense, part of speech, etc.).

{exclusions}

Output format:
Return a JSON object with one key: "results", containing an array of objects, each with:
- "paragraph_index": the paragraph number (0-based, matching the [Paragraph X] markers)
- "rule_id": the ID of the matching rule
- "original_phrase": the exact phrase in the text to replace
- "replacement_form": the adjusted form of the replacement word to insert

Example:
{{
  "results": [
    {{ "paragraph_index": 0, "rule_id": "123", "original_phrase": "very happy", "replacement_form": "ecstatic" }},
    {{ "paragraph_index": 1, "rule_id": "456", "original_phrase": "a warm feeling", "replacement_form": "nostalgia" }}
  ]
}}

Return only the JSON, no additional text."#,
        text = combine_paragraphs(blocks),
        rules = rules_description,
        preservation = PRESERVATION,
        exclusions = EXCLUSIONS,
    )
}

/// 单规则提示词
pub fn single_prompt(text: &str, concepts: &[String], replacement: &str) -> String {
    let concept_description = match concepts {
        [single] => format!("the concept \"{}\"", single),
        many => format!(
            "any of these concepts: {}",
            many.iter()
                .map(|c| format!("\"{}\"", c))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };

    format!(
        r#"You are a context-aware AI trained to help users learn vocabulary by replacing concepts naturally and accurately.

Your task is to analyze the given text and return phrases that express the same meaning as {concepts} and can be replaced with a grammatically appropriate form of "{replacement}".

Text to analyze:
"""
{text}
"""

Instructions:
1. Identify phrases that convey the same meaning as {concepts} and that can be replaced with a grammatically adapted form of "{replacement}".
2. {preservation}

{exclusions}

Output format:
Return a JSON object with one key: "replacements", containing an array of objects, each with:
- "original_phrase": the exact phrase in the text to replace
- "replacement_form": the adjusted form of "{replacement}" to insert

Return only the JSON, no additional text."#,
        concepts = concept_description,
        replacement = replacement,
        text = text,
        preservation = PRESERVATION,
        exclusions = EXCLUSIONS,
    )
}

/// 概念提取提示词
pub fn concept_prompt(word: &str, max_concepts: usize) -> String {
    format!(
        r#"You are a language analysis AI. Given the word or phrase "{word}", identify up to {max} of the most common English words, phrases, synonyms, or concepts it could replace in everyday text. Include both single words AND multi-word phrases. Return a JSON array of strings, with no explanation or extra text.

Important: Include a mix of:
- Single words (e.g., "happy", "joyful")
- Common phrases (e.g., "very happy", "so happy", "extremely happy")
- Idiomatic expressions when relevant

Example: For "ecstatic", return: ["happy", "very happy", "so happy", "extremely happy", "overjoyed", "thrilled", "delighted", "elated", "over the moon"]
Example: For "nostalgia", return: ["warm feeling", "warm feeling about the past", "feeling of longing", "sentimental yearning", "homesickness", "longing", "reminiscence", "wistfulness"]

Return format: ["concept1", "concept2", "concept3", ...] (up to {max} items)"#,
        word = word,
        max = max_concepts
    )
}
