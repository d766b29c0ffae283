//! Fixed prompt templates, one per content kind.

use serde_json::Value;

use super::ContentKind;

const PUZZLE_TEMPLATE: &str = "Translate the following puzzle into {language}. \
Keep the meaning, tone and any numbers or names exactly. \
Reply with only a JSON object with the keys \"title\", \"question\", \"idealAnswer\" and \
\"keyPrinciples\" (an array with the same number of items as the input).\n\n{content}";

const SCENARIO_TEMPLATE: &str = "Translate the following training scenario into {language}. \
Keep proper names, figures and dates unchanged. \
Reply with only a JSON object with the same keys as the input and arrays of the same length.\n\n{content}";

const FEEDBACK_TEXT_TEMPLATE: &str = "Translate the following feedback into {language}. \
Reply with only the translated text, no commentary.\n\n{content}";

const FEEDBACK_JSON_TEMPLATE: &str = "Translate every string value in the following JSON into {language}. \
Keep all keys, numbers and structure unchanged. Reply with only the JSON.\n\n{content}";

/// Render the prompt for `kind`, embedding the target language as the caller
/// spelled it and the serialized content snapshot.
pub fn render(kind: ContentKind, language: &str, snapshot: &Value) -> String {
    let (template, content) = match (kind, snapshot) {
        (ContentKind::Feedback, Value::String(text)) => (FEEDBACK_TEXT_TEMPLATE, text.clone()),
        (ContentKind::Feedback, other) => (FEEDBACK_JSON_TEMPLATE, pretty(other)),
        (ContentKind::Puzzle, other) => (PUZZLE_TEMPLATE, pretty(other)),
        (ContentKind::Scenario, other) => (SCENARIO_TEMPLATE, pretty(other)),
    };
    template
        .replace("{language}", language.trim())
        .replace("{content}", &content)
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
