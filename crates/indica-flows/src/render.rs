// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Placeholder substitution for template content.
//!
//! `{key}` tokens are replaced with the matching variable when it is a
//! string or a number. Anything else, including unknown keys, is left
//! verbatim so a broken template is visible in the delivered text.

use std::sync::LazyLock;

use indica_core::event::{INDICATOR_JOINED, LEAD_INDICATED, REWARD_EARNED};
use indica_core::{MessageContent, Variables};
use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap());

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0) {
                Some(format!("{f:.0}"))
            } else {
                Some(n.to_string())
            }
        }
        _ => None,
    }
}

/// Substitutes `{key}` tokens in `text`.
pub fn render_text(text: &str, variables: &Variables) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            variables
                .get(&caps[1])
                .and_then(render_value)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Renders body, header and footer. Buttons are copied as-is.
pub fn render_content(content: &MessageContent, variables: &Variables) -> MessageContent {
    MessageContent {
        body: render_text(&content.body, variables),
        header: content.header.as_deref().map(|h| render_text(h, variables)),
        footer: content.footer.as_deref().map(|f| render_text(f, variables)),
        buttons: content.buttons.clone(),
    }
}

/// The line appended to every flow message for `trigger`.
pub fn courtesy_line(trigger: &str) -> &'static str {
    match trigger {
        INDICATOR_JOINED => "Obrigado por fazer parte da nossa campanha!",
        LEAD_INDICATED => "Você recebeu esta mensagem porque foi indicado por um amigo.",
        REWARD_EARNED => "Continue indicando para ganhar mais recompensas!",
        _ => "Esta é uma mensagem automática.",
    }
}

/// Appends the courtesy line for `trigger` as its own paragraph.
pub fn with_courtesy_line(mut content: MessageContent, trigger: &str) -> MessageContent {
    content.body = format!("{}\n\n{}", content.body.trim_end(), courtesy_line(trigger));
    content
}
