// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extraction of a JSON value embedded in free-form model text.
//!
//! Text-generation providers routinely wrap JSON in prose or code fences
//! despite instructions not to, so callers cannot feed model output to a
//! decoder directly. This module strips fences, locates the first balanced
//! object or array, and decodes that slice. No shape validation happens
//! here; callers check "must be an array" and friends themselves.

use crate::error::ExtractError;

/// Remove markdown fence markers at line starts, keeping everything else.
fn strip_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.trim().lines() {
        let trimmed = line.trim_start();
        let kept = if let Some(rest) = trimmed.strip_prefix("```json") {
            rest.trim_start()
        } else if let Some(rest) = trimmed.strip_prefix("```") {
            rest.trim_start()
        } else {
            line
        };
        if !kept.is_empty() {
            out.push_str(kept);
        }
        out.push('\n');
    }
    out.trim().to_string()
}

/// Locate the first balanced JSON object or array in `text`.
///
/// Walks a bracket depth counter while honoring quoted strings and escape
/// sequences. If the brackets never close, the remainder of the input is
/// returned and left for the decoder to reject.
pub fn extract_candidate(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escape = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match c {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    Some(&text[start..])
}

/// Extract and decode the first JSON value embedded in model output.
pub fn extract_json(text: &str) -> Result<serde_json::Value, ExtractError> {
    let cleaned = strip_fences(text);
    let candidate = extract_candidate(&cleaned).ok_or(ExtractError::NoJsonFound)?;
    Ok(serde_json::from_str(candidate)?)
}
