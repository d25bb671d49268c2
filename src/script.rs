use regex::Regex;

use crate::error::{ReelError, Result};

/// A stretch of script spoken by one voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSegment {
    /// Speaker label; empty for unlabelled narration.
    pub speaker: String,
    pub text: String,
}

/// Split a script into speaker segments.
///
/// A line of the form `Name: text` starts a segment when `Name` is one of
/// `speakers` (case-insensitive); other lines continue the current one.
/// Consecutive lines from the same speaker merge. A script with no known
/// speaker labels is one segment with an empty speaker.
pub fn split_script(script: &str, speakers: &[String]) -> Result<Vec<ScriptSegment>> {
    if script.trim().is_empty() {
        return Err(ReelError::InvalidInput("script is empty".to_string()));
    }

    let label = Regex::new(r"^\s*([^:\n]{1,40}?)\s*:\s*(.*)$")
        .map_err(|e| ReelError::InvalidInput(format!("speaker pattern: {e}")))?;

    let mut segments: Vec<ScriptSegment> = Vec::new();

    for line in script.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let labelled = label.captures(line).and_then(|caps| {
            let name = caps.get(1)?.as_str();
            let speaker = speakers.iter().find(|s| s.eq_ignore_ascii_case(name))?;
            Some((speaker.clone(), caps.get(2).map(|m| m.as_str()).unwrap_or("")))
        });

        match labelled {
            Some((speaker, text)) => match segments.last_mut() {
                Some(last) if last.speaker == speaker => push_text(&mut last.text, text),
                _ => segments.push(ScriptSegment {
                    speaker,
                    text: text.trim().to_string(),
                }),
            },
            None => match segments.last_mut() {
                Some(last) => push_text(&mut last.text, line),
                None => segments.push(ScriptSegment {
                    speaker: String::new(),
                    text: line.to_string(),
                }),
            },
        }
    }

    segments.retain(|s| !s.text.trim().is_empty());
    if segments.is_empty() {
        return Err(ReelError::InvalidInput(
            "script has no spoken text".to_string(),
        ));
    }

    Ok(segments)
}

fn push_text(target: &mut String, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}
