pub mod openai;

pub use openai::OpenAiCueWriter;

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ReelError, Result};
use crate::visuals::VisualCue;

/// Drafts visual cues for a narration script.
#[async_trait]
pub trait CueWriter: Send + Sync {
    async fn draft_cues(&self, script: &str) -> Result<Vec<VisualCue>>;
    fn name(&self) -> &'static str;
}

/// Cues fixed up front, typically loaded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticCues {
    cues: Vec<VisualCue>,
}

impl StaticCues {
    pub fn new(cues: Vec<VisualCue>) -> Self {
        Self { cues }
    }

    /// Load cues from a JSON file holding either a list of cues or an
    /// object with a `visuals` list.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ReelError::InvalidInput(format!("cannot read cues file {}: {e}", path.display()))
        })?;
        Ok(Self::new(parse_cues(&contents)?))
    }
}

#[async_trait]
impl CueWriter for StaticCues {
    async fn draft_cues(&self, _script: &str) -> Result<Vec<VisualCue>> {
        Ok(self.cues.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CueDocument {
    Wrapped { visuals: Vec<VisualCue> },
    List(Vec<VisualCue>),
}

/// Strip a surrounding Markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse cue JSON, dropping cues without a keyword.
///
/// A missing search query falls back to the keyword.
pub fn parse_cues(text: &str) -> Result<Vec<VisualCue>> {
    let document: CueDocument = serde_json::from_str(strip_code_fence(text))?;
    let cues = match document {
        CueDocument::Wrapped { visuals } => visuals,
        CueDocument::List(cues) => cues,
    };

    let total = cues.len();
    let cues: Vec<VisualCue> = cues
        .into_iter()
        .filter(|c| !c.keyword.trim().is_empty())
        .map(|mut c| {
            if c.search_query.trim().is_empty() {
                c.search_query = c.keyword.clone();
            }
            c
        })
        .collect();

    if cues.len() < total {
        debug!("Dropped {} cues without a keyword", total - cues.len());
    }
    Ok(cues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visuals::MediaKind;
    use std::io::Write;

    #[test]
    fn test_parse_wrapped_cues() {
        let cues = parse_cues(
            r#"{"visuals":[{"keyword":"cat","search_query":"cute cat","type":"image"},
                           {"keyword":"dance","search_query":"dance party","type":"gif"}]}"#,
        )
        .unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].media_type, MediaKind::Animated);
    }

    #[test]
    fn test_parse_list_in_code_fence() {
        let cues = parse_cues(
            "```json\n[{\"keyword\":\"ocean\",\"search_query\":\"\"}]\n```",
        )
        .unwrap();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].search_query, "ocean");
        assert_eq!(cues[0].media_type, MediaKind::Image);
    }

    #[test]
    fn test_parse_drops_blank_keywords() {
        let cues = parse_cues(r#"[{"keyword":" ","search_query":"x"},{"keyword":"y","search_query":"y"}]"#)
            .unwrap();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].keyword, "y");
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(parse_cues("not json"), Err(ReelError::Json(_))));
    }

    #[tokio::test]
    async fn test_static_cues_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"keyword":"rocket","search_query":"rocket launch","type":"gif"}}]"#
        )
        .unwrap();

        let writer = StaticCues::from_file(file.path()).unwrap();
        let cues = writer.draft_cues("ignored").await.unwrap();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].search_query, "rocket launch");
    }

    #[test]
    fn test_static_cues_missing_file() {
        let result = StaticCues::from_file(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(ReelError::InvalidInput(_))));
    }
}
