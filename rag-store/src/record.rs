//! Core data models used by the library.

use serde::{Deserialize, Serialize};

/// A chunk returned by vector search; `score` is the cosine similarity until
/// the reranker replaces it with its own relevance score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    /// Source document filename.
    pub filename: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub subsection: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    /// Position of the chunk within its document; `None` for chunks stored
    /// without one, which are never expanded.
    #[serde(default)]
    pub index: Option<i64>,
    pub score: f32,
}

impl RetrievedChunk {
    /// `title,section,subsection` with empty parts skipped.
    pub fn meta_line(&self) -> String {
        [&self.title, &self.section, &self.subsection]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A chunk produced by the markdown splitter, ready to be embedded and stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub text: String,
    pub filename: String,
    pub title: String,
    pub section: String,
    pub subsection: String,
    /// Document-wide position, contiguous from 0.
    pub index: i64,
}

impl ChunkRecord {
    /// Flat payload stored next to the vector. Field names match
    /// [`RetrievedChunk`] so search hits map back without translation.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "text": self.text,
            "filename": self.filename,
            "title": self.title,
            "section": self.section,
            "subsection": self.subsection,
            "index": self.index,
        })
    }
}

/// Restricts a search to chunks of the listed source files.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkFilter {
    pub filenames: Vec<String>,
}

impl ChunkFilter {
    /// `None` for an empty file list (no restriction).
    pub fn by_filenames<I, S>(names: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filenames: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .filter(|s: &String| !s.trim().is_empty())
            .collect();
        (!filenames.is_empty()).then_some(Self { filenames })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_line_skips_missing_parts() {
        let c = RetrievedChunk {
            text: "t".into(),
            filename: "f.pdf".into(),
            title: Some("Geodesy".into()),
            section: Some(String::new()),
            subsection: Some("Datums".into()),
            page: None,
            index: None,
            score: 0.0,
        };
        assert_eq!(c.meta_line(), "Geodesy,Datums");
    }

    #[test]
    fn empty_filter_is_none() {
        assert!(ChunkFilter::by_filenames(Vec::<String>::new()).is_none());
        assert!(ChunkFilter::by_filenames(["  "]).is_none());
        assert_eq!(
            ChunkFilter::by_filenames(["a.pdf"]).unwrap().filenames,
            vec!["a.pdf".to_string()]
        );
    }
}
