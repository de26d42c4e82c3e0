//! Runtime configuration loaded from environment variables.

use std::{str::FromStr, time::Duration};

use crate::error::ContextorError;

/// Knobs of the retrieval pipeline. All fields have defaults via `from_env`.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Candidates fetched from the vector store before reranking.
    pub recall_num: u64,
    /// Chunks kept after reranking when the request does not override it.
    pub top_k: usize,
    /// Reranked chunks scoring below this are dropped. `None` keeps everything.
    pub score_threshold: Option<f32>,
    /// Prefix passages with `title,section,subsection` before reranking.
    pub rerank_with_meta: bool,
    /// Expected embedding dimension; checked on every query when set.
    pub embedding_dim: Option<usize>,
    /// Master switch for web search. Requests asking for it get none when off.
    pub web_search_enabled: bool,
    /// Web results requested per search.
    pub web_max_results: usize,
    /// Token budget for growing each retrieved chunk with its section
    /// neighbours. `0` turns expansion off.
    pub expand_len: usize,
    /// Per-chunk limit on the neighbour lookup.
    pub expand_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recall_num: 128,
            top_k: 5,
            score_threshold: None,
            rerank_with_meta: true,
            embedding_dim: None,
            web_search_enabled: true,
            web_max_results: 5,
            expand_len: 1024,
            expand_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Build from environment variables with sensible defaults.
    ///
    /// # Errors
    /// [`ContextorError::Config`] for unparsable or out-of-range values.
    pub fn from_env() -> Result<Self, ContextorError> {
        let d = Self::default();
        let cfg = Self {
            recall_num: parse("VEC_RECALL_NUM", d.recall_num)?,
            top_k: parse("TOP_K", d.top_k)?,
            score_threshold: opt("RERANK_SCORE_THRESHOLD")
                .map(|v| {
                    v.trim().parse::<f32>().map_err(|_| {
                        ContextorError::Config(format!(
                            "RERANK_SCORE_THRESHOLD has an invalid value: '{v}'"
                        ))
                    })
                })
                .transpose()?,
            rerank_with_meta: parse("RERANK_WITH_META", d.rerank_with_meta)?,
            embedding_dim: opt("EMBEDDING_DIM")
                .map(|v| {
                    v.trim().parse::<usize>().map_err(|_| {
                        ContextorError::Config(format!("EMBEDDING_DIM has an invalid value: '{v}'"))
                    })
                })
                .transpose()?,
            web_search_enabled: parse("WEB_SEARCH_ENABLED", d.web_search_enabled)?,
            web_max_results: parse("WEB_MAX_RESULTS", d.web_max_results)?,
            expand_len: parse("EXPAND_RANGE", d.expand_len)?,
            expand_timeout: Duration::from_secs(parse(
                "EXPAND_TIMEOUT_SECS",
                d.expand_timeout.as_secs(),
            )?),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ContextorError> {
        if self.recall_num == 0 {
            return Err(ContextorError::Config("VEC_RECALL_NUM must be > 0".into()));
        }
        if self.top_k == 0 {
            return Err(ContextorError::Config("TOP_K must be > 0".into()));
        }
        if self.top_k as u64 > self.recall_num {
            return Err(ContextorError::Config(
                "TOP_K must not exceed VEC_RECALL_NUM".into(),
            ));
        }
        Ok(())
    }
}

fn opt(k: &str) -> Option<String> {
    std::env::var(k).ok().filter(|v| !v.trim().is_empty())
}

fn parse<T: FromStr>(k: &str, dflt: T) -> Result<T, ContextorError> {
    match opt(k) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ContextorError::Config(format!("{k} has an invalid value: '{v}'"))),
        None => Ok(dflt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.recall_num, 128);
        assert_eq!(cfg.top_k, 5);
        assert!(cfg.score_threshold.is_none());
        assert_eq!(cfg.expand_len, 1024);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn top_k_above_recall_is_rejected() {
        let cfg = PipelineConfig {
            recall_num: 3,
            top_k: 4,
            ..PipelineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ContextorError::Config(_))));
    }
}
