//! Background runner: one task per session, executing the planned steps in
//! order and parking between steps while the session is paused.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use contextor::{ContextorError, RagPipeline, SourceKind, SourceRef, prompt::excerpt};
use rag_store::RetrievedChunk;
use tracing::{debug, error, info, warn};

use crate::{
    engine::DiscoverySettings,
    error::DiscoveryError,
    model::{
        DiscoverySession, DiscoverySource, DiscoverySourceKind, DiscoveryStatus, StepStatus,
    },
    prompts,
    store::SessionStore,
};

const KB_QUERY_K: usize = 10;
const KB_TERM_K: usize = 5;
const KB_TERMS: usize = 3;
const KB_KEEP: usize = 8;
const WEB_QUERY_RESULTS: usize = 3;
const WEB_TERM_RESULTS: usize = 2;
const WEB_TERMS: usize = 2;
const CROSS_REF_SOURCES: usize = 10;

/// What a finished step contributes to the session.
struct StepOutcome {
    status: StepStatus,
    result: String,
    sources: Vec<DiscoverySource>,
    search_terms: Option<Vec<String>>,
    final_report: Option<String>,
}

impl StepOutcome {
    fn completed(result: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Completed,
            result: result.into(),
            sources: Vec::new(),
            search_terms: None,
            final_report: None,
        }
    }

    fn skipped(result: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skipped,
            ..Self::completed(result)
        }
    }

    fn apply(self, s: &mut DiscoverySession, idx: usize) -> Result<(), DiscoveryError> {
        let step = s.step_mut(idx)?;
        step.status = self.status;
        step.progress = 100.0;
        step.result = Some(self.result);

        let offered = self.sources.len();
        let accepted = self
            .sources
            .into_iter()
            .map(|src| s.push_source(src))
            .filter(|ok| *ok)
            .count();
        if accepted < offered {
            debug!(
                discovery_id = %s.id,
                dropped = offered - accepted,
                max_sources = s.max_sources,
                "source cap reached"
            );
        }
        if let Some(terms) = self.search_terms {
            s.search_terms = terms;
        }
        if self.final_report.is_some() {
            s.final_report = self.final_report;
        }
        s.recompute_progress();
        Ok(())
    }
}

fn source(
    kind: DiscoverySourceKind,
    title: impl Into<String>,
    relevance: f32,
    excerpt: impl Into<String>,
    content: impl Into<String>,
) -> DiscoverySource {
    DiscoverySource {
        id: String::new(),
        title: title.into(),
        kind,
        relevance,
        excerpt: excerpt.into(),
        content: content.into(),
        url: None,
        page_number: None,
        section: None,
        timestamp: Utc::now(),
    }
}

fn from_chunk(chunk: &RetrievedChunk) -> DiscoverySource {
    let title = if chunk.filename.is_empty() {
        "Knowledge Base Document".to_string()
    } else {
        chunk.filename.clone()
    };
    DiscoverySource {
        page_number: chunk.page,
        section: chunk.section.clone(),
        ..source(
            DiscoverySourceKind::KnowledgeBase,
            title,
            chunk.score,
            excerpt(&chunk.text),
            chunk.text.clone(),
        )
    }
}

fn from_web(src: SourceRef) -> DiscoverySource {
    let kind = match src.kind {
        SourceKind::Wikipedia => DiscoverySourceKind::Wikipedia,
        SourceKind::WebSearch => DiscoverySourceKind::WebSearch,
        SourceKind::KnowledgeBase => DiscoverySourceKind::KnowledgeBase,
    };
    let title = src
        .title
        .clone()
        .or_else(|| src.filename.clone())
        .unwrap_or_else(|| "Web result".to_string());
    let content = src.content.clone().unwrap_or_else(|| src.excerpt.clone());
    DiscoverySource {
        url: src.url,
        ..source(kind, title, src.relevance_score, src.excerpt, content)
    }
}

/// Best-scoring chunk per `(filename, page)`, highest first, at most `keep`.
fn dedup_by_document(chunks: Vec<RetrievedChunk>, keep: usize) -> Vec<RetrievedChunk> {
    let mut best: HashMap<(String, Option<i64>), RetrievedChunk> = HashMap::new();
    for chunk in chunks {
        let key = (chunk.filename.clone(), chunk.page);
        match best.get(&key) {
            Some(existing) if existing.score >= chunk.score => {}
            _ => {
                best.insert(key, chunk);
            }
        }
    }
    let mut ranked: Vec<RetrievedChunk> = best.into_values().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(keep);
    ranked
}

pub(crate) struct Runner {
    pub(crate) id: String,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) pipeline: Arc<RagPipeline>,
    pub(crate) settings: DiscoverySettings,
}

impl Runner {
    pub(crate) async fn run(self) {
        match self.drive().await {
            Ok(()) => {}
            Err(DiscoveryError::NotFound(_)) => {
                warn!(discovery_id = %self.id, "session disappeared; runner stopped");
            }
            Err(e) => {
                error!(discovery_id = %self.id, error = %e, "discovery runner failed");
                let message = e.to_string();
                let marked = self
                    .store
                    .update(
                        &self.id,
                        Box::new(move |s| {
                            if s.status.is_terminal() {
                                Ok(())
                            } else {
                                s.fail(message)
                            }
                        }),
                    )
                    .await;
                if let Err(e) = marked {
                    error!(discovery_id = %self.id, error = %e, "failed to record runner error");
                }
            }
        }
    }

    async fn drive(&self) -> Result<(), DiscoveryError> {
        let snapshot = self
            .store
            .update(&self.id, Box::new(|s| s.transition(DiscoveryStatus::Running)))
            .await?;
        let planned = snapshot.planned_steps();
        info!(discovery_id = %self.id, planned, "discovery started");

        for idx in 0..planned {
            self.wait_while_paused().await?;

            let snapshot = self
                .store
                .update(
                    &self.id,
                    Box::new(move |s| {
                        s.current_step = idx + 1;
                        s.step_mut(idx)?.status = StepStatus::Running;
                        s.touch();
                        Ok(())
                    }),
                )
                .await?;
            let name = snapshot.steps[idx].name.clone();
            info!(discovery_id = %self.id, step = idx + 1, %name, "step started");

            match self.execute(idx, &snapshot).await {
                Ok(outcome) => {
                    let status = outcome.status;
                    self.store
                        .update(&self.id, Box::new(move |s| outcome.apply(s, idx)))
                        .await?;
                    info!(discovery_id = %self.id, step = idx + 1, ?status, "step finished");
                }
                Err(e) => {
                    let reason = e.to_string();
                    error!(discovery_id = %self.id, step = idx + 1, %name, error = %reason, "step failed");
                    self.store
                        .update(
                            &self.id,
                            Box::new(move |s| {
                                let step = s.step_mut(idx)?;
                                step.status = StepStatus::Error;
                                step.error = Some(reason.clone());
                                s.fail(reason)
                            }),
                        )
                        .await?;
                    return Ok(());
                }
            }

            if idx + 1 < planned && !self.settings.step_delay.is_zero() {
                tokio::time::sleep(self.settings.step_delay).await;
            }
        }

        loop {
            self.wait_while_paused().await?;
            // Status check and completion share one update; a pause landing
            // after the wait leaves the session paused.
            let snapshot = self
                .store
                .update(
                    &self.id,
                    Box::new(|s| match s.status {
                        DiscoveryStatus::Paused => Ok(()),
                        _ => s.transition(DiscoveryStatus::Completed),
                    }),
                )
                .await?;
            if snapshot.status == DiscoveryStatus::Completed {
                break;
            }
            debug!(discovery_id = %self.id, "paused before completion; waiting");
        }
        info!(discovery_id = %self.id, "discovery completed");
        Ok(())
    }

    /// Parks while the session is paused, polling the store.
    async fn wait_while_paused(&self) -> Result<(), DiscoveryError> {
        let mut parked = false;
        loop {
            let status = self
                .store
                .get(&self.id)
                .await?
                .ok_or_else(|| DiscoveryError::NotFound(self.id.clone()))?
                .status;
            if status != DiscoveryStatus::Paused {
                if parked {
                    info!(discovery_id = %self.id, "discovery resumed");
                }
                return Ok(());
            }
            if !parked {
                info!(discovery_id = %self.id, "discovery paused; runner parked");
                parked = true;
            }
            tokio::time::sleep(self.settings.pause_poll).await;
        }
    }

    async fn step_progress(&self, idx: usize, progress: f32) -> Result<(), DiscoveryError> {
        self.store
            .update(
                &self.id,
                Box::new(move |s| {
                    s.step_mut(idx)?.progress = progress.clamp(0.0, 100.0);
                    s.touch();
                    Ok(())
                }),
            )
            .await
            .map(|_| ())
    }

    async fn execute(
        &self,
        idx: usize,
        snapshot: &DiscoverySession,
    ) -> Result<StepOutcome, DiscoveryError> {
        match idx {
            0 => self.query_analysis(snapshot).await,
            1 => self.knowledge_search(idx, snapshot).await,
            2 => self.web_intelligence(idx, snapshot).await,
            3 => self.cross_reference(snapshot).await,
            4 => self.report(idx, snapshot).await,
            other => Err(DiscoveryError::Store(format!("no step at index {other}"))),
        }
    }

    async fn llm(&self, step: &str, snapshot: &DiscoverySession, prompt: &str) -> Result<String, DiscoveryError> {
        self.pipeline
            .generate(snapshot.provider, prompt)
            .await
            .map(|g| g.text)
            .map_err(|e| step_failed(step, e))
    }

    async fn query_analysis(&self, s: &DiscoverySession) -> Result<StepOutcome, DiscoveryError> {
        let step = "query analysis";
        let analysis = self.llm(step, s, &prompts::query_analysis(&s.query)).await?;
        self.step_progress(0, 50.0).await?;

        let reply = self
            .llm(step, s, &prompts::search_terms(&analysis, &s.query))
            .await?;
        let mut terms = prompts::parse_search_terms(&reply);
        if terms.is_empty() {
            terms.push(s.query.clone());
        }
        debug!(discovery_id = %s.id, ?terms, "search terms extracted");

        Ok(StepOutcome {
            sources: vec![source(
                DiscoverySourceKind::Analysis,
                "Query Analysis Results",
                1.0,
                excerpt(&analysis),
                analysis.clone(),
            )],
            search_terms: Some(terms),
            ..StepOutcome::completed(analysis)
        })
    }

    async fn knowledge_search(
        &self,
        idx: usize,
        s: &DiscoverySession,
    ) -> Result<StepOutcome, DiscoveryError> {
        if !s.include_knowledge_base {
            return Ok(StepOutcome::skipped("Knowledge base search skipped"));
        }

        let mut queries: Vec<(&str, usize)> = vec![(s.query.as_str(), KB_QUERY_K)];
        queries.extend(s.search_terms.iter().take(KB_TERMS).map(|t| (t.as_str(), KB_TERM_K)));
        let total = queries.len();

        let mut all = Vec::new();
        for (i, (q, k)) in queries.into_iter().enumerate() {
            match self.pipeline.retrieve(q, None, k).await {
                Ok(found) => all.extend(found),
                // The main query must succeed; term queries are best-effort.
                Err(e) if i == 0 => return Err(step_failed("knowledge base search", e)),
                Err(e) => warn!(discovery_id = %s.id, term = %q, error = %e, "term search failed"),
            }
            self.step_progress(idx, (i + 1) as f32 / total as f32 * 100.0)
                .await?;
        }

        let ranked = dedup_by_document(all, KB_KEEP);
        Ok(StepOutcome {
            sources: ranked.iter().map(from_chunk).collect(),
            ..StepOutcome::completed(format!(
                "Found {} relevant documents in knowledge base",
                ranked.len()
            ))
        })
    }

    async fn web_intelligence(
        &self,
        idx: usize,
        s: &DiscoverySession,
    ) -> Result<StepOutcome, DiscoveryError> {
        if !s.include_web_search {
            return Ok(StepOutcome::skipped("Web search skipped"));
        }

        let mut queries: Vec<(&str, usize)> = vec![(s.query.as_str(), WEB_QUERY_RESULTS)];
        queries.extend(s.search_terms.iter().take(WEB_TERMS).map(|t| (t.as_str(), WEB_TERM_RESULTS)));
        let total = queries.len();

        let mut gathered = Vec::new();
        for (i, (q, n)) in queries.into_iter().enumerate() {
            gathered.extend(self.pipeline.web_search(q, n).await);
            self.step_progress(idx, (i + 1) as f32 / total as f32 * 100.0)
                .await?;
        }

        Ok(StepOutcome {
            result: format!("Gathered {} web sources", gathered.len()),
            sources: gathered.into_iter().map(from_web).collect(),
            ..StepOutcome::completed("")
        })
    }

    async fn cross_reference(&self, s: &DiscoverySession) -> Result<StepOutcome, DiscoveryError> {
        if s.sources.len() < 2 {
            return Ok(StepOutcome::completed(
                "Insufficient sources for cross-reference analysis",
            ));
        }

        let summaries: Vec<String> = s
            .sources
            .iter()
            .take(CROSS_REF_SOURCES)
            .enumerate()
            .map(|(i, src)| format!("Source {} ({}): {}", i + 1, src.kind.as_str(), src.excerpt))
            .collect();
        let analysis = self
            .llm("cross-reference analysis", s, &prompts::cross_reference(&s.query, &summaries))
            .await?;

        Ok(StepOutcome {
            sources: vec![source(
                DiscoverySourceKind::Analysis,
                "Cross-Reference Analysis",
                0.95,
                "Comprehensive analysis of source correlations and patterns",
                analysis.clone(),
            )],
            ..StepOutcome::completed(analysis)
        })
    }

    async fn report(&self, idx: usize, s: &DiscoverySession) -> Result<StepOutcome, DiscoveryError> {
        let findings: Vec<String> = s
            .steps
            .iter()
            .take(idx)
            .filter_map(|st| st.result.as_ref().map(|r| format!("{}: {}", st.name, r)))
            .collect();
        let report = self
            .llm(
                "report generation",
                s,
                &prompts::report(&s.query, &findings, s.sources.len()),
            )
            .await?;

        Ok(StepOutcome {
            sources: vec![source(
                DiscoverySourceKind::Report,
                "Final Discovery Report",
                1.0,
                "Comprehensive geospatial research report with findings and recommendations",
                report.clone(),
            )],
            final_report: Some(report),
            ..StepOutcome::completed("Comprehensive discovery report generated")
        })
    }
}

fn step_failed(step: &str, e: ContextorError) -> DiscoveryError {
    DiscoveryError::StepFailed {
        step: step.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(filename: &str, page: Option<i64>, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            text: format!("{filename} p{page:?}"),
            filename: filename.into(),
            title: None,
            section: None,
            subsection: None,
            page,
            index: None,
            score,
        }
    }

    #[test]
    fn dedup_keeps_best_score_per_document_page() {
        let ranked = dedup_by_document(
            vec![
                chunk("a.pdf", Some(1), 0.3),
                chunk("a.pdf", Some(1), 0.7),
                chunk("a.pdf", Some(2), 0.5),
                chunk("b.pdf", None, 0.9),
            ],
            8,
        );
        let got: Vec<_> = ranked.iter().map(|c| (c.filename.as_str(), c.page, c.score)).collect();
        assert_eq!(
            got,
            vec![("b.pdf", None, 0.9), ("a.pdf", Some(1), 0.7), ("a.pdf", Some(2), 0.5)]
        );
    }

    #[test]
    fn dedup_truncates_to_keep() {
        let chunks = (0..12).map(|i| chunk(&format!("f{i}"), None, i as f32 / 12.0)).collect();
        let ranked = dedup_by_document(chunks, KB_KEEP);
        assert_eq!(ranked.len(), 8);
        assert_eq!(ranked[0].filename, "f11");
    }
}
