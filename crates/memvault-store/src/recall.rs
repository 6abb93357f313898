//! Relevance scoring for event recall.
//!
//! Pure functions shared by every `EventStore` backend, so filter and
//! scoring semantics are identical regardless of where events live.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::schema::{EventDigest, ScoredEvent};

/// Filter and scoring parameters for an event recall query.
#[derive(Debug, Clone)]
pub struct EventQuery {
    /// Free-text query; empty means "recency only".
    pub query: String,
    pub service_id: Option<String>,
    pub source_type: Option<String>,
    /// Event passes when any of these ids appears in its `project_ids`.
    pub project_ids: Option<Vec<String>>,
    /// Inclusive lower bound on timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on timestamp.
    pub until: Option<DateTime<Utc>>,
    pub top_k: usize,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            service_id: None,
            source_type: None,
            project_ids: None,
            since: None,
            until: None,
            top_k: 10,
        }
    }
}

impl EventQuery {
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    pub fn with_project_ids(mut self, project_ids: Vec<String>) -> Self {
        self.project_ids = Some(project_ids);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

fn passes_filters(event: &EventDigest, query: &EventQuery) -> bool {
    if let Some(ref service_id) = query.service_id {
        if &event.service_id != service_id {
            return false;
        }
    }
    if let Some(ref source_type) = query.source_type {
        if &event.source_type != source_type {
            return false;
        }
    }
    if let Some(ref project_ids) = query.project_ids {
        if !project_ids.iter().any(|p| event.project_ids.contains(p)) {
            return false;
        }
    }
    if let Some(since) = query.since {
        if event.timestamp < since {
            return false;
        }
    }
    if let Some(until) = query.until {
        if event.timestamp > until {
            return false;
        }
    }
    true
}

/// Score one event against the deduplicated lowercase query tokens:
/// +2.0 per token found in the digest text, +1.0 per token found in any
/// keyword. An empty query scores a flat 0.1 so ordering stays stable and
/// recency-driven.
fn score_event(event: &EventDigest, tokens: &BTreeSet<String>) -> f64 {
    if tokens.is_empty() {
        return 0.1;
    }
    let digest = event.digest.to_lowercase();
    let keywords: Vec<String> = event.keywords.iter().map(|k| k.to_lowercase()).collect();
    let mut score = 0.0;
    for token in tokens {
        if digest.contains(token.as_str()) {
            score += 2.0;
        }
        if keywords.iter().any(|k| k.contains(token.as_str())) {
            score += 1.0;
        }
    }
    score
}

/// Filter, score, and rank events: score descending, then timestamp
/// descending, then event id for a fully deterministic order. Returns at
/// most `top_k` results. The token is checked between events so a large
/// scope scan stays cancellable.
pub fn rank(
    events: Vec<EventDigest>,
    query: &EventQuery,
    cancel: &CancellationToken,
) -> Result<Vec<ScoredEvent>, StorageError> {
    let tokens: BTreeSet<String> = query
        .query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let mut scored = Vec::new();
    for event in events {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if !passes_filters(&event, query) {
            continue;
        }
        let score = score_event(&event, &tokens);
        scored.push(ScoredEvent { event, score });
    }

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.event.timestamp.cmp(&a.event.timestamp))
            .then_with(|| a.event.event_id.cmp(&b.event.event_id))
    });
    scored.truncate(query.top_k);
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn event(id: &str, digest: &str, keywords: &[&str], age_hours: i64) -> EventDigest {
        EventDigest {
            event_id: id.into(),
            tenant_id: "t1".into(),
            user_id: "u1".into(),
            service_id: "svc".into(),
            timestamp: Utc::now() - Duration::hours(age_hours),
            source_type: "chat".into(),
            digest: digest.into(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            project_ids: vec!["p1".into()],
            evidence: json!(null),
        }
    }

    #[test]
    fn digest_match_scores_two_per_token() {
        let hits = rank(
            vec![event("a", "deploy failed on canary", &[], 1)],
            &EventQuery::text("deploy canary"),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 4.0);
    }

    #[test]
    fn keyword_match_scores_one_per_token() {
        let hits = rank(
            vec![event("a", "unrelated", &["deploy"], 1)],
            &EventQuery::text("deploy"),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(hits[0].score, 1.0);
    }

    #[test]
    fn duplicate_tokens_counted_once() {
        let hits = rank(
            vec![event("a", "deploy deploy deploy", &[], 1)],
            &EventQuery::text("deploy Deploy DEPLOY"),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(hits[0].score, 2.0);
    }

    #[test]
    fn empty_query_gives_flat_score_and_recency_order() {
        let hits = rank(
            vec![event("old", "x", &[], 10), event("new", "y", &[], 1)],
            &EventQuery::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].score, 0.1);
        assert_eq!(hits[0].event.event_id, "new");
    }

    #[test]
    fn filters_apply_before_scoring() {
        let mut other = event("b", "deploy", &[], 1);
        other.service_id = "other-svc".into();
        let hits = rank(
            vec![event("a", "deploy", &[], 1), other],
            &EventQuery::text("deploy").with_service_id("svc"),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].event.event_id, "a");
    }

    #[test]
    fn project_filter_matches_on_intersection() {
        let hits = rank(
            vec![event("a", "deploy", &[], 1)],
            &EventQuery::text("deploy").with_project_ids(vec!["p1".into(), "p9".into()]),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(hits.len(), 1);

        let hits = rank(
            vec![event("a", "deploy", &[], 1)],
            &EventQuery::text("deploy").with_project_ids(vec!["p9".into()]),
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn timestamp_range_is_inclusive() {
        let e = event("a", "x", &[], 0);
        let ts = e.timestamp;
        let hits = rank(
            vec![e.clone()],
            &EventQuery::default().since(ts).until(ts),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn cancelled_scan_aborts_between_events() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = rank(
            vec![event("a", "deploy", &[], 1)],
            &EventQuery::text("deploy"),
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Cancelled));
    }

    #[test]
    fn top_k_truncates_after_sorting() {
        let events = vec![
            event("low", "nothing", &[], 1),
            event("high", "deploy canary", &[], 2),
            event("mid", "deploy", &[], 3),
        ];
        let hits = rank(
            events,
            &EventQuery::text("deploy canary").with_top_k(2),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].event.event_id, "high");
        assert_eq!(hits[1].event.event_id, "mid");
    }
}
