//! Performance report fed to the retry-generation prompt.

use serde::Serialize;

use super::models::SearchSummary;

#[derive(Debug, Serialize)]
struct SearchPerformance<'a> {
    id: &'a str,
    query: &'a str,
    strategy: &'a str,
    items_found: usize,
    note: &'a str,
}

#[derive(Debug, Serialize)]
struct PerformanceReport<'a> {
    total_items: usize,
    searches: Vec<SearchPerformance<'a>>,
    user_feedback: &'a str,
}

/// Builds the pretty-printed JSON report of the last round.
pub fn build_performance_report(
    total_items: usize,
    summaries: &[SearchSummary],
    user_feedback: Option<&str>,
) -> String {
    let report = PerformanceReport {
        total_items,
        searches: summaries
            .iter()
            .map(|summary| SearchPerformance {
                id: &summary.task.id,
                query: &summary.task.query,
                strategy: &summary.task.strategy,
                items_found: summary.items_found,
                note: summary.note.as_deref().unwrap_or(""),
            })
            .collect(),
        user_feedback: user_feedback.unwrap_or(""),
    };
    serde_json::to_string_pretty(&report).unwrap_or_default()
}

/// Ids of tasks that produced nothing.
pub fn zero_result_ids(summaries: &[SearchSummary]) -> Vec<String> {
    summaries
        .iter()
        .filter(|summary| summary.items_found == 0)
        .map(|summary| summary.task.id.clone())
        .collect()
}
