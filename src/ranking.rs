use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::issues::{self, IssueBreakdown};
use crate::models::{Manager, MessageRecord, PointRecord, RankingEntry};
use crate::scoring::{self, Tally};

pub const UNKNOWN_MANAGER_NAME: &str = "(unknown manager)";

/// Everything the rankings and the per-manager panels need for one manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerAggregate {
    pub manager_id: Uuid,
    pub name: String,
    pub messages: i64,
    pub positives: i64,
    pub negatives: i64,
    pub score: i64,
    pub final_score: i64,
    pub positive_rate: f64,
    pub issues: IssueBreakdown,
}

impl ManagerAggregate {
    pub fn entry(&self) -> RankingEntry {
        RankingEntry {
            manager_id: self.manager_id,
            name: self.name.clone(),
            messages: self.messages,
            positives: self.positives,
            negatives: self.negatives,
            final_score: self.final_score,
        }
    }
}

/// Builds one aggregate per manager with at least one point or message
/// record. Output follows roster order; ids missing from the roster are
/// appended in the order they were first seen.
pub fn build_aggregates(
    managers: &[Manager],
    records: &[PointRecord],
    messages: &[MessageRecord],
) -> Vec<ManagerAggregate> {
    let tallies = scoring::tally_points(records);
    let totals = scoring::message_totals(messages);

    let mut by_manager: IndexMap<Uuid, Vec<&PointRecord>> = IndexMap::new();
    for record in records {
        by_manager.entry(record.manager_id).or_default().push(record);
    }

    let mut order: IndexMap<Uuid, String> = managers
        .iter()
        .map(|manager| (manager.id, manager.name.clone()))
        .collect();
    for id in tallies.keys().chain(totals.keys()) {
        if !order.contains_key(id) {
            warn!(manager = %id, "records reference a manager missing from the roster");
            order.insert(*id, UNKNOWN_MANAGER_NAME.to_string());
        }
    }

    order
        .into_iter()
        .filter(|(id, _)| tallies.contains_key(id) || totals.contains_key(id))
        .map(|(manager_id, name)| {
            let tally = tallies.get(&manager_id).copied().unwrap_or_default();
            let messages = totals.get(&manager_id).copied().unwrap_or(0);
            let issues = issues::analyze_points(
                by_manager
                    .get(&manager_id)
                    .into_iter()
                    .flatten()
                    .copied(),
            );
            aggregate(manager_id, name, messages, tally, issues)
        })
        .collect()
}

fn aggregate(
    manager_id: Uuid,
    name: String,
    messages: i64,
    tally: Tally,
    issues: IssueBreakdown,
) -> ManagerAggregate {
    ManagerAggregate {
        manager_id,
        name,
        messages,
        positives: tally.positives,
        negatives: tally.negatives,
        score: tally.score(),
        final_score: scoring::final_score(messages, tally.negatives),
        positive_rate: tally.positive_rate(),
        issues,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Rankings {
    /// Ranking bruto: message volume.
    pub raw: Vec<RankingEntry>,
    /// Ranking de negativos: managers with at least one negative.
    pub negative: Vec<RankingEntry>,
    /// Ranking final: messages minus negatives.
    #[serde(rename = "final")]
    pub final_score: Vec<RankingEntry>,
}

/// Three independent descending sorts. `sort_by` is stable, so ties keep the
/// aggregate order.
pub fn build_rankings(aggregates: &[ManagerAggregate]) -> Rankings {
    let entries: Vec<RankingEntry> = aggregates.iter().map(ManagerAggregate::entry).collect();

    let mut raw = entries.clone();
    raw.sort_by(|a, b| b.messages.cmp(&a.messages));

    let mut negative: Vec<RankingEntry> = entries
        .iter()
        .filter(|entry| entry.negatives > 0)
        .cloned()
        .collect();
    negative.sort_by(|a, b| b.negatives.cmp(&a.negatives));

    let mut final_score = entries;
    final_score.sort_by(|a, b| b.final_score.cmp(&a.final_score));

    Rankings {
        raw,
        negative,
        final_score,
    }
}
