use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

use crate::issues::{self, IssueBreakdown};
use crate::models::{CallInspection, MessageRecord, PointKind, PointRecord};
use crate::period::PeriodRef;

/// Positive/negative quantities for one manager in one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub positives: i64,
    pub negatives: i64,
}

impl Tally {
    pub fn add(&mut self, kind: PointKind, quantity: i64) {
        match kind {
            PointKind::Positive => self.positives = self.positives.saturating_add(quantity),
            PointKind::Negative => self.negatives = self.negatives.saturating_add(quantity),
        }
    }

    pub fn merge(&mut self, other: Tally) {
        self.positives = self.positives.saturating_add(other.positives);
        self.negatives = self.negatives.saturating_add(other.negatives);
    }

    pub fn score(&self) -> i64 {
        self.positives.saturating_sub(self.negatives)
    }

    pub fn positive_rate(&self) -> f64 {
        positive_rate(self.positives, self.negatives)
    }
}

/// Share of positives as a percentage; 0 when nothing was observed.
pub fn positive_rate(positives: i64, negatives: i64) -> f64 {
    let total = positives as f64 + negatives as f64;
    if total <= 0.0 {
        return 0.0;
    }
    positives as f64 / total * 100.0
}

/// Composite used by the final ranking. Positives do not count.
pub fn final_score(messages: i64, negatives: i64) -> i64 {
    messages.saturating_sub(negatives)
}

/// Per-manager chat tallies in first-seen manager order.
pub fn tally_points(records: &[PointRecord]) -> IndexMap<Uuid, Tally> {
    let mut tallies: IndexMap<Uuid, Tally> = IndexMap::new();
    for record in records {
        tallies
            .entry(record.manager_id)
            .or_default()
            .add(record.kind, record.quantity);
    }
    tallies
}

/// Score of a single call inspection; cancelled calls always score 0.
pub fn call_score(inspection: &CallInspection) -> i64 {
    if inspection.is_cancelled {
        return 0;
    }
    call_tally(inspection).score()
}

fn call_tally(inspection: &CallInspection) -> Tally {
    let mut tally = Tally::default();
    if inspection.is_cancelled {
        return tally;
    }
    for item in &inspection.items {
        tally.add(item.status, item.quantity);
    }
    tally
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSummary {
    pub manager_id: Uuid,
    pub inspections: usize,
    pub cancelled: usize,
    pub positives: i64,
    pub negatives: i64,
    pub score: i64,
    pub positive_rate: f64,
    /// Issue frequency over this manager's negative call items.
    pub issues: IssueBreakdown,
}

/// Aggregates call inspections per manager. Cancelled inspections are only
/// counted as cancelled; their items never reach the totals or the issues.
pub fn summarize_calls(inspections: &[CallInspection]) -> Vec<CallSummary> {
    let mut by_manager: IndexMap<Uuid, Vec<&CallInspection>> = IndexMap::new();
    for inspection in inspections {
        by_manager
            .entry(inspection.manager_id)
            .or_default()
            .push(inspection);
    }

    by_manager
        .into_iter()
        .map(|(manager_id, owned)| {
            let cancelled = owned.iter().filter(|inspection| inspection.is_cancelled).count();
            let mut tally = Tally::default();
            for inspection in &owned {
                tally.merge(call_tally(inspection));
            }
            CallSummary {
                manager_id,
                inspections: owned.len() - cancelled,
                cancelled,
                positives: tally.positives,
                negatives: tally.negatives,
                score: tally.score(),
                positive_rate: tally.positive_rate(),
                issues: issues::analyze_calls(owned.iter().copied()),
            }
        })
        .collect()
}

/// Message volume per manager. Every row counts, duplicates included.
pub fn message_totals(records: &[MessageRecord]) -> IndexMap<Uuid, i64> {
    let mut totals: IndexMap<Uuid, i64> = IndexMap::new();
    for record in records {
        let total = totals.entry(record.manager_id).or_insert(0);
        *total = total.saturating_add(record.quantity);
    }
    totals
}

pub fn messages_for(records: &[MessageRecord], manager_id: Uuid, reference: PeriodRef) -> i64 {
    records
        .iter()
        .filter(|record| record.manager_id == manager_id && record.period_ref() == reference)
        .map(|record| record.quantity)
        .fold(0, i64::saturating_add)
}

/// All rows behind one weekly message count; removing the count removes
/// every one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDeletion {
    pub manager_id: Uuid,
    pub reference: PeriodRef,
    pub ids: Vec<Uuid>,
}

pub fn plan_message_deletion(
    records: &[MessageRecord],
    manager_id: Uuid,
    reference: PeriodRef,
) -> MessageDeletion {
    MessageDeletion {
        manager_id,
        reference,
        ids: records
            .iter()
            .filter(|record| record.manager_id == manager_id && record.period_ref() == reference)
            .map(|record| record.id)
            .collect(),
    }
}
