//! Wires the engine together for one filter value.
//!
//! A `FilterState` is an immutable value. `Dashboard` only asks for a new
//! fetch when the filter actually changes, and only accepts the snapshot of
//! the latest fetch it handed out.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::grouping::{self, InspectionEvent};
use crate::models::{CallInspection, Manager, MessageRecord, PointRecord};
use crate::period::{self, Period, PeriodSelection};
use crate::ranking::{self, ManagerAggregate, Rankings};
use crate::scoring::{self, CallSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FilterState {
    pub selection: PeriodSelection,
    pub manager_id: Option<Uuid>,
}

impl FilterState {
    pub fn new(selection: PeriodSelection) -> Self {
        Self {
            selection,
            manager_id: None,
        }
    }

    pub fn for_manager(mut self, manager_id: Uuid) -> Self {
        self.manager_id = Some(manager_id);
        self
    }

    pub fn period(&self) -> Period {
        period::resolve(&self.selection)
    }

    fn wants(&self, manager_id: Uuid) -> bool {
        self.manager_id.map_or(true, |wanted| wanted == manager_id)
    }
}

/// Raw rows as fetched from the store for one filter.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub managers: Vec<Manager>,
    pub points: Vec<PointRecord>,
    pub calls: Vec<CallInspection>,
    pub messages: Vec<MessageRecord>,
}

impl Snapshot {
    /// Drops every row outside the filter. Dated rows are matched by date,
    /// message rows by their week reference.
    pub fn restrict(self, filter: &FilterState) -> Snapshot {
        let period = filter.period();
        Snapshot {
            managers: self.managers,
            points: self
                .points
                .into_iter()
                .filter(|r| filter.wants(r.manager_id) && period.contains(r.event_date))
                .collect(),
            calls: self
                .calls
                .into_iter()
                .filter(|c| filter.wants(c.manager_id) && period.contains(c.date))
                .collect(),
            messages: self
                .messages
                .into_iter()
                .filter(|m| filter.wants(m.manager_id) && period.covers_ref(&m.period_ref()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub filter: FilterState,
    pub period: Period,
    pub events: Vec<InspectionEvent>,
    pub aggregates: Vec<ManagerAggregate>,
    pub rankings: Rankings,
    pub calls: Vec<CallSummary>,
    /// Roster as fetched, for naming managers that only appear in calls.
    pub managers: Vec<Manager>,
}

impl DashboardView {
    pub fn build(filter: FilterState, snapshot: Snapshot) -> Self {
        let snapshot = snapshot.restrict(&filter);
        let period = filter.period();

        let events = grouping::group_records(&snapshot.points);
        let aggregates = ranking::build_aggregates(&snapshot.managers, &snapshot.points, &snapshot.messages);
        let rankings = ranking::build_rankings(&aggregates);
        let calls = scoring::summarize_calls(&snapshot.calls);

        debug!(
            events = events.len(),
            managers = aggregates.len(),
            calls = calls.len(),
            "dashboard view built"
        );

        Self {
            filter,
            period,
            events,
            aggregates,
            rankings,
            calls,
            managers: snapshot.managers,
        }
    }

    pub fn manager_name(&self, manager_id: Uuid) -> Option<&str> {
        self.managers
            .iter()
            .find(|manager| manager.id == manager_id)
            .map(|manager| manager.name.as_str())
    }
}

/// Handed out for each fetch; only the newest one is honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub filter: FilterState,
}

#[derive(Debug, Default)]
pub struct Dashboard {
    filter: Option<FilterState>,
    generation: u64,
    view: Option<Arc<DashboardView>>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> Option<Arc<DashboardView>> {
        self.view.clone()
    }

    /// Returns a ticket when `filter` differs from the current one. The
    /// previous view is dropped right away so stale results are never shown
    /// next to the new filter.
    pub fn set_filter(&mut self, filter: FilterState) -> Option<FetchTicket> {
        if self.filter.as_ref() == Some(&filter) {
            return None;
        }
        self.generation += 1;
        self.filter = Some(filter);
        self.view = None;
        debug!(generation = self.generation, "filter changed");
        Some(FetchTicket {
            generation: self.generation,
            filter,
        })
    }

    /// Installs the result of a fetch. Returns false for a superseded ticket.
    pub fn complete(&mut self, ticket: FetchTicket, snapshot: Snapshot) -> bool {
        if ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding superseded fetch"
            );
            return false;
        }
        let view = DashboardView::build(ticket.filter, snapshot);
        info!(
            period = ?view.period,
            events = view.events.len(),
            ranked = view.rankings.raw.len(),
            "dashboard refreshed"
        );
        self.view = Some(Arc::new(view));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CallInspectionItem, NewPoint, PointKind};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn manager(name: &str) -> Manager {
        Manager {
            id: Uuid::new_v4(),
            name: name.to_string(),
            active: true,
            sectors: BTreeSet::new(),
        }
    }

    fn point(manager_id: Uuid, day: NaiveDate, inspector: Uuid, kind: PointKind, qty: i64) -> PointRecord {
        PointRecord::tagged(
            Uuid::new_v4(),
            manager_id,
            day,
            inspector,
            NewPoint {
                kind,
                category: Some("late".to_string()),
                observation: None,
                quantity: qty,
            },
        )
    }

    fn message(manager_id: Uuid, week: i32, month: i32, quantity: i64) -> MessageRecord {
        MessageRecord {
            id: Uuid::new_v4(),
            manager_id,
            quantity,
            week_of_month: week,
            month,
            year: 2024,
        }
    }

    fn snapshot() -> (Snapshot, Manager, Manager) {
        let ana = manager("Ana");
        let bia = manager("Bia");
        let inspector = Uuid::new_v4();
        let call_id = Uuid::new_v4();
        let snapshot = Snapshot {
            managers: vec![ana.clone(), bia.clone()],
            points: vec![
                point(ana.id, date(5, 1), inspector, PointKind::Positive, 2),
                point(ana.id, date(5, 1), inspector, PointKind::Negative, 1),
                point(bia.id, date(5, 9), inspector, PointKind::Negative, 3),
                point(ana.id, date(6, 3), inspector, PointKind::Negative, 8),
            ],
            calls: vec![CallInspection {
                id: call_id,
                manager_id: bia.id,
                date: date(5, 2),
                inspector_id: inspector,
                is_cancelled: true,
                cancellation_reason: Some("no answer".to_string()),
                score: 0,
                period_week: 1,
                period_month: 5,
                period_year: 2024,
                items: vec![CallInspectionItem {
                    inspection_id: call_id,
                    criterion: Some("script".to_string()),
                    status: PointKind::Negative,
                    observation: None,
                    quantity: 4,
                }],
            }],
            messages: vec![
                message(ana.id, 1, 5, 10),
                message(ana.id, 1, 5, 15),
                message(bia.id, 2, 5, 40),
                message(bia.id, 1, 6, 99),
            ],
        };
        (snapshot, ana, bia)
    }

    #[test]
    fn month_view_aggregates_only_in_period_rows() {
        let (snapshot, ana, bia) = snapshot();
        let view = DashboardView::build(FilterState::new(PeriodSelection::month(2024, 5)), snapshot);

        assert_eq!(view.events.len(), 2);
        assert_eq!(view.events[0].key.manager_id, bia.id);
        let ana_agg = &view.aggregates[0];
        assert_eq!(ana_agg.manager_id, ana.id);
        assert_eq!(ana_agg.messages, 25);
        assert_eq!((ana_agg.positives, ana_agg.negatives), (2, 1));
        assert_eq!(view.aggregates[1].final_score, 37);
        assert_eq!(view.rankings.raw[0].manager_id, bia.id);
        assert_eq!(view.calls[0].cancelled, 1);
        assert_eq!(view.calls[0].score, 0);
        assert!(!view.calls[0].issues.has_issues());
    }

    #[test]
    fn week_view_filters_messages_by_reference() {
        let (snapshot, ana, _) = snapshot();
        let view = DashboardView::build(FilterState::new(PeriodSelection::week(2024, 5, 1)), snapshot);
        assert_eq!(view.aggregates.len(), 1);
        assert_eq!(view.aggregates[0].manager_id, ana.id);
        assert_eq!(view.aggregates[0].messages, 25);
    }

    #[test]
    fn manager_filter_narrows_everything() {
        let (snapshot, _, bia) = snapshot();
        let filter = FilterState::new(PeriodSelection::month(2024, 5)).for_manager(bia.id);
        let view = DashboardView::build(filter, snapshot);
        assert_eq!(view.events.len(), 1);
        assert_eq!(view.aggregates.len(), 1);
        assert_eq!(view.manager_name(bia.id), Some("Bia"));
    }

    #[test]
    fn managers_with_only_calls_are_named() {
        let (mut snapshot, _, _) = snapshot();
        let tatiane = manager("Tatiane");
        snapshot.managers.push(tatiane.clone());
        snapshot.calls[0].manager_id = tatiane.id;

        let view = DashboardView::build(FilterState::new(PeriodSelection::month(2024, 5)), snapshot);
        assert!(view.aggregates.iter().all(|aggregate| aggregate.manager_id != tatiane.id));
        assert_eq!(view.calls[0].manager_id, tatiane.id);
        assert_eq!(view.manager_name(tatiane.id), Some("Tatiane"));
        assert_eq!(view.manager_name(Uuid::new_v4()), None);
    }

    #[test]
    fn empty_period_yields_empty_view() {
        let (snapshot, _, _) = snapshot();
        let view = DashboardView::build(FilterState::new(PeriodSelection::week(2023, 2, 5)), snapshot);
        assert!(view.period.is_empty());
        assert!(view.events.is_empty());
        assert!(view.aggregates.is_empty());
        assert!(view.rankings.raw.is_empty());
    }

    #[test]
    fn rebuilding_from_same_snapshot_is_idempotent() {
        let (snapshot, _, _) = snapshot();
        let filter = FilterState::new(PeriodSelection::month(2024, 5));
        assert_eq!(
            DashboardView::build(filter, snapshot.clone()),
            DashboardView::build(filter, snapshot)
        );
    }

    #[test]
    fn unchanged_filter_does_not_refetch() {
        let mut dashboard = Dashboard::new();
        let filter = FilterState::new(PeriodSelection::month(2024, 5));
        assert!(dashboard.set_filter(filter).is_some());
        assert!(dashboard.set_filter(filter).is_none());
        assert!(dashboard
            .set_filter(filter.for_manager(Uuid::new_v4()))
            .is_some());
    }

    #[test]
    fn superseded_fetch_is_discarded() {
        let (snapshot, _, _) = snapshot();
        let mut dashboard = Dashboard::new();
        let may = dashboard
            .set_filter(FilterState::new(PeriodSelection::month(2024, 5)))
            .unwrap();
        let june = dashboard
            .set_filter(FilterState::new(PeriodSelection::month(2024, 6)))
            .unwrap();

        assert!(!dashboard.complete(may, snapshot.clone()));
        assert!(dashboard.view().is_none());
        assert!(dashboard.complete(june, snapshot));

        let view = dashboard.view().unwrap();
        assert_eq!(view.filter.selection, PeriodSelection::month(2024, 6));
        assert_eq!(view.events.len(), 1);
        assert_eq!(view.aggregates[0].messages, 0);
        assert_eq!(view.aggregates[1].messages, 99);
    }
}
