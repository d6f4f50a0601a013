//! Reconstructs inspection events from point-level rows.
//!
//! A chat inspection has no row of its own: it is every point record sharing
//! `(manager, event date, inspector)`. Rows that coincidentally share that key
//! are merged into one event.

use std::fmt;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

use crate::error::OversightError;
use crate::models::{NewPoint, PointKind, PointRecord};

/// Joins encoded key fields. UUIDs and ISO dates never contain it.
pub const KEY_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey {
    pub manager_id: Uuid,
    pub event_date: NaiveDate,
    pub inspector_id: Uuid,
}

impl GroupKey {
    pub fn of(record: &PointRecord) -> Self {
        Self {
            manager_id: record.manager_id,
            event_date: record.event_date,
            inspector_id: record.inspector_id,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.manager_id,
            self.event_date.format("%Y-%m-%d"),
            self.inspector_id,
            sep = KEY_SEPARATOR
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectionEvent {
    pub key: GroupKey,
    pub members: Vec<PointRecord>,
    pub positives: i64,
    pub negatives: i64,
    pub score: i64,
}

impl InspectionEvent {
    fn open(key: GroupKey) -> Self {
        Self {
            key,
            members: Vec::new(),
            positives: 0,
            negatives: 0,
            score: 0,
        }
    }

    fn absorb(&mut self, record: &PointRecord) {
        match record.kind {
            PointKind::Positive => self.positives = self.positives.saturating_add(record.quantity),
            PointKind::Negative => self.negatives = self.negatives.saturating_add(record.quantity),
        }
        self.score = self.positives.saturating_sub(self.negatives);
        self.members.push(record.clone());
    }

    pub fn event_date(&self) -> NaiveDate {
        self.key.event_date
    }

    pub fn member_ids(&self) -> Vec<Uuid> {
        self.members.iter().map(|member| member.id).collect()
    }
}

/// Groups records into events, newest first. Events on the same date keep
/// the order in which their key was first seen.
pub fn group_records(records: &[PointRecord]) -> Vec<InspectionEvent> {
    let mut groups: IndexMap<GroupKey, InspectionEvent> = IndexMap::new();

    for record in records {
        let key = GroupKey::of(record);
        groups
            .entry(key)
            .or_insert_with(|| InspectionEvent::open(key))
            .absorb(record);
    }

    let mut events: Vec<InspectionEvent> = groups.into_values().collect();
    events.sort_by(|a, b| b.event_date().cmp(&a.event_date()));
    events
}

/// Replace-on-edit: every row under `key` goes, `inserts` come in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEdit {
    pub key: GroupKey,
    pub inserts: Vec<PointRecord>,
}

/// Delete by the member ids captured when the event was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDeletion {
    pub ids: Vec<Uuid>,
}

pub fn plan_edit(
    event: &InspectionEvent,
    replacement: Vec<NewPoint>,
) -> Result<EventEdit, OversightError> {
    plan_insert(event.key, replacement).map(|inserts| EventEdit {
        key: event.key,
        inserts,
    })
}

/// Stamps a fresh set of points with an event key.
pub fn plan_insert(key: GroupKey, points: Vec<NewPoint>) -> Result<Vec<PointRecord>, OversightError> {
    points
        .into_iter()
        .map(|point| {
            point.validate()?;
            Ok(PointRecord::tagged(
                Uuid::new_v4(),
                key.manager_id,
                key.event_date,
                key.inspector_id,
                point,
            ))
        })
        .collect()
}

pub fn plan_delete(event: &InspectionEvent) -> EventDeletion {
    EventDeletion {
        ids: event.member_ids(),
    }
}
