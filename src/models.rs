use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OversightError;
use crate::period::PeriodRef;

/// Polarity of a point-level observation or a call checklist item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    Positive,
    Negative,
}

impl PointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointKind::Positive => "positive",
            PointKind::Negative => "negative",
        }
    }
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointKind {
    type Err = OversightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" | "positivo" | "+" => Ok(PointKind::Positive),
            "negative" | "negativo" | "-" => Ok(PointKind::Negative),
            other => Err(OversightError::UnknownKind(other.to_string())),
        }
    }
}

/// Channel a manager works in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    Calls,
    Telegram,
}

impl Sector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sector::Calls => "calls",
            Sector::Telegram => "telegram",
        }
    }
}

impl FromStr for Sector {
    type Err = OversightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "calls" | "call" | "ligacoes" | "ligações" => Ok(Sector::Calls),
            "telegram" | "chat" => Ok(Sector::Telegram),
            other => Err(OversightError::UnknownSector(other.to_string())),
        }
    }
}

/// One chat-channel observation row. Several rows share a grouping key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRecord {
    pub id: Uuid,
    pub manager_id: Uuid,
    pub event_date: NaiveDate,
    pub kind: PointKind,
    pub category: Option<String>,
    pub observation: Option<String>,
    pub quantity: i64,
    pub inspector_id: Uuid,
    pub week_of_month: i32,
    pub month: i32,
    pub year: i32,
}

/// Point payload as typed by a supervisor, before it is stamped with a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPoint {
    pub kind: PointKind,
    pub category: Option<String>,
    pub observation: Option<String>,
    pub quantity: i64,
}

impl NewPoint {
    pub fn validate(&self) -> Result<(), OversightError> {
        if self.quantity < 1 {
            return Err(OversightError::InvalidQuantity(self.quantity));
        }
        Ok(())
    }
}

impl PointRecord {
    /// Builds a stored row, tagging it with the week/month/year reference of
    /// its event date.
    pub fn tagged(
        id: Uuid,
        manager_id: Uuid,
        event_date: NaiveDate,
        inspector_id: Uuid,
        point: NewPoint,
    ) -> Self {
        let reference = PeriodRef::of(event_date);
        Self {
            id,
            manager_id,
            event_date,
            kind: point.kind,
            category: point.category,
            observation: point.observation,
            quantity: point.quantity,
            inspector_id,
            week_of_month: reference.week,
            month: reference.month,
            year: reference.year,
        }
    }
}

/// Live-call evaluation with its itemized checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInspection {
    pub id: Uuid,
    pub manager_id: Uuid,
    pub date: NaiveDate,
    pub inspector_id: Uuid,
    pub is_cancelled: bool,
    pub cancellation_reason: Option<String>,
    pub score: i64,
    pub period_week: i32,
    pub period_month: i32,
    pub period_year: i32,
    pub items: Vec<CallInspectionItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInspectionItem {
    pub inspection_id: Uuid,
    pub criterion: Option<String>,
    pub status: PointKind,
    pub observation: Option<String>,
    pub quantity: i64,
}

/// Weekly message volume. Duplicates for the same reference are expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub manager_id: Uuid,
    pub quantity: i64,
    pub week_of_month: i32,
    pub month: i32,
    pub year: i32,
}

impl MessageRecord {
    pub fn period_ref(&self) -> PeriodRef {
        PeriodRef {
            week: self.week_of_month,
            month: self.month,
            year: self.year,
        }
    }
}

/// Normalized roster entry. `sectors` is always derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manager {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    pub sectors: BTreeSet<Sector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankingEntry {
    pub manager_id: Uuid,
    pub name: String,
    pub messages: i64,
    pub positives: i64,
    pub negatives: i64,
    pub final_score: i64,
}
