//! Issue frequency: which negative category shows up most for a manager, and
//! how many negatives fall outside it.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::models::{CallInspection, PointKind, PointRecord};

/// Longest key kept verbatim. Longer candidates are free text and collapse
/// into [`OTHER_ISSUES_LABEL`].
pub const MAX_ISSUE_KEY_CHARS: usize = 30;
pub const OTHER_ISSUES_LABEL: &str = "Other issues";
pub const UNCATEGORIZED_LABEL: &str = "Uncategorized";

/// One negative observation as seen by the analyzer.
#[derive(Debug, Clone, Copy)]
pub struct NegativeHit<'a> {
    pub category: Option<&'a str>,
    pub observation: Option<&'a str>,
    pub quantity: i64,
}

pub fn issue_key(category: Option<&str>, observation: Option<&str>) -> String {
    let candidate = match category.map(str::trim).filter(|c| !c.is_empty()) {
        Some(category) => category.to_string(),
        None => match observation
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|text| !text.is_empty())
        {
            Some(text) => text,
            None => return UNCATEGORIZED_LABEL.to_string(),
        },
    };

    if candidate.chars().count() > MAX_ISSUE_KEY_CHARS {
        OTHER_ISSUES_LABEL.to_string()
    } else {
        candidate
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopIssue {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueBreakdown {
    pub total_negatives: i64,
    pub top_issue: Option<TopIssue>,
    pub other_negatives: i64,
    /// Counts per issue key in first-encountered order.
    pub frequencies: IndexMap<String, i64>,
}

impl IssueBreakdown {
    pub fn top_issue_count(&self) -> i64 {
        self.top_issue.as_ref().map_or(0, |issue| issue.count)
    }

    pub fn has_issues(&self) -> bool {
        self.top_issue.is_some()
    }
}

impl fmt::Display for IssueBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.top_issue {
            None => f.write_str("no issues"),
            Some(top) if self.other_negatives == 0 => write!(f, "{} ({})", top.name, top.count),
            Some(top) => write!(
                f,
                "{} ({}), {} other negatives",
                top.name, top.count, self.other_negatives
            ),
        }
    }
}

pub fn analyze<'a>(hits: impl IntoIterator<Item = NegativeHit<'a>>) -> IssueBreakdown {
    let mut frequencies: IndexMap<String, i64> = IndexMap::new();
    let mut total_negatives: i64 = 0;

    for hit in hits {
        total_negatives = total_negatives.saturating_add(hit.quantity);
        let count = frequencies
            .entry(issue_key(hit.category, hit.observation))
            .or_insert(0);
        *count = count.saturating_add(hit.quantity);
    }

    let mut top_issue: Option<TopIssue> = None;
    for (name, &count) in &frequencies {
        // strict comparison keeps the first key on ties
        if count > 0 && top_issue.as_ref().map_or(true, |top| count > top.count) {
            top_issue = Some(TopIssue {
                name: name.clone(),
                count,
            });
        }
    }

    let mut breakdown = IssueBreakdown {
        total_negatives,
        top_issue,
        other_negatives: 0,
        frequencies,
    };
    breakdown.other_negatives = total_negatives.saturating_sub(breakdown.top_issue_count());
    breakdown
}

pub fn analyze_points<'a>(records: impl IntoIterator<Item = &'a PointRecord>) -> IssueBreakdown {
    analyze(
        records
            .into_iter()
            .filter(|record| record.kind == PointKind::Negative)
            .map(|record| NegativeHit {
                category: record.category.as_deref(),
                observation: record.observation.as_deref(),
                quantity: record.quantity,
            }),
    )
}

/// Call items of cancelled inspections are left out.
pub fn analyze_calls<'a>(inspections: impl IntoIterator<Item = &'a CallInspection>) -> IssueBreakdown {
    analyze(
        inspections
            .into_iter()
            .filter(|inspection| !inspection.is_cancelled)
            .flat_map(|inspection| inspection.items.iter())
            .filter(|item| item.status == PointKind::Negative)
            .map(|item| NegativeHit {
                category: item.criterion.as_deref(),
                observation: item.observation.as_deref(),
                quantity: item.quantity,
            }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit<'a>(category: Option<&'a str>, observation: Option<&'a str>, quantity: i64) -> NegativeHit<'a> {
        NegativeHit {
            category,
            observation,
            quantity,
        }
    }

    #[test]
    fn keys_fall_back_from_category_to_observation() {
        assert_eq!(issue_key(Some(" late "), Some("ignored")), "late");
        assert_eq!(issue_key(None, Some("no  greeting")), "no greeting");
        assert_eq!(issue_key(Some(""), None), UNCATEGORIZED_LABEL);
        assert_eq!(issue_key(None, Some("   ")), UNCATEGORIZED_LABEL);
    }

    #[test]
    fn long_keys_collapse_into_generic_label() {
        let long = "client waited more than ten minutes for an answer";
        assert_eq!(issue_key(None, Some(long)), OTHER_ISSUES_LABEL);
        assert_eq!(issue_key(Some(long), None), OTHER_ISSUES_LABEL);
        let exact = "a".repeat(MAX_ISSUE_KEY_CHARS);
        assert_eq!(issue_key(Some(&exact), None), exact);
    }

    #[test]
    fn top_issue_and_other_negatives() {
        let breakdown = analyze(vec![
            hit(Some("late"), None, 2),
            hit(Some("tone"), None, 1),
            hit(Some("late"), None, 1),
            hit(None, None, 1),
        ]);
        assert_eq!(breakdown.total_negatives, 5);
        assert_eq!(
            breakdown.top_issue,
            Some(TopIssue {
                name: "late".to_string(),
                count: 3
            })
        );
        assert_eq!(breakdown.other_negatives, 2);
        assert_eq!(
            breakdown.other_negatives,
            breakdown.total_negatives - breakdown.top_issue_count()
        );
    }

    #[test]
    fn ties_go_to_first_encountered_key() {
        let breakdown = analyze(vec![hit(Some("tone"), None, 2), hit(Some("late"), None, 2)]);
        assert_eq!(breakdown.top_issue.unwrap().name, "tone");
    }

    #[test]
    fn single_category_leaves_no_other_negatives() {
        let breakdown = analyze(vec![hit(Some("late"), None, 2), hit(Some("late"), None, 4)]);
        assert_eq!(breakdown.top_issue_count(), 6);
        assert_eq!(breakdown.other_negatives, 0);
        assert_eq!(breakdown.to_string(), "late (6)");
    }

    #[test]
    fn call_issues_skip_cancelled_inspections() {
        use crate::models::CallInspectionItem;
        use chrono::NaiveDate;
        use uuid::Uuid;

        let make = |cancelled: bool, criterion: &str, quantity: i64| {
            let id = Uuid::new_v4();
            CallInspection {
                id,
                manager_id: Uuid::nil(),
                date: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
                inspector_id: Uuid::nil(),
                is_cancelled: cancelled,
                cancellation_reason: None,
                score: 0,
                period_week: 1,
                period_month: 5,
                period_year: 2024,
                items: vec![
                    CallInspectionItem {
                        inspection_id: id,
                        criterion: Some(criterion.to_string()),
                        status: PointKind::Negative,
                        observation: None,
                        quantity,
                    },
                    CallInspectionItem {
                        inspection_id: id,
                        criterion: Some("greeting".to_string()),
                        status: PointKind::Positive,
                        observation: None,
                        quantity: 9,
                    },
                ],
            }
        };

        let breakdown = analyze_calls(&[make(true, "hold time", 7), make(false, "script", 2)]);
        assert_eq!(breakdown.total_negatives, 2);
        assert_eq!(breakdown.top_issue.map(|t| t.name), Some("script".to_string()));
        assert_eq!(breakdown.frequencies.len(), 1);
    }

    #[test]
    fn huge_counts_saturate() {
        let breakdown = analyze(vec![
            hit(Some("late"), None, i64::MAX),
            hit(Some("late"), None, 1),
            hit(Some("tone"), None, 1),
        ]);
        assert_eq!(breakdown.total_negatives, i64::MAX);
        assert_eq!(breakdown.top_issue_count(), i64::MAX);
        assert_eq!(breakdown.other_negatives, 0);
    }

    #[test]
    fn no_negatives_reports_no_issues() {
        let breakdown = analyze(Vec::<NegativeHit>::new());
        assert!(!breakdown.has_issues());
        assert_eq!(breakdown.top_issue_count(), 0);
        assert_eq!(breakdown.other_negatives, 0);
        assert_eq!(breakdown.to_string(), "no issues");
    }
}
