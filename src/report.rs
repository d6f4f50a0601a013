use std::fmt::Write;

use crate::dashboard::DashboardView;
use crate::models::RankingEntry;
use crate::period::Period;

const RANKING_LIMIT: usize = 10;
const RECENT_EVENTS: usize = 5;

pub fn period_label(period: &Period) -> String {
    match period.bounds() {
        None => "an empty period".to_string(),
        Some((start, end)) if start == end => start.to_string(),
        Some((start, end)) => format!("{start} to {end}"),
    }
}

fn write_ranking<F>(output: &mut String, title: &str, entries: &[RankingEntry], value: F)
where
    F: Fn(&RankingEntry) -> String,
{
    let _ = writeln!(output);
    let _ = writeln!(output, "## {title}");

    if entries.is_empty() {
        let _ = writeln!(output, "No managers in this ranking.");
        return;
    }
    for (position, entry) in entries.iter().take(RANKING_LIMIT).enumerate() {
        let _ = writeln!(output, "{}. {} ({})", position + 1, entry.name, value(entry));
    }
}

pub fn build_report(view: &DashboardView) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Gestor Oversight Report");
    let _ = writeln!(output, "Generated for {}", period_label(&view.period));

    write_ranking(&mut output, "Ranking Bruto", &view.rankings.raw, |e| {
        format!("{} messages", e.messages)
    });
    write_ranking(&mut output, "Ranking de Negativos", &view.rankings.negative, |e| {
        format!("{} negatives", e.negatives)
    });
    write_ranking(&mut output, "Ranking Final", &view.rankings.final_score, |e| {
        format!("score {} = {} messages - {} negatives", e.final_score, e.messages, e.negatives)
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Issues by Manager");
    if view.aggregates.is_empty() {
        let _ = writeln!(output, "No observations recorded for this period.");
    } else {
        for aggregate in &view.aggregates {
            let _ = writeln!(
                output,
                "- {}: {} positives, {} negatives ({:.1}% positive); top issue: {}",
                aggregate.name,
                aggregate.positives,
                aggregate.negatives,
                aggregate.positive_rate,
                aggregate.issues
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Call Inspections");
    if view.calls.is_empty() {
        let _ = writeln!(output, "No call inspections in this period.");
    } else {
        for summary in &view.calls {
            let name = view
                .manager_name(summary.manager_id)
                .map(str::to_string)
                .unwrap_or_else(|| summary.manager_id.to_string());
            let _ = writeln!(
                output,
                "- {}: score {} across {} inspections ({} cancelled, {:.1}% positive)",
                name, summary.score, summary.inspections, summary.cancelled, summary.positive_rate
            );
            if summary.issues.has_issues() {
                let _ = writeln!(output, "  - top call issue: {}", summary.issues);
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Inspections");
    if view.events.is_empty() {
        let _ = writeln!(output, "No inspections recorded for this period.");
    } else {
        for event in view.events.iter().take(RECENT_EVENTS) {
            let name = view.manager_name(event.key.manager_id).unwrap_or("unknown manager");
            let _ = writeln!(
                output,
                "- {} on {}: +{} / -{} (net {}) over {} points",
                name,
                event.event_date(),
                event.positives,
                event.negatives,
                event.score,
                event.members.len()
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{FilterState, Snapshot};
    use crate::models::{
        CallInspection, CallInspectionItem, Manager, MessageRecord, NewPoint, PointKind, PointRecord,
    };
    use crate::period::PeriodSelection;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    #[test]
    fn report_lists_rankings_and_issues() {
        let manager = Manager {
            id: Uuid::new_v4(),
            name: "Larissa Campos".to_string(),
            active: true,
            sectors: BTreeSet::new(),
        };
        let snapshot = Snapshot {
            managers: vec![manager.clone()],
            points: vec![PointRecord::tagged(
                Uuid::new_v4(),
                manager.id,
                NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
                Uuid::new_v4(),
                NewPoint {
                    kind: PointKind::Negative,
                    category: Some("late reply".to_string()),
                    observation: None,
                    quantity: 5,
                },
            )],
            calls: Vec::new(),
            messages: vec![MessageRecord {
                id: Uuid::new_v4(),
                manager_id: manager.id,
                quantity: 50,
                week_of_month: 1,
                month: 2,
                year: 2026,
            }],
        };
        let view = DashboardView::build(FilterState::new(PeriodSelection::week(2026, 2, 1)), snapshot);
        let report = build_report(&view);

        assert!(report.contains("Generated for 2026-02-01 to 2026-02-07"));
        assert!(report.contains("1. Larissa Campos (50 messages)"));
        assert!(report.contains("score 45 = 50 messages - 5 negatives"));
        assert!(report.contains("top issue: late reply (5)"));
        assert!(report.contains("No call inspections in this period."));
    }

    #[test]
    fn call_section_names_managers_without_chat_activity() {
        let manager = Manager {
            id: Uuid::new_v4(),
            name: "Tatiane Rocha".to_string(),
            active: true,
            sectors: BTreeSet::new(),
        };
        let call_id = Uuid::new_v4();
        let item = |criterion: &str, quantity: i64| CallInspectionItem {
            inspection_id: call_id,
            criterion: Some(criterion.to_string()),
            status: PointKind::Negative,
            observation: None,
            quantity,
        };
        let snapshot = Snapshot {
            managers: vec![manager.clone()],
            points: Vec::new(),
            calls: vec![CallInspection {
                id: call_id,
                manager_id: manager.id,
                date: NaiveDate::from_ymd_opt(2026, 2, 3).unwrap(),
                inspector_id: Uuid::new_v4(),
                is_cancelled: false,
                cancellation_reason: None,
                score: -3,
                period_week: 1,
                period_month: 2,
                period_year: 2026,
                items: vec![item("hold time", 2), item("script", 1)],
            }],
            messages: Vec::new(),
        };
        let view = DashboardView::build(FilterState::new(PeriodSelection::month(2026, 2)), snapshot);
        let report = build_report(&view);

        assert!(report.contains("- Tatiane Rocha: score -3 across 1 inspections"));
        assert!(report.contains("  - top call issue: hold time (2), 1 other negatives"));
        assert!(!report.contains(&manager.id.to_string()));
    }

    #[test]
    fn empty_period_report_is_stable() {
        let view = DashboardView::build(
            FilterState::new(PeriodSelection::week(2026, 2, 5)),
            Snapshot::default(),
        );
        let report = build_report(&view);
        assert!(report.contains("Generated for an empty period"));
        assert!(report.contains("No managers in this ranking."));
        assert!(report.contains("No inspections recorded for this period."));
    }
}
