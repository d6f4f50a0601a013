use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dashboard::{FilterState, Snapshot};
use crate::grouping::{EventDeletion, EventEdit, GroupKey};
use crate::models::{
    CallInspection, CallInspectionItem, Manager, MessageRecord, NewPoint, PointKind, PointRecord,
};
use crate::period::{self, Period, PeriodRef};
use crate::roster::{self, RawManager};
use crate::scoring::{self, MessageDeletion};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// How a query narrows rows in time: by raw date, or by the week/month/year
/// integers stamped at insert time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Window {
    Dates(Period),
    Refs(Vec<PeriodRef>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub window: Window,
    pub manager_id: Option<Uuid>,
}

struct Columns {
    date: &'static str,
    week: &'static str,
    month: &'static str,
    year: &'static str,
}

const POINT_COLUMNS: Columns = Columns {
    date: "event_date",
    week: "week_of_month",
    month: "month",
    year: "year",
};

const CALL_COLUMNS: Columns = Columns {
    date: "inspection_date",
    week: "period_week",
    month: "period_month",
    year: "period_year",
};

const MESSAGE_COLUMNS: Columns = Columns {
    date: "",
    week: "week_of_month",
    month: "month",
    year: "year",
};

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &RecordQuery, columns: &Columns) {
    if let Some(manager_id) = query.manager_id {
        builder.push(" AND manager_id = ").push_bind(manager_id);
    }

    match &query.window {
        Window::Dates(period) => match period.bounds() {
            Some((start, end)) if !columns.date.is_empty() => {
                builder
                    .push(format!(" AND {} BETWEEN ", columns.date))
                    .push_bind(start)
                    .push(" AND ")
                    .push_bind(end);
            }
            Some((start, end)) => {
                // reference-only table: translate the dates into week refs
                let refs = Period::between(start, end).covered_refs();
                push_refs(builder, &refs, columns);
            }
            None => {
                builder.push(" AND FALSE");
            }
        },
        Window::Refs(refs) => push_refs(builder, refs, columns),
    }
}

/// Above this many refs the OR list gives way to a `(year, month, week)`
/// range, keeping the bind count far below the Postgres limit.
const MAX_LISTED_REFS: usize = 64;

fn push_refs(builder: &mut QueryBuilder<'_, Postgres>, refs: &[PeriodRef], columns: &Columns) {
    let chronological = |reference: &&PeriodRef| (reference.year, reference.month, reference.week);
    let (Some(first), Some(last)) = (
        refs.iter().min_by_key(chronological),
        refs.iter().max_by_key(chronological),
    ) else {
        builder.push(" AND FALSE");
        return;
    };

    if refs.len() > MAX_LISTED_REFS {
        // gaps inside the range are trimmed again by Snapshot::restrict
        let tuple = format!("({}, {}, {})", columns.year, columns.month, columns.week);
        builder
            .push(format!(" AND {tuple} >= ("))
            .push_bind(first.year)
            .push(", ")
            .push_bind(first.month)
            .push(", ")
            .push_bind(first.week)
            .push(format!(") AND {tuple} <= ("))
            .push_bind(last.year)
            .push(", ")
            .push_bind(last.month)
            .push(", ")
            .push_bind(last.week)
            .push(")");
        return;
    }

    builder.push(" AND (");
    for (i, reference) in refs.iter().enumerate() {
        if i > 0 {
            builder.push(" OR ");
        }
        builder
            .push(format!("({} = ", columns.week))
            .push_bind(reference.week)
            .push(format!(" AND {} = ", columns.month))
            .push_bind(reference.month)
            .push(format!(" AND {} = ", columns.year))
            .push_bind(reference.year)
            .push(")");
    }
    builder.push(")");
}

pub async fn fetch_managers(pool: &PgPool) -> anyhow::Result<Vec<Manager>> {
    let rows = sqlx::query(
        "SELECT id, full_name, active, sector, sectors, handles_calls \
         FROM oversight.managers ORDER BY full_name, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            roster::normalize(RawManager {
                id: row.get("id"),
                name: row.get("full_name"),
                active: row.get("active"),
                sector: row.get("sector"),
                sectors: row.get("sectors"),
                handles_calls: row.get("handles_calls"),
            })
        })
        .collect())
}

fn point_from_row(row: &PgRow) -> anyhow::Result<PointRecord> {
    let kind: String = row.get("kind");
    Ok(PointRecord {
        id: row.get("id"),
        manager_id: row.get("manager_id"),
        event_date: row.get("event_date"),
        kind: kind.parse()?,
        category: row.get("category"),
        observation: row.get("observation"),
        quantity: row.get("quantity"),
        inspector_id: row.get("inspector_id"),
        week_of_month: row.get("week_of_month"),
        month: row.get("month"),
        year: row.get("year"),
    })
}

pub async fn fetch_points(pool: &PgPool, query: &RecordQuery) -> anyhow::Result<Vec<PointRecord>> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT id, manager_id, event_date, kind, category, observation, quantity, \
         inspector_id, week_of_month, month, year \
         FROM oversight.point_records WHERE TRUE",
    );
    push_filters(&mut builder, query, &POINT_COLUMNS);
    builder.push(" ORDER BY seq");

    let rows = builder.build().fetch_all(pool).await?;
    let points = rows.iter().map(point_from_row).collect::<anyhow::Result<Vec<_>>>()?;
    debug!(count = points.len(), "fetched point records");
    Ok(points)
}

pub async fn fetch_calls(pool: &PgPool, query: &RecordQuery) -> anyhow::Result<Vec<CallInspection>> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT id, manager_id, inspection_date, inspector_id, is_cancelled, \
         cancellation_reason, score, period_week, period_month, period_year \
         FROM oversight.call_inspections WHERE TRUE",
    );
    push_filters(&mut builder, query, &CALL_COLUMNS);
    builder.push(" ORDER BY inspection_date DESC, id");

    let rows = builder.build().fetch_all(pool).await?;
    let mut inspections: Vec<CallInspection> = rows
        .into_iter()
        .map(|row| CallInspection {
            id: row.get("id"),
            manager_id: row.get("manager_id"),
            date: row.get("inspection_date"),
            inspector_id: row.get("inspector_id"),
            is_cancelled: row.get("is_cancelled"),
            cancellation_reason: row.get("cancellation_reason"),
            score: row.get("score"),
            period_week: row.get("period_week"),
            period_month: row.get("period_month"),
            period_year: row.get("period_year"),
            items: Vec::new(),
        })
        .collect();

    if inspections.is_empty() {
        return Ok(inspections);
    }

    let ids: Vec<Uuid> = inspections.iter().map(|inspection| inspection.id).collect();
    let item_rows = sqlx::query(
        "SELECT inspection_id, criterion, status, observation, quantity \
         FROM oversight.call_inspection_items WHERE inspection_id = ANY($1) ORDER BY seq",
    )
    .bind(&ids[..])
    .fetch_all(pool)
    .await?;

    for row in item_rows {
        let status: String = row.get("status");
        let item = CallInspectionItem {
            inspection_id: row.get("inspection_id"),
            criterion: row.get("criterion"),
            status: status.parse()?,
            observation: row.get("observation"),
            quantity: row.get("quantity"),
        };
        if let Some(inspection) = inspections.iter_mut().find(|i| i.id == item.inspection_id) {
            inspection.items.push(item);
        }
    }

    Ok(inspections)
}

pub async fn fetch_messages(pool: &PgPool, query: &RecordQuery) -> anyhow::Result<Vec<MessageRecord>> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT id, manager_id, quantity, week_of_month, month, year \
         FROM oversight.message_records WHERE TRUE",
    );
    push_filters(&mut builder, query, &MESSAGE_COLUMNS);
    builder.push(" ORDER BY year, month, week_of_month, id");

    let rows = builder.build().fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| MessageRecord {
            id: row.get("id"),
            manager_id: row.get("manager_id"),
            quantity: row.get("quantity"),
            week_of_month: row.get("week_of_month"),
            month: row.get("month"),
            year: row.get("year"),
        })
        .collect())
}

/// Loads every collection the dashboard needs for `filter`, concurrently.
pub async fn fetch_snapshot(pool: &PgPool, filter: &FilterState) -> anyhow::Result<Snapshot> {
    let period = filter.period();
    if period.is_empty() {
        warn!(selection = ?filter.selection, "period resolves to no days");
        let managers = fetch_managers(pool).await?;
        return Ok(Snapshot {
            managers,
            ..Snapshot::default()
        });
    }

    let dated = RecordQuery {
        window: Window::Dates(period),
        manager_id: filter.manager_id,
    };
    let referenced = RecordQuery {
        window: Window::Refs(period.covered_refs()),
        manager_id: filter.manager_id,
    };

    let (managers, points, calls, messages) = tokio::try_join!(
        fetch_managers(pool),
        fetch_points(pool, &dated),
        fetch_calls(pool, &dated),
        fetch_messages(pool, &referenced),
    )?;

    info!(
        points = points.len(),
        calls = calls.len(),
        messages = messages.len(),
        "snapshot fetched"
    );
    Ok(Snapshot {
        managers,
        points,
        calls,
        messages,
    })
}

async fn insert_point(
    conn: &mut PgConnection,
    record: &PointRecord,
    source_key: Option<&str>,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO oversight.point_records
        (id, manager_id, event_date, kind, category, observation, quantity,
         inspector_id, week_of_month, month, year, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(record.id)
    .bind(record.manager_id)
    .bind(record.event_date)
    .bind(record.kind.as_str())
    .bind(&record.category)
    .bind(&record.observation)
    .bind(record.quantity)
    .bind(record.inspector_id)
    .bind(record.week_of_month)
    .bind(record.month)
    .bind(record.year)
    .bind(source_key)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Stores a brand new inspection event.
pub async fn insert_event(pool: &PgPool, records: &[PointRecord]) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    for record in records {
        insert_point(&mut *tx, record, None).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Replaces every row under the event key with the edited set.
pub async fn apply_edit(pool: &PgPool, edit: &EventEdit) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await?;
    let removed = delete_group(&mut *tx, &edit.key).await?;
    for record in &edit.inserts {
        insert_point(&mut *tx, record, None).await?;
    }
    tx.commit().await?;
    info!(key = %edit.key, removed, inserted = edit.inserts.len(), "inspection event replaced");
    Ok(removed)
}

async fn delete_group(conn: &mut PgConnection, key: &GroupKey) -> anyhow::Result<u64> {
    let result = sqlx::query(
        "DELETE FROM oversight.point_records \
         WHERE manager_id = $1 AND event_date = $2 AND inspector_id = $3",
    )
    .bind(key.manager_id)
    .bind(key.event_date)
    .bind(key.inspector_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn apply_deletion(pool: &PgPool, deletion: &EventDeletion) -> anyhow::Result<u64> {
    if deletion.ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query("DELETE FROM oversight.point_records WHERE id = ANY($1)")
        .bind(&deletion.ids[..])
        .execute(pool)
        .await?;
    if result.rows_affected() < deletion.ids.len() as u64 {
        warn!(
            expected = deletion.ids.len(),
            deleted = result.rows_affected(),
            "some event members were already gone"
        );
    }
    Ok(result.rows_affected())
}

pub async fn record_messages(
    pool: &PgPool,
    manager_id: Uuid,
    reference: PeriodRef,
    quantity: i64,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO oversight.message_records
        (id, manager_id, quantity, week_of_month, month, year)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(manager_id)
    .bind(quantity)
    .bind(reference.week)
    .bind(reference.month)
    .bind(reference.year)
    .execute(pool)
    .await?;
    Ok(())
}

/// Removes every message row for the manager and week, duplicates included,
/// rows added since the deletion was planned too.
pub async fn apply_message_deletion(pool: &PgPool, deletion: &MessageDeletion) -> anyhow::Result<u64> {
    let reference = deletion.reference;
    let result = sqlx::query(
        "DELETE FROM oversight.message_records \
         WHERE manager_id = $1 AND week_of_month = $2 AND month = $3 AND year = $4",
    )
    .bind(deletion.manager_id)
    .bind(reference.week)
    .bind(reference.month)
    .bind(reference.year)
    .execute(pool)
    .await?;
    if result.rows_affected() != deletion.ids.len() as u64 {
        warn!(
            planned = deletion.ids.len(),
            deleted = result.rows_affected(),
            "message rows changed while deleting"
        );
    }
    Ok(result.rows_affected())
}

/// Stores a call inspection with its items. The stored score is recomputed
/// from the items, so a cancelled call always lands with score 0.
pub async fn insert_call(pool: &PgPool, inspection: &CallInspection) -> anyhow::Result<()> {
    let reference = PeriodRef::of(inspection.date);
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO oversight.call_inspections
        (id, manager_id, inspection_date, inspector_id, is_cancelled,
         cancellation_reason, score, period_week, period_month, period_year)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(inspection.id)
    .bind(inspection.manager_id)
    .bind(inspection.date)
    .bind(inspection.inspector_id)
    .bind(inspection.is_cancelled)
    .bind(&inspection.cancellation_reason)
    .bind(scoring::call_score(inspection))
    .bind(reference.week)
    .bind(reference.month)
    .bind(reference.year)
    .execute(&mut *tx)
    .await?;

    for item in &inspection.items {
        sqlx::query(
            r#"
            INSERT INTO oversight.call_inspection_items
            (id, inspection_id, criterion, status, observation, quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(inspection.id)
        .bind(&item.criterion)
        .bind(item.status.as_str())
        .bind(&item.observation)
        .bind(item.quantity)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn upsert_manager(conn: &mut PgConnection, id: Uuid, name: &str, sectors: &[&str]) -> anyhow::Result<()> {
    let sectors: Vec<String> = sectors.iter().map(|s| s.to_string()).collect();
    sqlx::query(
        r#"
        INSERT INTO oversight.managers (id, full_name, active, sectors)
        VALUES ($1, $2, TRUE, $3)
        ON CONFLICT (id) DO UPDATE SET full_name = EXCLUDED.full_name
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(&sectors[..])
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let managers = vec![
        (
            Uuid::parse_str("6f1c2b9e-3f0a-4a52-9d0e-1b7c4e2a9f10")?,
            "Larissa Campos",
            vec!["telegram"],
        ),
        (
            Uuid::parse_str("a2d47c11-8e5b-4f3c-b0a9-5c6e7d8f9012")?,
            "Rafael Nunes",
            vec!["telegram", "calls"],
        ),
        (
            Uuid::parse_str("c9e8f7a6-1b2c-4d3e-8f4a-9b0c1d2e3f45")?,
            "Tatiane Rocha",
            vec!["calls"],
        ),
    ];
    let inspector = Uuid::parse_str("0e5d4c3b-2a19-4807-96f5-e4d3c2b1a098")?;

    let mut conn = pool.acquire().await?;
    for (id, name, sectors) in &managers {
        upsert_manager(&mut *conn, *id, name, sectors).await?;
    }

    let day = |d: u32| NaiveDate::from_ymd_opt(2026, 2, d).context("invalid date");
    let points = vec![
        ("seed-001", managers[0].0, day(2)?, PointKind::Positive, "greeting", 2),
        ("seed-002", managers[0].0, day(2)?, PointKind::Negative, "late reply", 1),
        ("seed-003", managers[1].0, day(3)?, PointKind::Negative, "late reply", 3),
        ("seed-004", managers[1].0, day(10)?, PointKind::Negative, "tone", 1),
    ];
    for (source_key, manager_id, date, kind, category, quantity) in points {
        let record = PointRecord::tagged(
            Uuid::new_v4(),
            manager_id,
            date,
            inspector,
            NewPoint {
                kind,
                category: Some(category.to_string()),
                observation: None,
                quantity,
            },
        );
        insert_point(&mut *conn, &record, Some(source_key)).await?;
    }
    drop(conn);

    let call_id = Uuid::parse_str("5b4a3928-1706-4f5e-8d7c-6b5a49382716")?;
    insert_call(
        pool,
        &CallInspection {
            id: call_id,
            manager_id: managers[2].0,
            date: day(4)?,
            inspector_id: inspector,
            is_cancelled: false,
            cancellation_reason: None,
            score: 0,
            period_week: 0,
            period_month: 0,
            period_year: 0,
            items: vec![
                CallInspectionItem {
                    inspection_id: call_id,
                    criterion: Some("script".to_string()),
                    status: PointKind::Positive,
                    observation: None,
                    quantity: 2,
                },
                CallInspectionItem {
                    inspection_id: call_id,
                    criterion: Some("hold time".to_string()),
                    status: PointKind::Negative,
                    observation: Some("left client waiting".to_string()),
                    quantity: 1,
                },
            ],
        },
    )
    .await?;

    // seeded messages intentionally include a duplicate week
    let week_one = PeriodRef::of(day(2)?);
    let existing = fetch_messages(
        pool,
        &RecordQuery {
            window: Window::Refs(vec![week_one]),
            manager_id: None,
        },
    )
    .await?;
    if existing.is_empty() {
        record_messages(pool, managers[0].0, week_one, 120).await?;
        record_messages(pool, managers[0].0, week_one, 35).await?;
        record_messages(pool, managers[1].0, week_one, 140).await?;
    }

    Ok(())
}

/// Imports point records from CSV. Rows sharing manager, date and inspector
/// become one inspection event.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        manager_id: Uuid,
        manager_name: String,
        event_date: String,
        kind: String,
        category: Option<String>,
        observation: Option<String>,
        quantity: i64,
        inspector_id: Uuid,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut conn = pool.acquire().await?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let point = NewPoint {
            kind: row.kind.parse()?,
            category: row.category.filter(|c| !c.trim().is_empty()),
            observation: row.observation.filter(|o| !o.trim().is_empty()),
            quantity: row.quantity,
        };
        point
            .validate()
            .with_context(|| format!("row {} of {}", line + 1, csv_path.display()))?;
        let event_date = period::parse_date(&row.event_date)?;

        upsert_manager(&mut *conn, row.manager_id, &row.manager_name, &[]).await?;

        let record = PointRecord::tagged(Uuid::new_v4(), row.manager_id, event_date, row.inspector_id, point);
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        inserted += insert_point(&mut *conn, &record, Some(&source_key)).await? as usize;
    }

    Ok(inserted)
}

/// Reads replacement points (`kind,category,observation,quantity`) for an
/// inspection event.
pub fn read_points_csv(path: &std::path::Path) -> anyhow::Result<Vec<NewPoint>> {
    #[derive(serde::Deserialize)]
    struct CsvPoint {
        kind: String,
        category: Option<String>,
        observation: Option<String>,
        quantity: i64,
    }

    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut points = Vec::new();
    for result in reader.deserialize::<CsvPoint>() {
        let row = result?;
        points.push(NewPoint {
            kind: row.kind.parse()?,
            category: row.category.filter(|c| !c.trim().is_empty()),
            observation: row.observation.filter(|o| !o.trim().is_empty()),
            quantity: row.quantity,
        });
    }
    if points.is_empty() {
        anyhow::bail!("{} holds no points", path.display());
    }
    Ok(points)
}
