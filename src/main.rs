use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Datelike, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

mod config;
mod dashboard;
mod db;
mod error;
mod grouping;
mod issues;
mod models;
mod period;
mod ranking;
mod report;
mod roster;
mod scoring;

use dashboard::{Dashboard, DashboardView, FilterState};
use grouping::GroupKey;
use period::{PeriodMode, PeriodRef, PeriodSelection};

#[derive(Parser)]
#[command(name = "gestor-oversight")]
#[command(about = "Period aggregation and scoring for gestor quality inspections", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct PeriodArgs {
    #[arg(long, value_enum, default_value_t = PeriodMode::Month)]
    mode: PeriodMode,
    #[arg(long, default_value_t = 1)]
    week: u32,
    /// Defaults to the current month
    #[arg(long)]
    month: Option<u32>,
    /// Defaults to the current year
    #[arg(long)]
    year: Option<i32>,
    /// Explicit range start (YYYY-MM-DD); overrides --mode
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
    #[arg(long)]
    manager: Option<Uuid>,
}

impl PeriodArgs {
    fn filter(&self) -> FilterState {
        let today = Utc::now().date_naive();
        let month = self.month.unwrap_or_else(|| today.month());
        let year = self.year.unwrap_or_else(|| today.year());
        let selection = match (self.from, self.mode) {
            (Some(from), _) => PeriodSelection::custom(from, self.to),
            (None, PeriodMode::Week) => PeriodSelection::week(year, month, self.week),
            (None, PeriodMode::Month) => PeriodSelection::month(year, month),
            (None, PeriodMode::Custom) => {
                warn!("--mode custom without --from selects no days");
                PeriodSelection {
                    mode: PeriodMode::Custom,
                    range: None,
                    ..PeriodSelection::month(year, month)
                }
            }
        };

        let filter = FilterState::new(selection);
        match self.manager {
            Some(manager_id) => filter.for_manager(manager_id),
            None => filter,
        }
    }
}

#[derive(Args, Clone)]
struct EventArgs {
    #[arg(long)]
    manager: Uuid,
    #[arg(long)]
    date: NaiveDate,
    #[arg(long)]
    inspector: Uuid,
}

impl EventArgs {
    fn key(&self) -> GroupKey {
        GroupKey {
            manager_id: self.manager,
            event_date: self.date,
            inspector_id: self.inspector,
        }
    }
}

#[derive(Args, Clone)]
struct MessageArgs {
    #[arg(long)]
    manager: Uuid,
    #[arg(long)]
    week: u32,
    #[arg(long)]
    month: u32,
    #[arg(long)]
    year: i32,
}

impl MessageArgs {
    fn reference(&self) -> anyhow::Result<PeriodRef> {
        let reference = PeriodRef {
            week: i32::try_from(self.week)?,
            month: i32::try_from(self.month)?,
            year: self.year,
        };
        if reference.interval().is_empty() {
            bail!(
                "week {} of {}/{} does not exist",
                self.week,
                self.month,
                self.year
            );
        }
        Ok(reference)
    }

    fn query(&self, reference: PeriodRef) -> db::RecordQuery {
        db::RecordQuery {
            window: db::Window::Refs(vec![reference]),
            manager_id: Some(self.manager),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import point records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List inspection events for a period
    Events {
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long)]
        json: bool,
    },
    /// Show the raw, negative and final rankings
    Rankings {
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Summarize call inspections per manager
    Calls {
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Record a new inspection event from a CSV of points
    RecordEvent {
        #[command(flatten)]
        event: EventArgs,
        #[arg(long)]
        points: PathBuf,
    },
    /// Replace every point of an inspection event with a CSV of points
    EditEvent {
        #[command(flatten)]
        event: EventArgs,
        #[arg(long)]
        points: PathBuf,
    },
    /// Delete an inspection event
    DeleteEvent {
        #[command(flatten)]
        event: EventArgs,
    },
    /// Add a weekly message count
    RecordMessages {
        #[command(flatten)]
        target: MessageArgs,
        #[arg(long)]
        quantity: i64,
    },
    /// Delete every message count for a manager and week
    DeleteMessages {
        #[command(flatten)]
        target: MessageArgs,
    },
    /// List the roster with normalized sectors
    Managers {
        #[arg(long, value_enum)]
        sector: Option<models::Sector>,
    },
}

async fn load_view(pool: &PgPool, filter: FilterState) -> anyhow::Result<Arc<DashboardView>> {
    let mut dashboard = Dashboard::new();
    let ticket = dashboard
        .set_filter(filter)
        .context("a fresh dashboard always needs a fetch")?;
    let snapshot = db::fetch_snapshot(pool, &ticket.filter).await?;
    dashboard.complete(ticket, snapshot);
    dashboard.view().context("dashboard view missing after fetch")
}

/// Events on a single day, for locating one by its key.
async fn load_event(pool: &PgPool, key: GroupKey) -> anyhow::Result<Option<grouping::InspectionEvent>> {
    let filter = FilterState::new(PeriodSelection::custom(key.event_date, None)).for_manager(key.manager_id);
    let view = load_view(pool, filter).await?;
    Ok(view.events.iter().find(|event| event.key == key).cloned())
}

fn print_ranking(title: &str, entries: &[models::RankingEntry], limit: usize, value: fn(&models::RankingEntry) -> i64) {
    println!("{title}:");
    if entries.is_empty() {
        println!("  (no managers)");
    }
    for (position, entry) in entries.iter().take(limit).enumerate() {
        println!("  {}. {} {}", position + 1, entry.name, value(entry));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_logging();
    let cli = Cli::parse();
    let config = config::Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} point records from {}.", csv.display());
        }
        Commands::Events { period, json } => {
            let view = load_view(&pool, period.filter()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view.events)?);
                return Ok(());
            }
            if view.events.is_empty() {
                println!("No inspections found for {}.", report::period_label(&view.period));
                return Ok(());
            }
            for event in &view.events {
                println!(
                    "- {} {} (inspector {}): +{} / -{} net {} [{} points]",
                    event.event_date(),
                    view.manager_name(event.key.manager_id).unwrap_or("unknown manager"),
                    event.key.inspector_id,
                    event.positives,
                    event.negatives,
                    event.score,
                    event.members.len()
                );
            }
        }
        Commands::Rankings { period, limit, json } => {
            let view = load_view(&pool, period.filter()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view.rankings)?);
                return Ok(());
            }
            println!("Rankings for {}", report::period_label(&view.period));
            print_ranking("Raw (messages)", &view.rankings.raw, limit, |e| e.messages);
            print_ranking("Negatives", &view.rankings.negative, limit, |e| e.negatives);
            print_ranking("Final (messages - negatives)", &view.rankings.final_score, limit, |e| {
                e.final_score
            });
        }
        Commands::Calls { period, json } => {
            let view = load_view(&pool, period.filter()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view.calls)?);
                return Ok(());
            }
            if view.calls.is_empty() {
                println!("No call inspections found for {}.", report::period_label(&view.period));
                return Ok(());
            }
            for summary in &view.calls {
                println!(
                    "- {}: score {} across {} inspections ({} cancelled, {:.1}% positive); top issue: {}",
                    view.manager_name(summary.manager_id)
                        .map(str::to_string)
                        .unwrap_or_else(|| summary.manager_id.to_string()),
                    summary.score,
                    summary.inspections,
                    summary.cancelled,
                    summary.positive_rate,
                    summary.issues
                );
            }
        }
        Commands::Report { period, out } => {
            let view = load_view(&pool, period.filter()).await?;
            let report = report::build_report(&view);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::RecordEvent { event, points } => {
            let points = db::read_points_csv(&points)?;
            let records = grouping::plan_insert(event.key(), points)?;
            db::insert_event(&pool, &records).await?;
            println!("Recorded {} points for {}.", records.len(), event.date);
        }
        Commands::EditEvent { event, points } => {
            let Some(existing) = load_event(&pool, event.key()).await? else {
                bail!("no inspection event for that manager, date and inspector");
            };
            let edit = grouping::plan_edit(&existing, db::read_points_csv(&points)?)?;
            let removed = db::apply_edit(&pool, &edit).await?;
            println!("Replaced {removed} points with {}.", edit.inserts.len());
        }
        Commands::DeleteEvent { event } => {
            let Some(existing) = load_event(&pool, event.key()).await? else {
                bail!("no inspection event for that manager, date and inspector");
            };
            let deletion = grouping::plan_delete(&existing);
            let removed = db::apply_deletion(&pool, &deletion).await?;
            info!(removed, "inspection event deleted");
            println!("Deleted {removed} points.");
        }
        Commands::RecordMessages { target, quantity } => {
            if quantity < 0 {
                bail!("message quantity cannot be negative");
            }
            let reference = target.reference()?;
            db::record_messages(&pool, target.manager, reference, quantity).await?;
            let rows = db::fetch_messages(&pool, &target.query(reference)).await?;
            let total = scoring::messages_for(&rows, target.manager, reference);
            if rows.len() > 1 {
                warn!(rows = rows.len(), "several message records for the same week");
            }
            println!("Recorded {quantity} messages; week total is now {total}.");
        }
        Commands::DeleteMessages { target } => {
            let reference = target.reference()?;
            let rows = db::fetch_messages(&pool, &target.query(reference)).await?;
            let deletion = scoring::plan_message_deletion(&rows, target.manager, reference);
            if deletion.ids.is_empty() {
                println!("No message records for that week.");
                return Ok(());
            }
            let removed = db::apply_message_deletion(&pool, &deletion).await?;
            println!("Deleted {removed} message records.");
        }
        Commands::Managers { sector } => {
            let managers = db::fetch_managers(&pool).await?;
            let listed: Vec<&models::Manager> = match sector {
                Some(sector) => roster::in_sector(&managers, sector),
                None => managers.iter().collect(),
            };
            for manager in listed {
                let sectors: Vec<&str> = manager.sectors.iter().map(|s| s.as_str()).collect();
                println!(
                    "- {} {} [{}]{}",
                    manager.id,
                    manager.name,
                    sectors.join(", "),
                    if manager.active { "" } else { " (inactive)" }
                );
            }
        }
    }

    Ok(())
}
