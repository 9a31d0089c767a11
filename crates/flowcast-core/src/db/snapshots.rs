//! [`SnapshotStore`] over the `consolidation_snapshots` table.
//!
//! # Upsert
//!
//! Each write runs in a `BEGIN IMMEDIATE` transaction: an existence check
//! followed by `INSERT … ON CONFLICT(entity_id, entity_kind,
//! consolidation_date) DO UPDATE`. The primary key enforces one row per
//! entity per date no matter how many workers write concurrently;
//! `created_at_us` survives updates.

use chrono::Utc;
use rusqlite::{
    Connection, OptionalExtension, Row, Transaction, TransactionBehavior, named_params, params,
};

use super::{format_date, parse_date};
use crate::calendar::DateRange;
use crate::error::StoreError;
use crate::model::{
    ConsolidationSnapshot, EntityKind, EntityRef, ForecastFigures, LeadTimeFigures,
    PressureFigures, RollupMarkers, ScopeFigures, SnapshotKey, StoredSnapshot, ThroughputFigures,
};
use crate::store::{SnapshotStore, UpsertOutcome};

const SELECT_COLUMNS: &str = "SELECT * FROM consolidation_snapshots";

const UPSERT_SQL: &str = "
INSERT INTO consolidation_snapshots (
    entity_id, entity_kind, consolidation_date,
    remaining_scope, current_wip, wip_limit,
    demands_count, delivered_count, discarded_count,
    effort_delivered_upstream, effort_delivered_downstream,
    lead_time_sample_size, lead_time_min, lead_time_max,
    lead_time_p25, lead_time_p75, lead_time_p80,
    lead_time_average, lead_time_std_dev,
    lead_time_histogram_bin_min, lead_time_histogram_bin_max, lead_time_histogram_counts,
    throughput_weekly, project_throughput,
    forecast_known, monte_carlo_trials,
    monte_carlo_weeks_min, monte_carlo_weeks_max, monte_carlo_weeks_mean,
    monte_carlo_weeks_std_dev, monte_carlo_weeks_p80,
    weeks_to_deadline, odds_to_deadline, operational_risk,
    flow_pressure, relative_flow_pressure,
    last_data_in_week, last_data_in_month, last_data_in_year,
    created_at_us, updated_at_us
) VALUES (
    :entity_id, :entity_kind, :consolidation_date,
    :remaining_scope, :current_wip, :wip_limit,
    :demands_count, :delivered_count, :discarded_count,
    :effort_delivered_upstream, :effort_delivered_downstream,
    :lead_time_sample_size, :lead_time_min, :lead_time_max,
    :lead_time_p25, :lead_time_p75, :lead_time_p80,
    :lead_time_average, :lead_time_std_dev,
    :lead_time_histogram_bin_min, :lead_time_histogram_bin_max, :lead_time_histogram_counts,
    :throughput_weekly, :project_throughput,
    :forecast_known, :monte_carlo_trials,
    :monte_carlo_weeks_min, :monte_carlo_weeks_max, :monte_carlo_weeks_mean,
    :monte_carlo_weeks_std_dev, :monte_carlo_weeks_p80,
    :weeks_to_deadline, :odds_to_deadline, :operational_risk,
    :flow_pressure, :relative_flow_pressure,
    :last_data_in_week, :last_data_in_month, :last_data_in_year,
    :now_us, :now_us
)
ON CONFLICT(entity_id, entity_kind, consolidation_date) DO UPDATE SET
    remaining_scope = excluded.remaining_scope,
    current_wip = excluded.current_wip,
    wip_limit = excluded.wip_limit,
    demands_count = excluded.demands_count,
    delivered_count = excluded.delivered_count,
    discarded_count = excluded.discarded_count,
    effort_delivered_upstream = excluded.effort_delivered_upstream,
    effort_delivered_downstream = excluded.effort_delivered_downstream,
    lead_time_sample_size = excluded.lead_time_sample_size,
    lead_time_min = excluded.lead_time_min,
    lead_time_max = excluded.lead_time_max,
    lead_time_p25 = excluded.lead_time_p25,
    lead_time_p75 = excluded.lead_time_p75,
    lead_time_p80 = excluded.lead_time_p80,
    lead_time_average = excluded.lead_time_average,
    lead_time_std_dev = excluded.lead_time_std_dev,
    lead_time_histogram_bin_min = excluded.lead_time_histogram_bin_min,
    lead_time_histogram_bin_max = excluded.lead_time_histogram_bin_max,
    lead_time_histogram_counts = excluded.lead_time_histogram_counts,
    throughput_weekly = excluded.throughput_weekly,
    project_throughput = excluded.project_throughput,
    forecast_known = excluded.forecast_known,
    monte_carlo_trials = excluded.monte_carlo_trials,
    monte_carlo_weeks_min = excluded.monte_carlo_weeks_min,
    monte_carlo_weeks_max = excluded.monte_carlo_weeks_max,
    monte_carlo_weeks_mean = excluded.monte_carlo_weeks_mean,
    monte_carlo_weeks_std_dev = excluded.monte_carlo_weeks_std_dev,
    monte_carlo_weeks_p80 = excluded.monte_carlo_weeks_p80,
    weeks_to_deadline = excluded.weeks_to_deadline,
    odds_to_deadline = excluded.odds_to_deadline,
    operational_risk = excluded.operational_risk,
    flow_pressure = excluded.flow_pressure,
    relative_flow_pressure = excluded.relative_flow_pressure,
    last_data_in_week = excluded.last_data_in_week,
    last_data_in_month = excluded.last_data_in_month,
    last_data_in_year = excluded.last_data_in_year,
    updated_at_us = MAX(excluded.updated_at_us, consolidation_snapshots.created_at_us)
";

/// Snapshot store backed by a borrowed connection.
pub struct SqliteSnapshotStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSnapshotStore<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn write(tx: &Transaction<'_>, snapshot: &ConsolidationSnapshot) -> Result<(), StoreError> {
        let key = &snapshot.key;
        let scope = &snapshot.scope;
        let lead = &snapshot.lead_time;
        let forecast = &snapshot.forecast;
        let histogram = serde_json::to_string(&lead.histogram_counts)?;
        let weekly = serde_json::to_string(&snapshot.throughput.weekly)?;

        tx.execute(
            UPSERT_SQL,
            named_params! {
                ":entity_id": key.entity.id,
                ":entity_kind": key.entity.kind.as_str(),
                ":consolidation_date": format_date(key.consolidation_date),
                ":remaining_scope": scope.remaining_scope,
                ":current_wip": scope.current_wip,
                ":wip_limit": scope.wip_limit,
                ":demands_count": scope.demands_count,
                ":delivered_count": scope.delivered_count,
                ":discarded_count": scope.discarded_count,
                ":effort_delivered_upstream": scope.effort_delivered_upstream,
                ":effort_delivered_downstream": scope.effort_delivered_downstream,
                ":lead_time_sample_size": lead.sample_size,
                ":lead_time_min": lead.min,
                ":lead_time_max": lead.max,
                ":lead_time_p25": lead.p25,
                ":lead_time_p75": lead.p75,
                ":lead_time_p80": lead.p80,
                ":lead_time_average": lead.average,
                ":lead_time_std_dev": lead.std_dev,
                ":lead_time_histogram_bin_min": lead.histogram_bin_min,
                ":lead_time_histogram_bin_max": lead.histogram_bin_max,
                ":lead_time_histogram_counts": histogram,
                ":throughput_weekly": weekly,
                ":project_throughput": snapshot.throughput.project_throughput,
                ":forecast_known": forecast.forecast_known,
                ":monte_carlo_trials": forecast.trials,
                ":monte_carlo_weeks_min": forecast.monte_carlo_weeks_min,
                ":monte_carlo_weeks_max": forecast.monte_carlo_weeks_max,
                ":monte_carlo_weeks_mean": forecast.monte_carlo_weeks_mean,
                ":monte_carlo_weeks_std_dev": forecast.monte_carlo_weeks_std_dev,
                ":monte_carlo_weeks_p80": forecast.monte_carlo_weeks_p80,
                ":weeks_to_deadline": forecast.weeks_to_deadline,
                ":odds_to_deadline": forecast.odds_to_deadline,
                ":operational_risk": forecast.operational_risk,
                ":flow_pressure": snapshot.pressure.flow_pressure,
                ":relative_flow_pressure": snapshot.pressure.relative_flow_pressure,
                ":last_data_in_week": snapshot.rollup.last_data_in_week,
                ":last_data_in_month": snapshot.rollup.last_data_in_month,
                ":last_data_in_year": snapshot.rollup.last_data_in_year,
                ":now_us": Utc::now().timestamp_micros(),
            },
        )?;
        Ok(())
    }
}

/// Raw row, decoded into domain types outside the rusqlite closure so that
/// JSON and date failures surface as [`StoreError`].
struct SnapshotRow {
    entity_id: String,
    entity_kind: String,
    consolidation_date: String,
    scope: ScopeFigures,
    lead_time: LeadTimeFigures,
    histogram_counts: String,
    throughput_weekly: String,
    project_throughput: u32,
    forecast: ForecastFigures,
    pressure: PressureFigures,
    rollup: RollupMarkers,
    created_at_us: i64,
    updated_at_us: i64,
}

impl SnapshotRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entity_id: row.get("entity_id")?,
            entity_kind: row.get("entity_kind")?,
            consolidation_date: row.get("consolidation_date")?,
            scope: ScopeFigures {
                remaining_scope: row.get("remaining_scope")?,
                current_wip: row.get("current_wip")?,
                wip_limit: row.get("wip_limit")?,
                demands_count: row.get("demands_count")?,
                delivered_count: row.get("delivered_count")?,
                discarded_count: row.get("discarded_count")?,
                effort_delivered_upstream: row.get("effort_delivered_upstream")?,
                effort_delivered_downstream: row.get("effort_delivered_downstream")?,
            },
            lead_time: LeadTimeFigures {
                sample_size: row.get("lead_time_sample_size")?,
                min: row.get("lead_time_min")?,
                max: row.get("lead_time_max")?,
                p25: row.get("lead_time_p25")?,
                p75: row.get("lead_time_p75")?,
                p80: row.get("lead_time_p80")?,
                average: row.get("lead_time_average")?,
                std_dev: row.get("lead_time_std_dev")?,
                histogram_bin_min: row.get("lead_time_histogram_bin_min")?,
                histogram_bin_max: row.get("lead_time_histogram_bin_max")?,
                histogram_counts: Vec::new(),
            },
            histogram_counts: row.get("lead_time_histogram_counts")?,
            throughput_weekly: row.get("throughput_weekly")?,
            project_throughput: row.get("project_throughput")?,
            forecast: ForecastFigures {
                forecast_known: row.get("forecast_known")?,
                trials: row.get("monte_carlo_trials")?,
                monte_carlo_weeks_min: row.get("monte_carlo_weeks_min")?,
                monte_carlo_weeks_max: row.get("monte_carlo_weeks_max")?,
                monte_carlo_weeks_mean: row.get("monte_carlo_weeks_mean")?,
                monte_carlo_weeks_std_dev: row.get("monte_carlo_weeks_std_dev")?,
                monte_carlo_weeks_p80: row.get("monte_carlo_weeks_p80")?,
                weeks_to_deadline: row.get("weeks_to_deadline")?,
                odds_to_deadline: row.get("odds_to_deadline")?,
                operational_risk: row.get("operational_risk")?,
            },
            pressure: PressureFigures {
                flow_pressure: row.get("flow_pressure")?,
                relative_flow_pressure: row.get("relative_flow_pressure")?,
            },
            rollup: RollupMarkers {
                last_data_in_week: row.get("last_data_in_week")?,
                last_data_in_month: row.get("last_data_in_month")?,
                last_data_in_year: row.get("last_data_in_year")?,
            },
            created_at_us: row.get("created_at_us")?,
            updated_at_us: row.get("updated_at_us")?,
        })
    }

    fn decode(self) -> Result<StoredSnapshot, StoreError> {
        let kind = self
            .entity_kind
            .parse::<EntityKind>()
            .map_err(|err| StoreError::Malformed(err.to_string()))?;
        let date = parse_date(&self.consolidation_date).ok_or_else(|| {
            StoreError::Malformed(format!("bad consolidation_date '{}'", self.consolidation_date))
        })?;

        let mut lead_time = self.lead_time;
        lead_time.histogram_counts = serde_json::from_str(&self.histogram_counts)?;

        Ok(StoredSnapshot {
            snapshot: ConsolidationSnapshot {
                key: SnapshotKey::new(EntityRef::new(kind, self.entity_id), date),
                scope: self.scope,
                lead_time,
                throughput: ThroughputFigures {
                    weekly: serde_json::from_str(&self.throughput_weekly)?,
                    project_throughput: self.project_throughput,
                },
                forecast: self.forecast,
                pressure: self.pressure,
                rollup: self.rollup,
            },
            created_at_us: self.created_at_us,
            updated_at_us: self.updated_at_us,
        })
    }
}

impl SnapshotStore for SqliteSnapshotStore<'_> {
    fn upsert(&self, snapshot: &ConsolidationSnapshot) -> Result<UpsertOutcome, StoreError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let existed: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM consolidation_snapshots \
             WHERE entity_id = ?1 AND entity_kind = ?2 AND consolidation_date = ?3)",
            params![
                snapshot.key.entity.id,
                snapshot.key.entity.kind.as_str(),
                format_date(snapshot.key.consolidation_date),
            ],
            |row| row.get(0),
        )?;

        Self::write(&tx, snapshot)?;
        tx.commit()?;

        let outcome = if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        };
        tracing::debug!(key = %snapshot.key, ?outcome, "upserted consolidation snapshot");
        Ok(outcome)
    }

    fn get(&self, key: &SnapshotKey) -> Result<Option<StoredSnapshot>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "{SELECT_COLUMNS} WHERE entity_id = ?1 AND entity_kind = ?2 \
                     AND consolidation_date = ?3"
                ),
                params![
                    key.entity.id,
                    key.entity.kind.as_str(),
                    format_date(key.consolidation_date)
                ],
                SnapshotRow::from_row,
            )
            .optional()?;

        row.map(SnapshotRow::decode).transpose()
    }

    fn list(
        &self,
        entity: &EntityRef,
        range: Option<DateRange>,
    ) -> Result<Vec<StoredSnapshot>, StoreError> {
        let (from, to) = range.map_or_else(
            || ("0000-01-01".to_string(), "9999-12-31".to_string()),
            |r| (format_date(r.start()), format_date(r.end())),
        );

        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE entity_id = ?1 AND entity_kind = ?2 \
             AND consolidation_date BETWEEN ?3 AND ?4 \
             ORDER BY consolidation_date"
        ))?;
        let rows = stmt.query_map(
            params![entity.id, entity.kind.as_str(), from, to],
            SnapshotRow::from_row,
        )?;

        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?.decode()?);
        }
        Ok(snapshots)
    }

    fn count(&self, entity: &EntityRef) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM consolidation_snapshots WHERE entity_id = ?1 AND entity_kind = ?2",
            params![entity.id, entity.kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }
}
