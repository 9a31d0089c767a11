//! Consolidation snapshot builder.
//!
//! One run takes an `(entity, date)` pair from *absent* (or stale) to
//! *persisted*: read the corpus, compute every figure in memory, then upsert a
//! single row. Nothing is written until the whole snapshot exists, so a failed
//! run leaves the previous row (if any) untouched.
//!
//! Each run recomputes from the full corpus. The Monte-Carlo seed is derived
//! from the snapshot key, so reruns over an unchanged corpus reproduce the
//! same field values.

use chrono::NaiveDate;
use flowcast_core::calendar::{DateRange, day_cutoff, rollup_markers, weeks_until};
use flowcast_core::config::ProjectConfig;
use flowcast_core::corpus::{DemandCorpusReader, remaining_scope_of};
use flowcast_core::error::CorpusError;
use flowcast_core::model::{
    ConsolidationSnapshot, DemandView, EntityProfile, EntityRef, ForecastFigures, PressureFigures,
    ScopeFigures, SnapshotKey, ThroughputFigures,
};
use flowcast_core::store::{SnapshotStore, UpsertOutcome};
use flowcast_stats::forecast::{DEFAULT_TRIALS, Forecaster, odds_to_deadline};
use flowcast_stats::lead_time::LeadTimeStats;
use flowcast_stats::score::{
    current_wip, flow_pressure, operational_risk, relative_flow_pressure,
};
use flowcast_stats::throughput::{
    ThroughputWindow, WeeklyCount, counts, total, weekly_throughput,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::instrument;

use crate::error::ConsolidationError;

/// Numeric knobs of a run, usually taken from the project config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderSettings {
    pub trials: u32,
    pub histogram_bins: u32,
    /// Weeks in the snapshot's rolling throughput array.
    pub window_weeks: u32,
    /// Trailing weeks resampled by the forecaster; `0` = all history.
    pub population_weeks: u32,
    pub seed: Option<u64>,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self::from(&ProjectConfig::default())
    }
}

impl From<&ProjectConfig> for BuilderSettings {
    fn from(config: &ProjectConfig) -> Self {
        Self {
            trials: if config.forecast.trials == 0 {
                DEFAULT_TRIALS
            } else {
                config.forecast.trials
            },
            histogram_bins: config.histogram.bins,
            window_weeks: config.throughput.window_weeks,
            population_weeks: config.throughput.population_weeks,
            seed: config.forecast.seed,
        }
    }
}

/// Result of one successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub snapshot: ConsolidationSnapshot,
    pub outcome: UpsertOutcome,
}

/// Computes and persists consolidation snapshots.
///
/// Collaborators are injected: the corpus is read-only, the store receives
/// exactly one upsert per run, and the forecaster can be replaced by a stub.
pub struct SnapshotBuilder<'a> {
    corpus: &'a dyn DemandCorpusReader,
    store: &'a dyn SnapshotStore,
    forecaster: &'a dyn Forecaster,
    settings: BuilderSettings,
}

impl<'a> SnapshotBuilder<'a> {
    #[must_use]
    pub fn new(
        corpus: &'a dyn DemandCorpusReader,
        store: &'a dyn SnapshotStore,
        forecaster: &'a dyn Forecaster,
        settings: BuilderSettings,
    ) -> Self {
        Self {
            corpus,
            store,
            forecaster,
            settings,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    /// Compute the snapshot for `entity` at the end of `as_of` and upsert it.
    ///
    /// Idempotent: a second call with an unchanged corpus rewrites the same
    /// row with the same values.
    ///
    /// # Errors
    ///
    /// [`ConsolidationError`] when the corpus cannot be read or the row cannot
    /// be written.
    ///
    /// # Panics
    ///
    /// If the computed snapshot contains a non-finite figure or an
    /// out-of-range probability, which would be a bug in the builder.
    #[instrument(skip_all, fields(entity = %entity, date = %as_of))]
    pub fn run_consolidation(
        &self,
        entity: &EntityRef,
        as_of: NaiveDate,
    ) -> Result<ConsolidationReport, ConsolidationError> {
        let snapshot = self.compute(entity, as_of)?;
        assert!(
            snapshot.is_well_formed(),
            "builder produced an ill-formed snapshot for {}",
            snapshot.key
        );

        let outcome = self
            .store
            .upsert(&snapshot)
            .map_err(|source| ConsolidationError::Store {
                key: snapshot.key.clone(),
                source,
            })?;

        tracing::info!(
            ?outcome,
            remaining_scope = snapshot.scope.remaining_scope,
            wip = snapshot.scope.current_wip,
            p80_weeks = snapshot.forecast.monte_carlo_weeks_p80,
            odds = snapshot.forecast.odds_to_deadline,
            risk = snapshot.forecast.operational_risk,
            "consolidated snapshot"
        );
        Ok(ConsolidationReport { snapshot, outcome })
    }

    /// Run [`Self::run_consolidation`] for every date of `range`, oldest
    /// first. Stops at the first failure; dates already written stay written
    /// and a rerun is safe.
    ///
    /// # Errors
    ///
    /// The first [`ConsolidationError`] encountered.
    ///
    /// # Panics
    ///
    /// If the same snapshot key is produced twice within the run.
    #[instrument(skip_all, fields(entity = %entity, start = %range.start(), end = %range.end()))]
    pub fn run_consolidation_backfill(
        &self,
        entity: &EntityRef,
        range: DateRange,
    ) -> Result<Vec<ConsolidationReport>, ConsolidationError> {
        let mut written = BTreeSet::new();
        let mut reports = Vec::with_capacity(range.len());

        for date in range.days() {
            let report = self.run_consolidation(entity, date)?;
            assert!(
                written.insert(report.snapshot.key.clone()),
                "snapshot {} persisted twice in one backfill",
                report.snapshot.key
            );
            reports.push(report);
        }

        tracing::info!(days = reports.len(), "backfill complete");
        Ok(reports)
    }

    /// Compute the snapshot without writing it.
    ///
    /// # Errors
    ///
    /// [`ConsolidationError::Corpus`] when the corpus cannot be read.
    pub fn compute(
        &self,
        entity: &EntityRef,
        as_of: NaiveDate,
    ) -> Result<ConsolidationSnapshot, ConsolidationError> {
        let profile = self
            .corpus
            .entity_profile(entity)
            .map_err(ConsolidationError::corpus(entity))?;
        let demands = self
            .corpus
            .demands_for(entity, as_of)
            .map_err(ConsolidationError::corpus(entity))?;

        let scope = scope_figures(&profile, &demands, as_of);

        let lead_times: Vec<i64> = {
            let cutoff = day_cutoff(as_of);
            demands
                .iter()
                .filter(|demand| demand.is_finished_by(cutoff))
                .filter_map(DemandView::lead_time_seconds)
                .collect()
        };
        let lead_time =
            LeadTimeStats::from_seconds(&lead_times, self.settings.histogram_bins as usize)
                .into_figures();

        let window = weekly_throughput(
            &demands,
            as_of,
            ThroughputWindow::Trailing(self.settings.window_weeks),
        );
        let population = weekly_throughput(
            &demands,
            as_of,
            ThroughputWindow::from_weeks(self.settings.population_weeks),
        );
        let throughput = ThroughputFigures {
            weekly: counts(&window),
            project_throughput: total(&window),
        };

        let forecast = self.forecast(entity, as_of, &profile, &population, &scope);
        let pressure = self.pressure(entity, as_of, &profile, scope.remaining_scope)?;

        tracing::debug!(
            demands = demands.len(),
            lead_time_samples = lead_times.len(),
            population_weeks = population.len(),
            known = forecast.forecast_known,
            "computed snapshot figures"
        );

        Ok(ConsolidationSnapshot {
            key: SnapshotKey::new(entity.clone(), as_of),
            scope,
            lead_time,
            throughput,
            forecast,
            pressure,
            rollup: rollup_markers(as_of),
        })
    }

    fn forecast(
        &self,
        entity: &EntityRef,
        as_of: NaiveDate,
        profile: &EntityProfile,
        population: &[WeeklyCount],
        scope: &ScopeFigures,
    ) -> ForecastFigures {
        let seed = derive_seed(entity, as_of, self.settings.seed);
        let distribution = self.forecaster.simulate(
            &counts(population),
            scope.remaining_scope,
            self.settings.trials,
            seed,
        );

        let weeks_to_deadline = profile
            .end_date
            .map(|deadline| weeks_until(as_of, deadline));
        let odds = odds_to_deadline(&distribution, weeks_to_deadline);
        if distribution.is_saturated() {
            tracing::warn!(
                entity = %entity,
                unfinished = distribution.unfinished(),
                trials = distribution.trials(),
                "forecast saturated at the week cap"
            );
        }

        ForecastFigures {
            forecast_known: distribution.is_known(),
            trials: distribution.trials(),
            monte_carlo_weeks_min: distribution.min(),
            monte_carlo_weeks_max: distribution.max(),
            monte_carlo_weeks_mean: distribution.mean(),
            monte_carlo_weeks_std_dev: distribution.std_dev(),
            monte_carlo_weeks_p80: distribution.p80(),
            weeks_to_deadline,
            odds_to_deadline: odds,
            operational_risk: operational_risk(odds, scope.demands_count),
        }
    }

    fn pressure(
        &self,
        entity: &EntityRef,
        as_of: NaiveDate,
        profile: &EntityProfile,
        remaining_scope: u32,
    ) -> Result<PressureFigures, ConsolidationError> {
        let remaining_days = profile.end_date.map(|deadline| (deadline - as_of).num_days());
        let own = flow_pressure(remaining_scope, remaining_days);

        let peers = self
            .corpus
            .peers(entity, as_of)
            .map_err(ConsolidationError::corpus(entity))?;

        let mut total_pressure = 0.0;
        for peer in &peers {
            if peer == entity {
                total_pressure += own;
                continue;
            }
            match self.peer_pressure(peer, as_of) {
                Ok(pressure) => total_pressure += pressure,
                Err(err) => tracing::warn!(
                    peer = %peer,
                    error = %err,
                    "skipping peer with unreadable corpus data"
                ),
            }
        }
        if !peers.contains(entity) {
            total_pressure += own;
        }

        Ok(PressureFigures {
            flow_pressure: own,
            relative_flow_pressure: relative_flow_pressure(own, total_pressure),
        })
    }

    fn peer_pressure(&self, peer: &EntityRef, as_of: NaiveDate) -> Result<f64, CorpusError> {
        let scope = self.corpus.remaining_scope(peer, as_of)?;
        let days = self.corpus.remaining_days(peer, as_of)?;
        Ok(flow_pressure(scope, days))
    }
}

fn scope_figures(profile: &EntityProfile, demands: &[DemandView], as_of: NaiveDate) -> ScopeFigures {
    let cutoff = day_cutoff(as_of);
    let to_u32 = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);

    let delivered: Vec<&DemandView> = demands
        .iter()
        .filter(|demand| demand.is_finished_by(cutoff))
        .collect();

    ScopeFigures {
        remaining_scope: remaining_scope_of(profile, demands, as_of),
        current_wip: current_wip(demands, as_of),
        wip_limit: profile.wip_limit,
        demands_count: to_u32(demands.iter().filter(|d| d.is_in_scope_at(cutoff)).count()),
        delivered_count: to_u32(delivered.len()),
        discarded_count: to_u32(demands.iter().filter(|d| d.is_discarded_by(cutoff)).count()),
        effort_delivered_upstream: effort_total(delivered.iter().map(|d| d.effort_upstream)),
        effort_delivered_downstream: effort_total(delivered.iter().map(|d| d.effort_downstream)),
    }
}

/// Sum of the finite effort values, saturating at the `f64` range.
fn effort_total(values: impl Iterator<Item = f64>) -> f64 {
    values
        .filter(|value| value.is_finite())
        .fold(0.0, |total, value| (total + value).clamp(f64::MIN, f64::MAX))
}

/// Per-snapshot simulation seed: a BLAKE3 digest of the snapshot key and the
/// configured salt, truncated to 64 bits.
#[must_use]
pub fn derive_seed(entity: &EntityRef, as_of: NaiveDate, salt: Option<u64>) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(entity.kind.as_str().as_bytes());
    hasher.update(b"\x00");
    hasher.update(entity.id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(as_of.to_string().as_bytes());
    hasher.update(b"\x00");
    hasher.update(&salt.unwrap_or(0).to_le_bytes());

    let digest = hasher.finalize();
    let mut head = [0_u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use flowcast_core::corpus::MemoryCorpus;
    use flowcast_core::store::MemorySnapshotStore;
    use flowcast_stats::forecast::{MonteCarloForecaster, WeeksDistribution};

    /// Always answers with the same trial outcomes.
    struct FixedForecaster(Vec<u32>);

    impl Forecaster for FixedForecaster {
        fn simulate(&self, _: &[u32], remaining_scope: u32, trials: u32, _: u64) -> WeeksDistribution {
            if remaining_scope == 0 {
                return WeeksDistribution::done(trials);
            }
            WeeksDistribution::from_trials(self.0.clone())
        }
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).expect("valid date")
    }

    fn at(m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, m, d, 10, 0, 0).single().expect("valid timestamp")
    }

    fn profile(deadline: Option<NaiveDate>, peer_group: Option<&str>) -> EntityProfile {
        EntityProfile {
            start_date: date(1, 1),
            end_date: deadline,
            initial_scope: 0,
            wip_limit: 3,
            peer_group: peer_group.map(str::to_string),
        }
    }

    fn demand(id: &str, created: DateTime<Utc>) -> DemandView {
        DemandView::new(id, created)
    }

    fn seeded_corpus() -> (MemoryCorpus, EntityRef) {
        let entity = EntityRef::project("p-1");
        let mut corpus = MemoryCorpus::new();
        corpus.insert_entity(entity.clone(), profile(Some(date(3, 29)), None));

        for (i, (commit, finish)) in [((1, 3), (1, 10)), ((1, 8), (1, 12)), ((1, 15), (1, 24))]
            .into_iter()
            .enumerate()
        {
            let mut done = demand(&format!("done-{i}"), at(1, 2));
            done.commitment_at = Some(at(commit.0, commit.1));
            done.finished_at = Some(at(finish.0, finish.1));
            done.effort_downstream = 2.5;
            corpus.add_demand(&entity, done).expect("add demand");
        }

        let mut wip = demand("wip", at(1, 20));
        wip.commitment_at = Some(at(1, 22));
        corpus.add_demand(&entity, wip).expect("add demand");
        corpus.add_demand(&entity, demand("todo", at(1, 25))).expect("add demand");

        let mut dropped = demand("dropped", at(1, 5));
        dropped.discarded_at = Some(at(1, 6));
        corpus.add_demand(&entity, dropped).expect("add demand");

        (corpus, entity)
    }

    #[test]
    fn snapshot_reflects_the_corpus() {
        let (corpus, entity) = seeded_corpus();
        let store = MemorySnapshotStore::new();
        let forecaster = FixedForecaster(vec![2, 3, 4, 5, 30]);
        let builder = SnapshotBuilder::new(&corpus, &store, &forecaster, BuilderSettings::default());

        let report = builder.run_consolidation(&entity, date(2, 1)).expect("run");
        let snap = &report.snapshot;

        assert_eq!(report.outcome, UpsertOutcome::Created);
        assert_eq!(snap.scope.demands_count, 5);
        assert_eq!(snap.scope.delivered_count, 3);
        assert_eq!(snap.scope.discarded_count, 1);
        assert_eq!(snap.scope.remaining_scope, 2);
        assert_eq!(snap.scope.current_wip, 1);
        assert_eq!(snap.scope.wip_limit, 3);
        assert!((snap.scope.effort_delivered_downstream - 7.5).abs() < 1e-9);

        assert_eq!(snap.lead_time.sample_size, 3);
        assert!((snap.lead_time.min - 4.0 * 86_400.0).abs() < 1e-6);
        assert!((snap.lead_time.max - 9.0 * 86_400.0).abs() < 1e-6);

        assert_eq!(snap.throughput.weekly.len(), 8);
        assert_eq!(snap.throughput.project_throughput, 3);

        // 2024-02-01 to 2024-03-29 is 57 days: nine weeks, rounded up.
        assert_eq!(snap.forecast.weeks_to_deadline, Some(9));
        assert!((snap.forecast.odds_to_deadline - 0.8).abs() < 1e-9);
        assert!((snap.forecast.operational_risk - 0.2).abs() < 1e-9);
        assert!((snap.pressure.flow_pressure - 2.0 / 57.0).abs() < 1e-12);
        assert!((snap.pressure.relative_flow_pressure - 100.0).abs() < 1e-9);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn rerun_is_idempotent() {
        let (corpus, entity) = seeded_corpus();
        let store = MemorySnapshotStore::new();
        let forecaster = MonteCarloForecaster::default();
        let builder = SnapshotBuilder::new(&corpus, &store, &forecaster, BuilderSettings::default());

        let first = builder.run_consolidation(&entity, date(2, 1)).expect("first run");
        let second = builder.run_consolidation(&entity, date(2, 1)).expect("second run");

        assert_eq!(second.outcome, UpsertOutcome::Updated);
        assert_eq!(first.snapshot, second.snapshot);
        assert_eq!(store.count(&entity).expect("count"), 1);
    }

    #[test]
    fn zero_demand_entity_gets_fallbacks() {
        let entity = EntityRef::team("empty");
        let mut corpus = MemoryCorpus::new();
        corpus.insert_entity(entity.clone(), profile(Some(date(6, 30)), None));
        let store = MemorySnapshotStore::new();
        let forecaster = MonteCarloForecaster::default();
        let builder = SnapshotBuilder::new(&corpus, &store, &forecaster, BuilderSettings::default());

        let snap = builder
            .run_consolidation(&entity, date(3, 1))
            .expect("run")
            .snapshot;

        assert!(snap.is_well_formed());
        assert!((snap.forecast.operational_risk - 1.0).abs() < f64::EPSILON);
        assert!(snap.pressure.flow_pressure.abs() < f64::EPSILON);
        assert_eq!(snap.scope.current_wip, 0);
        assert_eq!(snap.lead_time.sample_size, 0);
        assert!(snap.forecast.forecast_known);
        assert!(snap.forecast.monte_carlo_weeks_p80.abs() < f64::EPSILON);
    }

    #[test]
    fn scope_beyond_the_week_cap_has_no_odds() {
        let entity = EntityRef::project("huge");
        let mut corpus = MemoryCorpus::new();
        let mut huge = profile(Some(date(6, 30)), None);
        huge.initial_scope = 100_000;
        corpus.insert_entity(entity.clone(), huge);
        let mut done = demand("only", at(1, 2));
        done.commitment_at = Some(at(1, 3));
        done.finished_at = Some(at(1, 8));
        corpus.add_demand(&entity, done).expect("add demand");
        let store = MemorySnapshotStore::new();
        let forecaster = MonteCarloForecaster::new(10, false);
        let builder = SnapshotBuilder::new(&corpus, &store, &forecaster, BuilderSettings::default());

        let snap = builder.compute(&entity, date(2, 1)).expect("compute");

        assert!(snap.forecast.forecast_known);
        assert!(snap.forecast.weeks_to_deadline > Some(10));
        assert!((snap.forecast.monte_carlo_weeks_p80 - 10.0).abs() < f64::EPSILON);
        assert!(snap.forecast.odds_to_deadline.abs() < f64::EPSILON);
        assert!((snap.forecast.operational_risk - 1.0).abs() < f64::EPSILON);
        assert!(snap.is_well_formed());
    }

    #[test]
    fn open_scope_without_history_is_unknown() {
        let entity = EntityRef::project("fresh");
        let mut corpus = MemoryCorpus::new();
        let mut fresh = profile(None, None);
        fresh.initial_scope = 12;
        corpus.insert_entity(entity.clone(), fresh);
        corpus.add_demand(&entity, demand("a", at(2, 1))).expect("add demand");
        let store = MemorySnapshotStore::new();
        let forecaster = MonteCarloForecaster::default();
        let builder = SnapshotBuilder::new(&corpus, &store, &forecaster, BuilderSettings::default());

        let snap = builder.compute(&entity, date(2, 5)).expect("compute");

        assert!(!snap.forecast.forecast_known);
        assert_eq!(snap.forecast.trials, 0);
        assert_eq!(snap.forecast.weeks_to_deadline, None);
        assert!(snap.forecast.odds_to_deadline.abs() < f64::EPSILON);
        assert!((snap.forecast.operational_risk - 1.0).abs() < f64::EPSILON);
        assert!(snap.pressure.flow_pressure.abs() < f64::EPSILON);
        assert!(store.is_empty());
    }

    #[test]
    fn deadline_today_puts_whole_scope_on_today() {
        let entity = EntityRef::project("due");
        let mut corpus = MemoryCorpus::new();
        let mut due = profile(Some(date(4, 10)), None);
        due.initial_scope = 6;
        corpus.insert_entity(entity.clone(), due);
        let store = MemorySnapshotStore::new();
        let forecaster = FixedForecaster(vec![1]);
        let builder = SnapshotBuilder::new(&corpus, &store, &forecaster, BuilderSettings::default());

        let snap = builder.compute(&entity, date(4, 10)).expect("compute");
        assert!((snap.pressure.flow_pressure - 6.0).abs() < f64::EPSILON);
        assert_eq!(snap.forecast.weeks_to_deadline, Some(0));
    }

    #[test]
    fn relative_pressure_splits_across_peers() {
        let a = EntityRef::team("a");
        let b = EntityRef::team("b");
        let mut corpus = MemoryCorpus::new();
        let mut heavy = profile(Some(date(1, 11)), Some("squad"));
        heavy.initial_scope = 30;
        let mut light = profile(Some(date(1, 11)), Some("squad"));
        light.initial_scope = 10;
        corpus.insert_entity(a.clone(), heavy);
        corpus.insert_entity(b.clone(), light);

        let store = MemorySnapshotStore::new();
        let forecaster = FixedForecaster(vec![1]);
        let builder = SnapshotBuilder::new(&corpus, &store, &forecaster, BuilderSettings::default());

        let snap = builder.compute(&a, date(1, 1)).expect("compute");
        assert!((snap.pressure.flow_pressure - 3.0).abs() < 1e-12);
        assert!((snap.pressure.relative_flow_pressure - 75.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_entity_is_a_typed_failure() {
        let corpus = MemoryCorpus::new();
        let store = MemorySnapshotStore::new();
        let forecaster = FixedForecaster(vec![1]);
        let builder = SnapshotBuilder::new(&corpus, &store, &forecaster, BuilderSettings::default());

        let err = builder
            .run_consolidation(&EntityRef::project("ghost"), date(1, 1))
            .expect_err("unknown entity");
        assert_eq!(err.code(), flowcast_core::error::ErrorCode::EntityNotFound);
        assert!(store.is_empty());
    }

    #[test]
    fn backfill_writes_one_row_per_day_in_order() {
        let (corpus, entity) = seeded_corpus();
        let store = MemorySnapshotStore::new();
        let forecaster = FixedForecaster(vec![3]);
        let builder = SnapshotBuilder::new(&corpus, &store, &forecaster, BuilderSettings::default());
        let range = DateRange::new(date(1, 25), date(2, 3)).expect("valid range");

        let reports = builder
            .run_consolidation_backfill(&entity, range)
            .expect("backfill");

        assert_eq!(reports.len(), 10);
        let dates: Vec<NaiveDate> = store
            .list(&entity, None)
            .expect("list")
            .into_iter()
            .map(|row| row.snapshot.key.consolidation_date)
            .collect();
        assert_eq!(dates, range.days().collect::<Vec<_>>());

        let again = builder
            .run_consolidation_backfill(&entity, range)
            .expect("second backfill");
        assert!(again.iter().all(|r| r.outcome == UpsertOutcome::Updated));
        assert_eq!(store.count(&entity).expect("count"), 10);
    }

    #[test]
    fn huge_effort_saturates_instead_of_overflowing() {
        let entity = EntityRef::project("p");
        let mut corpus = MemoryCorpus::new();
        corpus.insert_entity(entity.clone(), profile(None, None));
        for id in ["big-1", "big-2"] {
            let mut big = demand(id, at(1, 2));
            big.commitment_at = Some(at(1, 3));
            big.finished_at = Some(at(1, 8));
            big.effort_downstream = 1.7e308;
            big.effort_upstream = f64::NAN;
            corpus.add_demand(&entity, big).expect("add demand");
        }
        let store = MemorySnapshotStore::new();
        let forecaster = FixedForecaster(vec![1]);
        let builder = SnapshotBuilder::new(&corpus, &store, &forecaster, BuilderSettings::default());

        let snap = builder
            .run_consolidation(&entity, date(1, 10))
            .expect("run")
            .snapshot;

        assert!(snap.is_well_formed());
        assert!((snap.scope.effort_delivered_downstream - f64::MAX).abs() < f64::EPSILON);
        assert!(snap.scope.effort_delivered_upstream.abs() < f64::EPSILON);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn effort_total_skips_non_finite_and_clamps() {
        assert!((effort_total([1.5, 2.5].into_iter()) - 4.0).abs() < f64::EPSILON);
        assert!((effort_total([f64::INFINITY, 3.0].into_iter()) - 3.0).abs() < f64::EPSILON);
        let low = effort_total([-1.7e308, -1.7e308].into_iter());
        assert!((low - f64::MIN).abs() < f64::EPSILON);
    }

    /// Corpus whose profile lookups fail for one entity.
    struct FlakyPeerCorpus {
        inner: MemoryCorpus,
        broken: EntityRef,
    }

    impl DemandCorpusReader for FlakyPeerCorpus {
        fn entity_profile(&self, entity: &EntityRef) -> Result<EntityProfile, CorpusError> {
            if *entity == self.broken {
                return Err(CorpusError::Malformed(format!("bad row for {entity}")));
            }
            self.inner.entity_profile(entity)
        }

        fn demands_for(
            &self,
            entity: &EntityRef,
            as_of: NaiveDate,
        ) -> Result<Vec<DemandView>, CorpusError> {
            self.inner.demands_for(entity, as_of)
        }

        fn peers(&self, entity: &EntityRef, as_of: NaiveDate) -> Result<Vec<EntityRef>, CorpusError> {
            self.inner.peers(entity, as_of)
        }

        fn entities_active_on(&self, date: NaiveDate) -> Result<Vec<EntityRef>, CorpusError> {
            self.inner.entities_active_on(date)
        }
    }

    #[test]
    fn unreadable_peer_is_left_out_of_total_pressure() {
        let a = EntityRef::team("a");
        let b = EntityRef::team("b");
        let c = EntityRef::team("c");
        let mut inner = MemoryCorpus::new();
        for (entity, scope) in [(&a, 30), (&b, 10), (&c, 50)] {
            let mut squad = profile(Some(date(1, 11)), Some("squad"));
            squad.initial_scope = scope;
            inner.insert_entity(entity.clone(), squad);
        }
        let corpus = FlakyPeerCorpus {
            inner,
            broken: c.clone(),
        };

        let store = MemorySnapshotStore::new();
        let forecaster = FixedForecaster(vec![1]);
        let builder = SnapshotBuilder::new(&corpus, &store, &forecaster, BuilderSettings::default());

        let snap = builder.run_consolidation(&a, date(1, 1)).expect("run").snapshot;
        assert!((snap.pressure.relative_flow_pressure - 75.0).abs() < 1e-9);

        let err = builder
            .run_consolidation(&c, date(1, 1))
            .expect_err("own profile is unreadable");
        assert_eq!(err.entity(), &c);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn seed_depends_on_key_and_salt() {
        let p = EntityRef::project("p-1");
        let t = EntityRef::team("p-1");
        let d = date(5, 5);
        assert_eq!(derive_seed(&p, d, None), derive_seed(&p, d, None));
        assert_ne!(derive_seed(&p, d, None), derive_seed(&t, d, None));
        assert_ne!(derive_seed(&p, d, None), derive_seed(&p, date(5, 6), None));
        assert_ne!(derive_seed(&p, d, None), derive_seed(&p, d, Some(1)));
    }
}
