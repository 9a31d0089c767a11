//! Canonical SQLite schema for flowcast.
//!
//! - `entities` holds planning attributes per `(entity_kind, entity_id)`
//! - `demands` holds lifecycle timestamps (UTC microseconds) and effort
//! - `demand_memberships` maps one demand onto every entity it counts for
//!   (its project, team, customer, contract)
//! - `consolidation_snapshots` is the engine's only output, one row per
//!   entity per date

/// Migration v1: demand corpus tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS entities (
    entity_kind TEXT NOT NULL CHECK (entity_kind IN ('project', 'team', 'customer', 'contract')),
    entity_id TEXT NOT NULL CHECK (length(trim(entity_id)) > 0),
    name TEXT,
    start_date TEXT NOT NULL,
    end_date TEXT,
    initial_scope INTEGER NOT NULL DEFAULT 0 CHECK (initial_scope >= 0),
    wip_limit INTEGER NOT NULL DEFAULT 0 CHECK (wip_limit >= 0),
    peer_group TEXT,
    PRIMARY KEY (entity_kind, entity_id),
    CHECK (end_date IS NULL OR end_date >= start_date)
);

CREATE TABLE IF NOT EXISTS demands (
    demand_id TEXT PRIMARY KEY CHECK (length(trim(demand_id)) > 0),
    created_at_us INTEGER NOT NULL,
    commitment_at_us INTEGER,
    finished_at_us INTEGER,
    discarded_at_us INTEGER,
    effort_upstream REAL NOT NULL DEFAULT 0,
    effort_downstream REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS demand_memberships (
    entity_kind TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    demand_id TEXT NOT NULL REFERENCES demands(demand_id) ON DELETE CASCADE,
    PRIMARY KEY (entity_kind, entity_id, demand_id),
    FOREIGN KEY (entity_kind, entity_id)
        REFERENCES entities(entity_kind, entity_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: snapshot table and read-path indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS consolidation_snapshots (
    entity_id TEXT NOT NULL,
    entity_kind TEXT NOT NULL CHECK (entity_kind IN ('project', 'team', 'customer', 'contract')),
    consolidation_date TEXT NOT NULL,

    remaining_scope INTEGER NOT NULL CHECK (remaining_scope >= 0),
    current_wip INTEGER NOT NULL CHECK (current_wip >= 0),
    wip_limit INTEGER NOT NULL CHECK (wip_limit >= 0),
    demands_count INTEGER NOT NULL,
    delivered_count INTEGER NOT NULL,
    discarded_count INTEGER NOT NULL,
    effort_delivered_upstream REAL NOT NULL,
    effort_delivered_downstream REAL NOT NULL,

    lead_time_sample_size INTEGER NOT NULL,
    lead_time_min REAL NOT NULL,
    lead_time_max REAL NOT NULL,
    lead_time_p25 REAL NOT NULL,
    lead_time_p75 REAL NOT NULL,
    lead_time_p80 REAL NOT NULL,
    lead_time_average REAL NOT NULL,
    lead_time_std_dev REAL NOT NULL,
    lead_time_histogram_bin_min REAL NOT NULL,
    lead_time_histogram_bin_max REAL NOT NULL,
    lead_time_histogram_counts TEXT NOT NULL DEFAULT '[]',

    throughput_weekly TEXT NOT NULL DEFAULT '[]',
    project_throughput INTEGER NOT NULL,

    forecast_known INTEGER NOT NULL CHECK (forecast_known IN (0, 1)),
    monte_carlo_trials INTEGER NOT NULL,
    monte_carlo_weeks_min REAL NOT NULL,
    monte_carlo_weeks_max REAL NOT NULL,
    monte_carlo_weeks_mean REAL NOT NULL,
    monte_carlo_weeks_std_dev REAL NOT NULL,
    monte_carlo_weeks_p80 REAL NOT NULL,
    weeks_to_deadline INTEGER,
    odds_to_deadline REAL NOT NULL CHECK (odds_to_deadline BETWEEN 0 AND 1),
    operational_risk REAL NOT NULL CHECK (operational_risk BETWEEN 0 AND 1),

    flow_pressure REAL NOT NULL,
    relative_flow_pressure REAL NOT NULL,

    last_data_in_week INTEGER NOT NULL CHECK (last_data_in_week IN (0, 1)),
    last_data_in_month INTEGER NOT NULL CHECK (last_data_in_month IN (0, 1)),
    last_data_in_year INTEGER NOT NULL CHECK (last_data_in_year IN (0, 1)),

    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    PRIMARY KEY (entity_id, entity_kind, consolidation_date)
);

CREATE INDEX IF NOT EXISTS idx_snapshots_entity_date
    ON consolidation_snapshots(entity_kind, entity_id, consolidation_date);

CREATE INDEX IF NOT EXISTS idx_demand_memberships_demand
    ON demand_memberships(demand_id);

CREATE INDEX IF NOT EXISTS idx_demands_created
    ON demands(created_at_us);

CREATE INDEX IF NOT EXISTS idx_entities_peer_group
    ON entities(entity_kind, peer_group);
";

/// Indexes expected after all migrations have run.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_snapshots_entity_date",
    "idx_demand_memberships_demand",
    "idx_demands_created",
    "idx_entities_peer_group",
];
