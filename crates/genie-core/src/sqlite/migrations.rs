#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "initial_run_history",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS run_records (
    label TEXT NOT NULL,
    run_id INTEGER NOT NULL,
    app TEXT NOT NULL,
    state TEXT NOT NULL,
    message TEXT,
    result_count INTEGER NOT NULL DEFAULT 0,
    created_at_unix INTEGER NOT NULL,
    finished_at_unix INTEGER,
    PRIMARY KEY (label, run_id)
);

CREATE INDEX IF NOT EXISTS idx_run_records_created
    ON run_records (created_at_unix DESC);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_run_records_created;
DROP TABLE IF EXISTS run_records;
"#,
};

const MIGRATION_0002: SqliteMigration = SqliteMigration {
    version: 2,
    name: "add_run_jobs",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS run_jobs (
    label TEXT NOT NULL,
    run_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    job_id TEXT NOT NULL,
    PRIMARY KEY (label, run_id, position)
);
"#,
    down_sql: r#"
DROP TABLE IF EXISTS run_jobs;
"#,
};

const MIGRATIONS: [SqliteMigration; 2] = [MIGRATION_0001, MIGRATION_0002];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
