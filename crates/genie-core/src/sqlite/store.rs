use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, params};

use crate::models::{CoreError, CoreErrorKind, JobId, RunId, RunRecord, RunState};
use crate::persistence::{MigrationStore, PersistenceResult, RunStore};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "genie_schema_migrations";

pub struct SqliteStore {
    database_path: PathBuf,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        if target_version > 0 && migration(target_version).is_none() {
            return Err(storage_error_text(
                "apply_migration",
                format!("migration version '{target_version}' is not defined"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(connection, defined_migration(version)?)?;
                }
            } else if target_version < current_version {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(connection, defined_migration(version)?)?;
                }
            }

            Ok(())
        })
    }
}

impl RunStore for SqliteStore {
    fn create_run(&self, run: &RunRecord) -> PersistenceResult<()> {
        self.with_connection("create_run", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            let inserted = transaction.execute(
                "
INSERT INTO run_records
    (label, run_id, app, state, message, result_count, created_at_unix, finished_at_unix)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT (label, run_id) DO NOTHING
",
                params![
                    run.label,
                    run_id_to_i64(run.run_id)?,
                    run.app,
                    run.state.as_str(),
                    run.message,
                    to_i64(run.result_count)?,
                    to_unix_seconds(run.created_at)?,
                    run.finished_at.map(to_unix_seconds).transpose()?,
                ],
            )?;

            if inserted > 0 {
                replace_jobs(&transaction, run)?;
            }
            transaction.commit()
        })
    }

    fn finish_run(&self, run: &RunRecord) -> PersistenceResult<()> {
        if !run.state.is_terminal() {
            return Err(storage_error_text(
                "finish_run",
                format!("run state '{}' is not terminal", run.state),
            ));
        }
        let finished_at = run.finished_at.unwrap_or_else(SystemTime::now);

        self.with_connection("finish_run", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            let updated = transaction.execute(
                "
INSERT INTO run_records
    (label, run_id, app, state, message, result_count, created_at_unix, finished_at_unix)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT (label, run_id) DO UPDATE SET
    app = excluded.app,
    state = excluded.state,
    message = excluded.message,
    result_count = excluded.result_count,
    finished_at_unix = excluded.finished_at_unix
WHERE run_records.finished_at_unix IS NULL
",
                params![
                    run.label,
                    run_id_to_i64(run.run_id)?,
                    run.app,
                    run.state.as_str(),
                    run.message,
                    to_i64(run.result_count)?,
                    to_unix_seconds(run.created_at)?,
                    to_unix_seconds(finished_at)?,
                ],
            )?;

            if updated > 0 {
                replace_jobs(&transaction, run)?;
            }
            transaction.commit()
        })
    }

    fn list_recent_runs(&self, limit: usize) -> PersistenceResult<Vec<RunRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.with_connection("list_recent_runs", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT label, run_id, app, state, message, result_count, created_at_unix, finished_at_unix
FROM run_records
ORDER BY created_at_unix DESC, run_id DESC
LIMIT ?1
",
            )?;
            let rows = statement.query_map(params![to_i64(limit)?], |row| {
                let run_id_raw: i64 = row.get(1)?;
                let state_raw: String = row.get(3)?;
                let result_count_raw: i64 = row.get(5)?;
                let created_at_unix: i64 = row.get(6)?;
                let finished_at_unix: Option<i64> = row.get(7)?;

                Ok(RunRecord {
                    label: row.get(0)?,
                    run_id: RunId(i64_to_u64(run_id_raw)?),
                    app: row.get(2)?,
                    state: parse_run_state(&state_raw)?,
                    job_ids: Vec::new(),
                    message: row.get(4)?,
                    result_count: i64_to_usize(result_count_raw)?,
                    created_at: from_unix_seconds(created_at_unix)?,
                    finished_at: finished_at_unix.map(from_unix_seconds).transpose()?,
                })
            })?;
            let mut records = rows.collect::<rusqlite::Result<Vec<_>>>()?;

            let mut jobs = connection.prepare(
                "
SELECT job_id FROM run_jobs
WHERE label = ?1 AND run_id = ?2
ORDER BY position
",
            )?;
            for record in &mut records {
                record.job_ids = jobs
                    .query_map(
                        params![record.label, run_id_to_i64(record.run_id)?],
                        |row| Ok(JobId(row.get(0)?)),
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
            }

            Ok(records)
        })
    }

    fn next_run_id(&self, label: &str) -> PersistenceResult<RunId> {
        self.with_connection("next_run_id", |connection| {
            ensure_schema_ready(connection)?;
            let max_id: Option<i64> = connection.query_row(
                "SELECT MAX(run_id) FROM run_records WHERE label = ?1",
                params![label],
                |row| row.get(0),
            )?;
            match max_id {
                Some(id) => Ok(RunId(i64_to_u64(id)?.saturating_add(1))),
                None => Ok(RunId(0)),
            }
        })
    }

    fn delete_all_runs(&self) -> PersistenceResult<()> {
        self.with_connection("delete_all_runs", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute_batch("DELETE FROM run_jobs; DELETE FROM run_records;")
        })
    }
}

fn replace_jobs(connection: &Connection, run: &RunRecord) -> rusqlite::Result<()> {
    let run_id = run_id_to_i64(run.run_id)?;
    connection.execute(
        "DELETE FROM run_jobs WHERE label = ?1 AND run_id = ?2",
        params![run.label, run_id],
    )?;

    let mut insert = connection.prepare(
        "INSERT INTO run_jobs (label, run_id, position, job_id) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (position, job_id) in run.job_ids.iter().enumerate() {
        insert.execute(params![run.label, run_id, to_i64(position)?, job_id.as_str()])?;
    }
    Ok(())
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    Connection::open(database_path)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version <= 0 {
        return Err(storage_error_sqlite(
            "database schema is not initialized; apply migrations before run history operations",
        ));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version)
        .ok_or_else(|| storage_error_sqlite(&format!("migration version '{version}' is not defined")))
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}

fn parse_run_state(raw: &str) -> rusqlite::Result<RunState> {
    raw.parse::<RunState>().map_err(|_| {
        storage_error_sqlite(&format!("unknown run state '{raw}' in sqlite record"))
    })
}

fn to_unix_seconds(value: SystemTime) -> rusqlite::Result<i64> {
    let duration = value.duration_since(UNIX_EPOCH).map_err(|error| {
        storage_error_sqlite(&format!("time before unix epoch is not supported: {error}"))
    })?;
    i64::try_from(duration.as_secs())
        .map_err(|_| storage_error_sqlite("unix timestamp seconds exceed i64 range"))
}

fn from_unix_seconds(value: i64) -> rusqlite::Result<SystemTime> {
    let seconds = u64::try_from(value)
        .map_err(|_| storage_error_sqlite("negative unix timestamps are not supported"))?;
    Ok(UNIX_EPOCH + Duration::from_secs(seconds))
}

fn run_id_to_i64(value: RunId) -> rusqlite::Result<i64> {
    i64::try_from(value.0).map_err(|_| storage_error_sqlite("run id exceeds i64 range"))
}

fn i64_to_u64(value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| storage_error_sqlite("negative run id in sqlite record"))
}

fn i64_to_usize(value: i64) -> rusqlite::Result<usize> {
    usize::try_from(value).map_err(|_| storage_error_sqlite("negative count in sqlite record"))
}

fn to_i64(value: usize) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|_| storage_error_sqlite("value exceeds i64 range"))
}
