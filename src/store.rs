//! Scratch row store backed by a run-scoped DuckDB database
//!
//! One database file per run holds one table per dataset. Each loader
//! appends into its own staging table, which `TableWriter::finish` seals
//! into the dataset table with identical rows collapsed. Dataset tables are
//! queried read-only once both loads have finished. The file (and DuckDB's
//! spill directory) is removed when the store is dropped, whatever the
//! outcome of the run.
//!
//! Long statements run under a cancel watch that interrupts the connection,
//! so a cancelled run never waits for a query to complete.

use crate::cancel::{CancellationToken, Watchdog};
use crate::error::{KeydiffError, Result};
use crate::record::{RowRecord, StoredRow};
use duckdb::arrow::array::{Array, StringArray, StructArray};
use duckdb::types::Type;
use duckdb::{params, Connection, InterruptHandle};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Which input a dataset table was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetRole {
    Old,
    New,
}

impl DatasetRole {
    pub fn table_name(&self) -> &'static str {
        match self {
            DatasetRole::Old => "old_rows",
            DatasetRole::New => "new_rows",
        }
    }

    /// Table the loader appends into before the dataset is sealed
    pub fn staging_name(&self) -> &'static str {
        match self {
            DatasetRole::Old => "old_staging",
            DatasetRole::New => "new_staging",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DatasetRole::Old => "old",
            DatasetRole::New => "new",
        }
    }
}

impl fmt::Display for DatasetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Handle to a created dataset table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetTable {
    pub role: DatasetRole,
    pub name: String,
}

/// DuckDB tuning applied to every scratch store
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// DuckDB `memory_limit`, e.g. "4GB"
    pub memory_limit: String,
    /// Worker threads DuckDB may use; `None` lets it auto-detect
    pub threads: Option<usize>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            memory_limit: crate::DEFAULT_MEMORY_LIMIT.to_string(),
            threads: None,
        }
    }
}

/// Options for an anti-join query
#[derive(Debug, Clone, Copy)]
pub struct AntiJoinOptions {
    /// Capacity of the queue between the query thread and its consumer
    pub channel_capacity: usize,
    /// Number of key-hash partitions queried one after another
    pub partitions: usize,
}

impl Default for AntiJoinOptions {
    fn default() -> Self {
        Self {
            channel_capacity: crate::DEFAULT_CHANNEL_CAPACITY,
            partitions: 1,
        }
    }
}

/// Run-scoped DuckDB database holding the dataset tables
pub struct ScratchStore {
    path: PathBuf,
    spill_dir: PathBuf,
    connection: Mutex<Option<Connection>>,
    /// Serializes catalog changes coming from concurrent loaders
    ddl_lock: Mutex<()>,
}

impl ScratchStore {
    /// Create a fresh store named after `run_id` inside `dir`
    pub fn create(dir: &Path, run_id: &str, settings: &StoreSettings) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| KeydiffError::io(format!("creating scratch dir {}", dir.display()), e))?;

        let path = dir.join(format!("keydiff-{}.duckdb", run_id));
        if path.exists() {
            return Err(KeydiffError::io(
                format!("creating scratch store {}", path.display()),
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "scratch store already exists"),
            ));
        }
        let spill_dir = dir.join(format!("keydiff-{}.tmp", run_id));

        let connection = Connection::open(&path)
            .map_err(|e| KeydiffError::store(format!("opening {}", path.display()), e))?;

        let store = Self {
            path,
            spill_dir,
            connection: Mutex::new(Some(connection)),
            ddl_lock: Mutex::new(()),
        };
        store.configure(settings)?;

        log::debug!("Opened scratch store at {}", store.path.display());
        Ok(store)
    }

    fn configure(&self, settings: &StoreSettings) -> Result<()> {
        let mut sql = format!(
            "SET memory_limit='{}';\n\
             SET temp_directory='{}';\n\
             SET preserve_insertion_order=false;\n\
             SET enable_progress_bar=false;\n",
            quote_literal(&settings.memory_limit),
            quote_literal(&self.spill_dir.to_string_lossy()),
        );
        if let Some(threads) = settings.threads {
            sql.push_str(&format!("SET threads={};\n", threads));
        }

        let conn = self.connect()?;
        conn.execute_batch(&sql)
            .map_err(|e| KeydiffError::store("configuring scratch store", e))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open another connection to the same database for use on another thread
    pub fn connect(&self) -> Result<Connection> {
        let guard = lock(&self.connection);
        let conn = guard.as_ref().ok_or_else(|| {
            KeydiffError::io(
                "connecting to scratch store",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "store already closed"),
            )
        })?;
        conn.try_clone()
            .map_err(|e| KeydiffError::store("cloning scratch store connection", e))
    }

    /// Create the (empty) staging table for a dataset, replacing any
    /// previous one. Rows become queryable once the writer is finished.
    pub fn create_table(&self, role: DatasetRole) -> Result<DatasetTable> {
        let sql = format!(
            "CREATE OR REPLACE TABLE {} (key VARCHAR NOT NULL, fingerprint VARCHAR NOT NULL, row VARCHAR NOT NULL)",
            role.staging_name()
        );

        let conn = self.connect()?;
        {
            let _ddl = lock(&self.ddl_lock);
            conn.execute_batch(&sql)
                .map_err(|e| KeydiffError::store(format!("creating table {}", role.staging_name()), e))?;
        }

        Ok(DatasetTable {
            role,
            name: role.table_name().to_string(),
        })
    }

    /// Open a batch writer owning its own connection
    pub fn writer<'s>(&'s self, table: &DatasetTable) -> Result<TableWriter<'s>> {
        Ok(TableWriter {
            store: self,
            conn: self.connect()?,
            table: table.clone(),
            rows_written: 0,
        })
    }

    /// Rows of a sealed table, identical rows under one key counted once
    pub fn row_count(&self, table: &DatasetTable) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn
            .query_row(&format!("SELECT count(*) FROM {}", table.name), [], |row| row.get(0))
            .map_err(|e| KeydiffError::store(format!("counting rows of {}", table.name), e))?;
        Ok(count as u64)
    }

    /// Keys that appear with more than one distinct row content.
    ///
    /// Returns the number of such keys and the smallest one as an example.
    pub fn duplicate_conflicts(
        &self,
        table: &DatasetTable,
        cancel: &CancellationToken,
    ) -> Result<(u64, Option<String>)> {
        // Sealed tables hold one row per (key, fingerprint)
        let sql = format!(
            "SELECT count(*), min(key) FROM \
             (SELECT key FROM {} GROUP BY key HAVING count(*) > 1)",
            table.name
        );
        let conn = self.connect()?;
        let _watch = interrupt_on_cancel(&conn, cancel);
        let (count, example): (i64, Option<String>) = conn
            .query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| query_error(cancel, format!("checking duplicates in {}", table.name), e))?;
        Ok((count as u64, example))
    }

    /// Start streaming every row of `base` whose key is absent from `other`.
    ///
    /// Queries are validated here so a bad query fails the call itself; rows
    /// are then produced by a dedicated thread into a bounded queue, fetched
    /// from DuckDB one chunk at a time as the queue drains.
    pub fn anti_join(
        &self,
        base: &DatasetTable,
        other: &DatasetTable,
        options: AntiJoinOptions,
        cancel: &CancellationToken,
    ) -> Result<AntiJoinStream> {
        let queries = anti_join_queries(&base.name, &other.name, options.partitions.max(1));
        let conn = self.connect()?;
        for sql in &queries {
            conn.prepare(sql)
                .map_err(|e| KeydiffError::store(format!("preparing anti-join {} \\ {}", base.name, other.name), e))?;
        }

        let label = format!("{}\\{}", base.role, other.role);
        let (sender, receiver) = mpsc::sync_channel(options.channel_capacity.max(1));
        let interrupt = conn.interrupt_handle();
        let watch = interrupt_on_cancel(&conn, cancel);
        let cancel = cancel.clone();
        let producer = thread::Builder::new()
            .name(format!("keydiff-antijoin-{}", base.role))
            .spawn(move || produce_rows(conn, queries, sender, cancel))
            .map_err(|e| KeydiffError::io("spawning anti-join producer", e))?;

        log::debug!("Anti-join {} started", label);
        Ok(AntiJoinStream {
            label,
            receiver: Some(receiver),
            producer: Some(producer),
            interrupt,
            _watch: watch,
            done: false,
        })
    }
}

impl Drop for ScratchStore {
    fn drop(&mut self) {
        let conn = self
            .connection
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(conn) = conn {
            if let Err((_, e)) = conn.close() {
                log::warn!("Failed to close scratch store cleanly: {}", e);
            }
        }

        let wal = PathBuf::from(format!("{}.wal", self.path.display()));
        for file in [&self.path, &wal] {
            if file.exists() {
                if let Err(e) = fs::remove_file(file) {
                    log::warn!("Failed to remove scratch file {}: {}", file.display(), e);
                }
            }
        }
        if self.spill_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.spill_dir) {
                log::warn!("Failed to remove spill dir {}: {}", self.spill_dir.display(), e);
            }
        }
        log::debug!("Removed scratch store {}", self.path.display());
    }
}

/// Appends batches to one dataset table
pub struct TableWriter<'s> {
    store: &'s ScratchStore,
    conn: Connection,
    table: DatasetTable,
    rows_written: u64,
}

impl TableWriter<'_> {
    /// Insert a batch atomically: either every row is visible or none is
    pub fn insert_batch(&mut self, rows: &[StoredRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let context = format!("inserting into {}", self.table.name);

        let tx = self
            .conn
            .transaction()
            .map_err(|e| KeydiffError::store(context.clone(), e))?;
        {
            let mut appender = tx
                .appender(&self.table.name)
                .map_err(|e| KeydiffError::store(context.clone(), e))?;
            for row in rows {
                appender
                    .append_row(params![row.key, row.fingerprint, row.encoded])
                    .map_err(|e| KeydiffError::store(context.clone(), e))?;
            }
            appender
                .flush()
                .map_err(|e| KeydiffError::store(context.clone(), e))?;
        }
        tx.commit().map_err(|e| KeydiffError::store(context, e))?;

        self.rows_written += rows.len() as u64;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Seal the dataset: collapse identical rows under one key into the
    /// dataset table and drop the staging table.
    ///
    /// Anti-joins over sealed tables need no aggregate of their own.
    pub fn finish(self, cancel: &CancellationToken) -> Result<DatasetTable> {
        let sql = format!(
            "CREATE OR REPLACE TABLE {name} AS \
             SELECT key, fingerprint, any_value(row) AS row FROM {staging} GROUP BY key, fingerprint;\n\
             DROP TABLE {staging};",
            name = self.table.name,
            staging = self.table.role.staging_name(),
        );
        {
            let _ddl = lock(&self.store.ddl_lock);
            let _watch = interrupt_on_cancel(&self.conn, cancel);
            self.conn
                .execute_batch(&sql)
                .map_err(|e| query_error(cancel, format!("sealing {}", self.table.name), e))?;
        }
        Ok(self.table)
    }
}

/// Lazy, bounded sequence of anti-join rows.
///
/// Dropping the stream disconnects the queue, interrupts a query still
/// executing and joins the producer thread, so an abandoned query never
/// outlives its consumer.
pub struct AntiJoinStream {
    label: String,
    receiver: Option<Receiver<Result<RowRecord>>>,
    producer: Option<JoinHandle<()>>,
    interrupt: Arc<InterruptHandle>,
    _watch: Watchdog,
    done: bool,
}

impl AntiJoinStream {
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Iterator for AntiJoinStream {
    type Item = Result<RowRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.receiver.as_ref()?.recv() {
            Ok(Ok(record)) => Some(Ok(record)),
            Ok(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            // Producer finished and hung up
            Err(_) => {
                self.done = true;
                None
            }
        }
    }
}

impl Drop for AntiJoinStream {
    fn drop(&mut self) {
        drop(self.receiver.take());
        if let Some(producer) = self.producer.take() {
            // A producer blocked on the queue sees the disconnect; one
            // inside DuckDB only returns once interrupted
            while !producer.is_finished() {
                self.interrupt.interrupt();
                thread::sleep(Duration::from_millis(5));
            }
            if producer.join().is_err() {
                log::warn!("Anti-join producer {} panicked", self.label);
            }
        }
    }
}

fn produce_rows(
    conn: Connection,
    queries: Vec<String>,
    sender: SyncSender<Result<RowRecord>>,
    cancel: CancellationToken,
) {
    if let Err(e) = stream_queries(&conn, &queries, &sender, &cancel) {
        // Consumer may already be gone; nothing left to report to
        let _ = sender.send(Err(e));
    }
}

fn stream_queries(
    conn: &Connection,
    queries: &[String],
    sender: &SyncSender<Result<RowRecord>>,
    cancel: &CancellationToken,
) -> Result<()> {
    for sql in queries {
        cancel.check()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| query_error(cancel, "preparing anti-join", e))?;
        // Streaming execution. Chunks are pulled with `step`, which reports
        // fetch failures (an interrupt included) as errors.
        drop(
            stmt.stream_arrow([])
                .map_err(|e| query_error(cancel, "running anti-join", e))?,
        );

        while let Some(chunk) = stmt
            .step()
            .map_err(|e| query_error(cancel, "fetching anti-join rows", e))?
        {
            let keys = text_column(&chunk, 0)?;
            let encoded = text_column(&chunk, 1)?;
            for i in 0..chunk.len() {
                cancel.check()?;
                let record = StoredRow::decode(keys.value(i).to_string(), encoded.value(i))?;
                if sender.send(Ok(record)).is_err() {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

fn text_column(chunk: &StructArray, index: usize) -> Result<&StringArray> {
    let column = chunk.column(index);
    column.as_any().downcast_ref::<StringArray>().ok_or_else(|| {
        KeydiffError::store(
            "decoding anti-join rows",
            duckdb::Error::InvalidColumnType(index, format!("column {}", index), Type::from(column.data_type())),
        )
    })
}

/// Interrupt `conn` whenever `cancel` fires, for as long as the guard lives
fn interrupt_on_cancel(conn: &Connection, cancel: &CancellationToken) -> Watchdog {
    let interrupt = conn.interrupt_handle();
    cancel.on_cancel(move || interrupt.interrupt())
}

/// A statement failing after cancellation was interrupted, not broken
fn query_error(cancel: &CancellationToken, context: impl Into<String>, e: duckdb::Error) -> KeydiffError {
    if cancel.is_cancelled() {
        KeydiffError::Cancelled
    } else {
        KeydiffError::store(context, e)
    }
}

/// Query templates for `base \ other`, one per key-hash partition
pub fn anti_join_queries(base: &str, other: &str, partitions: usize) -> Vec<String> {
    (0..partitions)
        .map(|i| {
            let partition = if partitions > 1 {
                format!(" AND hash(base.key) % {} = {}", partitions, i)
            } else {
                String::new()
            };
            format!(
                "SELECT base.key, base.row \
                 FROM {base} AS base \
                 WHERE NOT EXISTS (SELECT 1 FROM {other} AS other WHERE other.key = base.key){partition}",
                base = base,
                other = other,
                partition = partition,
            )
        })
        .collect()
}

fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
