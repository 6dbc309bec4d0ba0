//! SQLite-backed ERP source
//!
//! Views are opened read-only through the bounded pool. Each view's columns
//! are discovered once with `SELECT * FROM view LIMIT 0`, resolved through
//! the alias tables, and cached for the lifetime of the source.

use crate::pool::{ConnectionPool, Connector, PoolStatus};
use crate::retry::{with_retry, RetryPolicy};
use crate::source::ErpSource;
use crate::views::{ResolvedView, View, ViewAliases};
use parking_lot::RwLock;
use routewise_core::routing::parse_timestamp;
use routewise_core::{
    normalize_item_code, AttrValue, Error, ItemRecord, RecommendConfig, Result, RoutingHistoryRow,
    RoutingRow, WorkOrderRecord,
};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, Row};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Map a driver error onto the shared taxonomy. Connectivity problems are
/// retryable; anything about the statement itself is not.
pub(crate) fn classify(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) => match err.code {
            ErrorCode::CannotOpen
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure
            | ErrorCode::NotADatabase
            | ErrorCode::DatabaseCorrupt
            | ErrorCode::OutOfMemory
            | ErrorCode::FileLockingProtocolFailed => Error::DatabaseUnavailable(e.to_string()),
            _ => Error::Query(e.to_string()),
        },
        _ => Error::Query(e.to_string()),
    }
}

/// Opens read-only connections to one SQLite file
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteConnector {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for SqliteConnector {
    type Connection = Connection;

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(classify)?;
        conn.busy_timeout(self.busy_timeout).map_err(classify)?;
        Ok(conn)
    }

    fn is_alive(&self, conn: &mut Connection) -> bool {
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn value_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(r) => AttrValue::Number(r).as_text(),
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

fn value_f64(value: ValueRef<'_>) -> Option<f64> {
    match value {
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Real(r) if r.is_finite() => Some(r),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes)
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite()),
        _ => None,
    }
}

fn value_i64(value: ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::Integer(i) => Some(i),
        other => value_f64(other).filter(|v| v.fract() == 0.0).map(|v| v as i64),
    }
}

fn value_attr(value: ValueRef<'_>) -> AttrValue {
    match value {
        ValueRef::Integer(i) => AttrValue::Number(i as f64),
        ValueRef::Real(r) => AttrValue::Number(r),
        ValueRef::Text(bytes) => AttrValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Null | ValueRef::Blob(_) => AttrValue::Null,
    }
}

/// Column positions of a resolved view inside a `SELECT *` row
struct Positions<'v> {
    view: &'v ResolvedView,
}

impl<'v> Positions<'v> {
    fn index_of(&self, physical: &str) -> Option<usize> {
        self.view.physical_columns().iter().position(|p| p == physical)
    }

    fn get<'r>(&self, row: &'r Row<'_>, logical: &str) -> Option<ValueRef<'r>> {
        let idx = self.index_of(self.view.column(logical)?)?;
        row.get_ref(idx).ok()
    }

    fn text(&self, row: &Row<'_>, logical: &str) -> Option<String> {
        self.get(row, logical).and_then(value_text)
    }

    fn f64(&self, row: &Row<'_>, logical: &str) -> Option<f64> {
        self.get(row, logical).and_then(value_f64)
    }

    fn i64(&self, row: &Row<'_>, logical: &str) -> Option<i64> {
        self.get(row, logical).and_then(value_i64)
    }

    fn timestamp(&self, row: &Row<'_>, logical: &str) -> Option<chrono::NaiveDateTime> {
        self.text(row, logical).as_deref().and_then(parse_timestamp)
    }
}

pub struct SqliteErpSource {
    pool: ConnectionPool<SqliteConnector>,
    retry: RetryPolicy,
    aliases: ViewAliases,
    hold_columns: Vec<String>,
    resolved: RwLock<HashMap<View, Arc<ResolvedView>>>,
}

impl SqliteErpSource {
    pub fn open<P: AsRef<Path>>(path: P, config: &RecommendConfig) -> Result<Self> {
        Self::with_aliases(path, config, ViewAliases::default())
    }

    pub fn with_aliases<P: AsRef<Path>>(
        path: P,
        config: &RecommendConfig,
        aliases: ViewAliases,
    ) -> Result<Self> {
        let pool = ConnectionPool::new(
            SqliteConnector::new(path),
            config.connection_pool_size,
            config.pool_acquire_timeout(),
        )?;
        Ok(Self {
            pool,
            retry: RetryPolicy::from_config(config),
            aliases,
            hold_columns: config.hold_time_columns.clone(),
            resolved: RwLock::new(HashMap::new()),
        })
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Run `op` on a pooled connection under the retry policy. A connection
    /// that failed with a retryable error is closed rather than reused.
    fn run<T, F>(&self, what: &str, op: F) -> Result<T>
    where
        F: Fn(&Connection) -> Result<T>,
    {
        with_retry(self.retry, what, || {
            let mut conn = self.pool.acquire()?;
            let result = op(&*conn);
            if matches!(&result, Err(e) if e.is_retryable()) {
                conn.invalidate();
            }
            result
        })
    }

    fn resolve(&self, conn: &Connection, view: View) -> Result<Arc<ResolvedView>> {
        if let Some(resolved) = self.resolved.read().get(&view) {
            return Ok(resolved.clone());
        }

        let spec = self.aliases.spec(view);
        let sql = format!("SELECT * FROM {} LIMIT 0", quote_ident(&spec.name));
        let stmt = conn.prepare(&sql).map_err(classify)?;
        let physical: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let resolved = Arc::new(spec.resolve(&physical)?);
        debug!(view = %spec.name, columns = physical.len(), "view schema discovered");

        self.resolved.write().insert(view, resolved.clone());
        Ok(resolved)
    }

    /// `SELECT * FROM view WHERE <item_code> = ?` with the code normalized on both sides
    fn select_for_item<T, F>(
        &self,
        conn: &Connection,
        view: View,
        item_code: &str,
        order_by: &[&str],
        mut map: F,
    ) -> Result<Vec<T>>
    where
        F: FnMut(&Positions<'_>, &Row<'_>) -> Option<T>,
    {
        let resolved = self.resolve(conn, view)?;
        let code_col = quote_ident(resolved.require("item_code")?);
        let mut sql = format!(
            "SELECT * FROM {} WHERE UPPER(TRIM({})) = ?1",
            quote_ident(&resolved.name),
            code_col
        );
        let order: Vec<String> = order_by
            .iter()
            .filter_map(|logical| resolved.column(logical))
            .map(quote_ident)
            .collect();
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        let positions = Positions { view: &resolved };
        let mut stmt = conn.prepare(&sql).map_err(classify)?;
        let mut rows = stmt
            .query(params![normalize_item_code(item_code)])
            .map_err(classify)?;
        let mut out = Vec::new();
        let mut skipped = 0usize;
        while let Some(row) = rows.next().map_err(classify)? {
            match map(&positions, row) {
                Some(value) => out.push(value),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(
                view = %resolved.name,
                item_code = %normalize_item_code(item_code),
                skipped,
                "rows missing required values ignored"
            );
        }
        Ok(out)
    }

    fn item_from_row(positions: &Positions<'_>, row: &Row<'_>) -> Option<ItemRecord> {
        let code = positions.text(row, "item_code")?;
        let code_column = positions.view.column("item_code");
        let mut record = ItemRecord::new(&code);
        for (idx, name) in positions.view.physical_columns().iter().enumerate() {
            if Some(name.as_str()) == code_column {
                continue;
            }
            if let Ok(value) = row.get_ref(idx) {
                record.set(name, value_attr(value));
            }
        }
        Some(record)
    }
}

impl ErpSource for SqliteErpSource {
    fn fetch_items(&self) -> Result<Vec<ItemRecord>> {
        self.run("fetch_items", |conn| {
            let resolved = self.resolve(conn, View::ItemMaster)?;
            let sql = format!(
                "SELECT * FROM {} ORDER BY UPPER(TRIM({}))",
                quote_ident(&resolved.name),
                quote_ident(resolved.require("item_code")?)
            );
            let positions = Positions { view: &resolved };
            let mut stmt = conn.prepare(&sql).map_err(classify)?;
            let mut rows = stmt.query([]).map_err(classify)?;
            let mut items = Vec::new();
            let mut skipped = 0usize;
            while let Some(row) = rows.next().map_err(classify)? {
                match Self::item_from_row(&positions, row) {
                    Some(item) => items.push(item),
                    None => skipped += 1,
                }
            }
            if skipped > 0 {
                warn!(skipped, "item master rows without an item code ignored");
            }
            Ok(items)
        })
    }

    fn fetch_item(&self, item_code: &str) -> Result<Option<ItemRecord>> {
        self.run("fetch_item", |conn| {
            let mut found =
                self.select_for_item(conn, View::ItemMaster, item_code, &[], Self::item_from_row)?;
            Ok(if found.is_empty() { None } else { Some(found.swap_remove(0)) })
        })
    }

    fn fetch_routings(&self, item_code: &str) -> Result<Vec<RoutingRow>> {
        self.run("fetch_routings", |conn| {
            self.select_for_item(
                conn,
                View::Routing,
                item_code,
                &["routing_no", "proc_seq"],
                |p, row| {
                    Some(RoutingRow {
                        item_code: normalize_item_code(&p.text(row, "item_code")?),
                        routing_no: p.text(row, "routing_no")?,
                        proc_seq: p.i64(row, "proc_seq")?,
                        job_code: p.text(row, "job_code")?,
                        job_name: p.text(row, "job_name").unwrap_or_default(),
                        setup_time: p.f64(row, "setup_time"),
                        run_time: p.f64(row, "run_time"),
                        wait_time: p.f64(row, "wait_time"),
                        move_time: p.f64(row, "move_time"),
                        inserted_at: p.timestamp(row, "inserted_at"),
                    })
                },
            )
        })
    }

    fn fetch_work_orders(&self, item_code: &str) -> Result<Vec<WorkOrderRecord>> {
        self.run("fetch_work_orders", |conn| {
            let resolved = self.resolve(conn, View::WorkOrderResults)?;
            let holds: Vec<(String, usize)> = self
                .hold_columns
                .iter()
                .filter_map(|hold| {
                    let physical = resolved.find_physical(hold)?;
                    let idx = resolved.physical_columns().iter().position(|p| p == physical)?;
                    Some((hold.to_uppercase(), idx))
                })
                .collect();

            self.select_for_item(conn, View::WorkOrderResults, item_code, &["proc_seq"], |p, row| {
                let hold_times: BTreeMap<String, f64> = holds
                    .iter()
                    .filter_map(|(name, idx)| {
                        let value = row.get_ref(*idx).ok().and_then(value_f64)?;
                        Some((name.clone(), value))
                    })
                    .collect();
                Some(WorkOrderRecord {
                    item_code: normalize_item_code(&p.text(row, "item_code")?),
                    proc_seq: p.i64(row, "proc_seq"),
                    operation_code: p.text(row, "operation_code")?,
                    act_setup_time: p.f64(row, "act_setup_time"),
                    act_run_time: p.f64(row, "act_run_time"),
                    wait_time: p.f64(row, "wait_time"),
                    move_time: p.f64(row, "move_time"),
                    hold_times,
                })
            })
        })
    }

    fn routing_history(&self, item_code: &str) -> Result<Vec<RoutingHistoryRow>> {
        self.run("routing_history", |conn| {
            self.select_for_item(
                conn,
                View::RoutingHistory,
                item_code,
                &["created_at"],
                |p, row| {
                    Some(RoutingHistoryRow {
                        item_code: normalize_item_code(&p.text(row, "item_code")?),
                        created_at: p.timestamp(row, "created_at"),
                        received_at: p.timestamp(row, "received_at"),
                    })
                },
            )
        })
    }
}
