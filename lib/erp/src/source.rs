//! Read access to the ERP views
//!
//! The recommendation engine only ever reads through [`ErpSource`]. The SQL
//! implementation lives in [`crate::sqlite`]; [`MemorySource`] serves fixed
//! records for offline use and tests.

use parking_lot::RwLock;
use routewise_core::{
    normalize_item_code, ItemRecord, Result, RoutingHistoryRow, RoutingRow, WorkOrderRecord,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub trait ErpSource: Send + Sync {
    /// Every row of `ITEM_MASTER`
    fn fetch_items(&self) -> Result<Vec<ItemRecord>>;

    /// One `ITEM_MASTER` row, matched on the normalized item code
    fn fetch_item(&self, item_code: &str) -> Result<Option<ItemRecord>>;

    /// All `ROUTING` rows of an item, every routing number
    fn fetch_routings(&self, item_code: &str) -> Result<Vec<RoutingRow>>;

    /// All `WORK_ORDER_RESULTS` rows of an item
    fn fetch_work_orders(&self, item_code: &str) -> Result<Vec<WorkOrderRecord>>;

    /// `ROUTING_HISTORY` rows of an item
    fn routing_history(&self, item_code: &str) -> Result<Vec<RoutingHistoryRow>>;
}

/// In-memory ERP snapshot
#[derive(Debug, Default)]
pub struct MemorySource {
    items: RwLock<BTreeMap<String, ItemRecord>>,
    routings: RwLock<BTreeMap<String, Vec<RoutingRow>>>,
    work_orders: RwLock<BTreeMap<String, Vec<WorkOrderRecord>>>,
    history: RwLock<BTreeMap<String, Vec<RoutingHistoryRow>>>,
    queries: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&self, item: ItemRecord) {
        self.items.write().insert(normalize_item_code(&item.item_code), item);
    }

    pub fn add_routing(&self, row: RoutingRow) {
        self.routings
            .write()
            .entry(normalize_item_code(&row.item_code))
            .or_default()
            .push(row);
    }

    pub fn add_work_order(&self, record: WorkOrderRecord) {
        self.work_orders
            .write()
            .entry(normalize_item_code(&record.item_code))
            .or_default()
            .push(record);
    }

    pub fn add_history(&self, row: RoutingHistoryRow) {
        self.history
            .write()
            .entry(normalize_item_code(&row.item_code))
            .or_default()
            .push(row);
    }

    /// Number of reads served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    fn count(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }
}

impl ErpSource for MemorySource {
    fn fetch_items(&self) -> Result<Vec<ItemRecord>> {
        self.count();
        Ok(self.items.read().values().cloned().collect())
    }

    fn fetch_item(&self, item_code: &str) -> Result<Option<ItemRecord>> {
        self.count();
        Ok(self.items.read().get(&normalize_item_code(item_code)).cloned())
    }

    fn fetch_routings(&self, item_code: &str) -> Result<Vec<RoutingRow>> {
        self.count();
        Ok(self
            .routings
            .read()
            .get(&normalize_item_code(item_code))
            .cloned()
            .unwrap_or_default())
    }

    fn fetch_work_orders(&self, item_code: &str) -> Result<Vec<WorkOrderRecord>> {
        self.count();
        Ok(self
            .work_orders
            .read()
            .get(&normalize_item_code(item_code))
            .cloned()
            .unwrap_or_default())
    }

    fn routing_history(&self, item_code: &str) -> Result<Vec<RoutingHistoryRow>> {
        self.count();
        Ok(self
            .history
            .read()
            .get(&normalize_item_code(item_code))
            .cloned()
            .unwrap_or_default())
    }
}
