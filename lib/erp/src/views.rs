//! View column alias tables
//!
//! Installations rename view columns (`ITEM_CD` instead of `ITEM_CODE`,
//! `SETUP_TIME` where `ACT_SETUP_TIME` is expected). Each logical column lists
//! the physical names it may appear under; resolution against the columns a
//! view actually exposes is case-insensitive and the first match wins.

use routewise_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The four read-only views the ERP exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum View {
    ItemMaster,
    Routing,
    RoutingHistory,
    WorkOrderResults,
}

impl View {
    pub const ALL: [View; 4] = [
        View::ItemMaster,
        View::Routing,
        View::RoutingHistory,
        View::WorkOrderResults,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub logical: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub required: bool,
}

impl ColumnSpec {
    fn new(logical: &str, aliases: &[&str]) -> Self {
        Self {
            logical: logical.to_string(),
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
            required: false,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.logical.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSpec {
    /// Physical view name
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl ViewSpec {
    /// Match logical columns against the columns the view exposes
    pub fn resolve(&self, physical: &[String]) -> Result<ResolvedView> {
        let mut columns = BTreeMap::new();
        for spec in &self.columns {
            let found = spec.candidates().find_map(|candidate| {
                physical
                    .iter()
                    .find(|p| p.eq_ignore_ascii_case(candidate))
                    .cloned()
            });
            match found {
                Some(name) => {
                    columns.insert(spec.logical.clone(), name);
                }
                None if spec.required => {
                    return Err(Error::Query(format!(
                        "view {} has no column for '{}' (tried {})",
                        self.name,
                        spec.logical,
                        spec.candidates().collect::<Vec<_>>().join(", ")
                    )));
                }
                None => {}
            }
        }
        Ok(ResolvedView {
            name: self.name.clone(),
            columns,
            physical: physical.to_vec(),
        })
    }
}

/// Logical to physical column mapping for one view
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedView {
    pub name: String,
    columns: BTreeMap<String, String>,
    physical: Vec<String>,
}

impl ResolvedView {
    /// Physical column for a logical one
    pub fn column(&self, logical: &str) -> Option<&str> {
        self.columns.get(logical).map(String::as_str)
    }

    pub fn require(&self, logical: &str) -> Result<&str> {
        self.column(logical)
            .ok_or_else(|| Error::Query(format!("view {} has no column for '{}'", self.name, logical)))
    }

    /// Every column the view exposes, in view order
    pub fn physical_columns(&self) -> &[String] {
        &self.physical
    }

    /// Case-insensitive lookup of an arbitrary physical column
    pub fn find_physical(&self, name: &str) -> Option<&str> {
        self.physical
            .iter()
            .find(|p| p.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }
}

/// Alias tables for all four views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewAliases {
    pub item_master: ViewSpec,
    pub routing: ViewSpec,
    pub routing_history: ViewSpec,
    pub work_order_results: ViewSpec,
}

impl ViewAliases {
    pub fn spec(&self, view: View) -> &ViewSpec {
        match view {
            View::ItemMaster => &self.item_master,
            View::Routing => &self.routing,
            View::RoutingHistory => &self.routing_history,
            View::WorkOrderResults => &self.work_order_results,
        }
    }
}

const ITEM_CODE_ALIASES: &[&str] = &["ITEM_CD", "ITEMCODE", "ITEM_NO"];

impl Default for ViewAliases {
    fn default() -> Self {
        Self {
            item_master: ViewSpec {
                name: "ITEM_MASTER".into(),
                columns: vec![ColumnSpec::new("item_code", ITEM_CODE_ALIASES).required()],
            },
            routing: ViewSpec {
                name: "ROUTING".into(),
                columns: vec![
                    ColumnSpec::new("item_code", ITEM_CODE_ALIASES).required(),
                    ColumnSpec::new("routing_no", &["ROUT_NO", "ROUTING_NUMBER"]).required(),
                    ColumnSpec::new("proc_seq", &["PROCESS_SEQ", "OPER_SEQ", "SEQ"]).required(),
                    ColumnSpec::new("job_code", &["JOB_CD", "OPERATION_CODE", "JOB"]).required(),
                    ColumnSpec::new("job_name", &["JOB_NM", "OPERATION_NAME"]),
                    ColumnSpec::new("setup_time", &["SETUP_TM", "STD_SETUP_TIME"]),
                    ColumnSpec::new("run_time", &["RUN_TM", "MACH_WORKED_HOURS", "STD_RUN_TIME"]),
                    ColumnSpec::new("wait_time", &["WAIT_TM", "QUEUE_TIME"]),
                    ColumnSpec::new("move_time", &["MOVE_TM", "TRANSFER_TIME"]),
                    ColumnSpec::new("inserted_at", &["INSRT_DT", "INSERT_DATE", "CREATED_AT"]),
                ],
            },
            routing_history: ViewSpec {
                name: "ROUTING_HISTORY".into(),
                columns: vec![
                    ColumnSpec::new("item_code", ITEM_CODE_ALIASES).required(),
                    ColumnSpec::new("created_at", &["CREATE_DATE", "INSRT_DT"]),
                    ColumnSpec::new("received_at", &["RECEIVE_DATE", "RCV_DT"]),
                ],
            },
            work_order_results: ViewSpec {
                name: "WORK_ORDER_RESULTS".into(),
                columns: vec![
                    ColumnSpec::new("item_code", ITEM_CODE_ALIASES).required(),
                    ColumnSpec::new("proc_seq", &["PROCESS_SEQ", "OPER_SEQ", "SEQ"]),
                    ColumnSpec::new("operation_code", &["JOB_CD", "JOB_CODE", "OPERATION"]).required(),
                    ColumnSpec::new("act_setup_time", &["ACTUAL_SETUP_TIME", "SETUP_TIME"]),
                    ColumnSpec::new("act_run_time", &["ACTUAL_RUN_TIME", "RUN_TIME"]),
                    ColumnSpec::new("wait_time", &["WAIT_TM", "QUEUE_TIME"]),
                    ColumnSpec::new("move_time", &["MOVE_TM", "TRANSFER_TIME"]),
                ],
            },
        }
    }
}
