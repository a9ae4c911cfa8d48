//! Metadata delivered with the final SUCCESS of a result: statement type,
//! update counts and the execution plan or profile.

use crate::value::{Map, Value};

/// The broad category of an executed statement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatementType {
    /// `r`: reads only.
    ReadOnly,
    /// `w`: writes only.
    WriteOnly,
    /// `rw`: reads and writes.
    ReadWrite,
    /// `s`: schema changes.
    SchemaUpdate,
}

impl StatementType {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "r" => Some(StatementType::ReadOnly),
            "w" => Some(StatementType::WriteOnly),
            "rw" => Some(StatementType::ReadWrite),
            "s" => Some(StatementType::SchemaUpdate),
            _ => None,
        }
    }
}

/// Counts of the updates a statement performed.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct UpdateCounts {
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub relationships_created: u64,
    pub relationships_deleted: u64,
    pub properties_set: u64,
    pub labels_added: u64,
    pub labels_removed: u64,
    pub indexes_added: u64,
    pub indexes_removed: u64,
    pub constraints_added: u64,
    pub constraints_removed: u64,
    /// True when the statement changed the graph at all.
    pub contains_updates: bool,
}

impl UpdateCounts {
    fn from_stats(stats: &Map) -> Self {
        let count = |key: &str| -> u64 {
            stats
                .get(key)
                .and_then(Value::as_int)
                .and_then(|n| u64::try_from(n).ok())
                .unwrap_or(0)
        };
        UpdateCounts {
            nodes_created: count("nodes-created"),
            nodes_deleted: count("nodes-deleted"),
            relationships_created: count("relationships-created"),
            relationships_deleted: count("relationships-deleted"),
            properties_set: count("properties-set"),
            labels_added: count("labels-added"),
            labels_removed: count("labels-removed"),
            indexes_added: count("indexes-added"),
            indexes_removed: count("indexes-removed"),
            constraints_added: count("constraints-added"),
            constraints_removed: count("constraints-removed"),
            contains_updates: stats
                .get("contains-updates")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    /// The non-zero counts, with their server-side names.
    pub fn nonzero(&self) -> Vec<(&'static str, u64)> {
        [
            ("nodes-created", self.nodes_created),
            ("nodes-deleted", self.nodes_deleted),
            ("relationships-created", self.relationships_created),
            ("relationships-deleted", self.relationships_deleted),
            ("properties-set", self.properties_set),
            ("labels-added", self.labels_added),
            ("labels-removed", self.labels_removed),
            ("indexes-added", self.indexes_added),
            ("indexes-removed", self.indexes_removed),
            ("constraints-added", self.constraints_added),
            ("constraints-removed", self.constraints_removed),
        ]
        .into_iter()
        .filter(|&(_, n)| n > 0)
        .collect()
    }
}

/// Profiler readings attached to a plan operator when the statement ran under
/// PROFILE.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PlanProfile {
    /// Rows that passed through the operator.
    pub rows: u64,
    /// Database accesses the operator performed.
    pub db_hits: u64,
}

/// One operator of the server's execution plan. Children execute before
/// their parent; the tree is walked root-down.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Name of the operator, e.g. `ProduceResults`.
    pub operator_type: String,
    /// Identifiers the operator introduces or consumes.
    pub identifiers: Vec<String>,
    /// Operator-specific arguments.
    pub arguments: Map,
    /// Source operators feeding this one.
    pub children: Vec<Plan>,
    /// Present when the plan came from a PROFILE run.
    pub profile: Option<PlanProfile>,
}

impl Plan {
    fn from_value(value: &Value) -> Option<Plan> {
        let map = value.as_map()?;
        let operator_type = map
            .get("operatorType")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let identifiers = map
            .get("identifiers")
            .and_then(Value::as_list)
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let arguments = map
            .get("args")
            .and_then(Value::as_map)
            .cloned()
            .unwrap_or_default();
        let children = map
            .get("children")
            .and_then(Value::as_list)
            .map(|kids| kids.iter().filter_map(Plan::from_value).collect())
            .unwrap_or_default();
        let profile = match (
            map.get("rows").and_then(Value::as_int),
            map.get("dbHits").and_then(Value::as_int),
        ) {
            (None, None) => None,
            (rows, db_hits) => Some(PlanProfile {
                rows: rows.and_then(|n| u64::try_from(n).ok()).unwrap_or(0),
                db_hits: db_hits.and_then(|n| u64::try_from(n).ok()).unwrap_or(0),
            }),
        };
        Some(Plan {
            operator_type,
            identifiers,
            arguments,
            children,
            profile,
        })
    }
}

/// Everything of interest from the final SUCCESS metadata of a result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub statement_type: Option<StatementType>,
    pub counts: Option<UpdateCounts>,
    pub plan: Option<Plan>,
}

impl Summary {
    /// Extract the summary from SUCCESS metadata. Unknown keys are ignored;
    /// recognized keys with unusable payloads are treated as absent.
    pub fn from_meta(meta: &Map) -> Summary {
        Summary {
            statement_type: meta
                .get("type")
                .and_then(Value::as_str)
                .and_then(StatementType::from_code),
            counts: meta
                .get("stats")
                .and_then(Value::as_map)
                .map(UpdateCounts::from_stats),
            plan: meta
                .get("plan")
                .or_else(|| meta.get("profile"))
                .and_then(Plan::from_value),
        }
    }
}
