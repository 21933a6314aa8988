//! Test fixtures for engine integration tests
//!
//! A small dbt-style project split over three files, with qualified,
//! templated and bare spellings of the same tables.

use sqlineage_core::{RawEdgeRecord, RawTableRecord, RunId, RunInfo, TableRole};
use sqlineage_engine::RawRecordEvent;

pub const RUN: &str = "run-1";

pub fn run_id() -> RunId {
    RunId::new(RUN)
}

pub fn run_info() -> RunInfo {
    RunInfo::new(RUN, "git@github.com:acme/warehouse.git", "main")
}

/// Raw table sightings of the project
///
/// - `orders_raw` is only ever seen as a source
/// - `stg_orders` is seen templated, qualified and bare
/// - `customers` is seen with different column sets and under two schemas
pub fn tables() -> Vec<RawTableRecord> {
    vec![
        RawTableRecord::new(
            RUN,
            "models/stg_orders.sql",
            "{{ source('raw', 'x') }}.raw.orders_raw",
            TableRole::Source,
        )
        .with_columns(["id", "amt", "customer_id"]),
        RawTableRecord::new(
            RUN,
            "models/stg_orders.sql",
            "{{ target.schema }}.stg_orders",
            TableRole::Target,
        )
        .with_columns(["id", "amount", "customer_id"]),
        RawTableRecord::new(RUN, "models/orders.sql", "analytics.stg_orders", TableRole::Source)
            .with_columns(["id", "amount"]),
        RawTableRecord::new(RUN, "models/orders.sql", "analytics.customers", TableRole::Source)
            .with_columns(["id", "name"]),
        RawTableRecord::new(RUN, "models/orders.sql", "analytics.orders", TableRole::Target)
            .with_columns(["id", "total", "customer_name"])
            .with_partition_keys(["order_date"]),
        RawTableRecord::new(RUN, "models/customers.sql", "customers", TableRole::Target)
            .with_columns(["id", "name", "email"]),
        RawTableRecord::new(RUN, "models/orders.sql", "joined", TableRole::Intermediate),
        RawTableRecord::new(RUN, "models/legacy.sql", "staging.customers", TableRole::Source)
            .with_columns(["id"]),
    ]
}

/// Raw edges of the project, including one orphan and one column fact
/// reported by two files
pub fn edges() -> Vec<RawEdgeRecord> {
    vec![
        // Same fact as the SUM edge below, from a file that orders after it
        RawEdgeRecord::column_edge(
            RUN,
            "models/orders_v2.sql",
            ("stg_orders", "amount"),
            ("orders", "total"),
        )
        .with_transformation("COPY"),
        RawEdgeRecord::table_edge(RUN, "models/stg_orders.sql", "raw.orders_raw", "stg_orders")
            .with_transformation("INSERT")
            .with_lines(3, 12),
        RawEdgeRecord::column_edge(
            RUN,
            "models/stg_orders.sql",
            ("orders_raw", "amt"),
            ("stg_orders", "amount"),
        )
        .with_transformation("CAST")
        .with_lines(5, 5),
        RawEdgeRecord::column_edge(
            RUN,
            "models/stg_orders.sql",
            ("orders_raw", "id"),
            ("stg_orders", "id"),
        ),
        RawEdgeRecord::table_edge(
            RUN,
            "models/orders.sql",
            "analytics.stg_orders",
            "analytics.orders",
        )
        .with_transformation("CREATE_TABLE_AS")
        .with_lines(1, 20),
        RawEdgeRecord::table_edge(
            RUN,
            "models/orders.sql",
            "analytics.customers",
            "analytics.orders",
        )
        .with_transformation("JOIN")
        .with_lines(8, 10),
        RawEdgeRecord::column_edge(
            RUN,
            "models/orders.sql",
            ("stg_orders", "amount"),
            ("orders", "total"),
        )
        .with_transformation("SUM"),
        RawEdgeRecord::column_edge(
            RUN,
            "models/orders.sql",
            ("customers", "name"),
            ("orders", "customer_name"),
        ),
        RawEdgeRecord::column_edge(
            RUN,
            "models/orders.sql",
            ("stg_orders", "id"),
            ("orders", "id"),
        ),
        RawEdgeRecord::column_edge(
            RUN,
            "models/customers.sql",
            ("customers", "id, email"),
            ("orders", "customer_name"),
        ),
        // Same edge reported by a second pass over the file
        RawEdgeRecord::table_edge(RUN, "models/orders.sql", "stg_orders", "orders")
            .with_transformation("CREATE_TABLE_AS")
            .with_lines(1, 20),
        // Never sighted as a table
        RawEdgeRecord::table_edge(RUN, "models/legacy.sql", "legacy.ghost", "orders"),
    ]
}

/// Every record as a realtime event, tables first
pub fn events() -> Vec<RawRecordEvent> {
    tables()
        .into_iter()
        .map(RawRecordEvent::TableWritten)
        .chain(edges().into_iter().map(RawRecordEvent::EdgeWritten))
        .collect()
}

/// Deterministic Fisher-Yates shuffle driven by a xorshift seed
pub fn shuffled<T>(mut items: Vec<T>, seed: u64) -> Vec<T> {
    let mut state = seed.max(1);
    for i in (1..items.len()).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state % (i as u64 + 1)) as usize;
        items.swap(i, j);
    }
    items
}
