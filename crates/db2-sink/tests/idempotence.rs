//! Replaying already applied records must leave the destination unchanged.
//!
//! The destination table is emulated in memory by interpreting the MERGE and
//! DELETE statements the writer sends.

use db2_client::testing::{FakeColumnTypes, FakeConnection};
use db2_sink::Writer;
use db2_types::{ColumnTypes, Db2Type, Db2Value};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use sync_core::{ChangeRecord, Config, Operation, Position, StructuredData};

type Table = BTreeMap<String, BTreeMap<String, Db2Value>>;

fn between<'a>(sql: &'a str, start: &str, end: &str) -> &'a str {
    let from = sql.find(start).map(|i| i + start.len()).unwrap();
    let len = sql[from..].find(end).unwrap();
    &sql[from..from + len]
}

fn emulated_writer() -> (Writer, Arc<Mutex<Table>>) {
    let table = Arc::new(Mutex::new(Table::new()));
    let conn = Arc::new(FakeConnection::new());

    let state = table.clone();
    conn.on_execute_fn("MERGE INTO", move |sql, params| {
        let columns: Vec<&str> = between(sql, "AS merge (", ")").split(", ").collect();
        let key = between(sql, "ON tab.", " = merge.");
        let row: BTreeMap<String, Db2Value> = columns
            .iter()
            .map(|c| c.to_string())
            .zip(params.iter().cloned())
            .collect();
        let id = format!("{:?}", row[key]);
        state.lock().unwrap().entry(id).or_default().extend(row);
        Ok(1)
    });

    let state = table.clone();
    conn.on_execute_fn("DELETE FROM", move |_, params| {
        let id = format!("{:?}", params[0]);
        Ok(state.lock().unwrap().remove(&id).map_or(0, |_| 1))
    });

    let mut types = ColumnTypes::new();
    types.insert("ID".to_string(), Db2Type::Integer);
    types.insert("NAME".to_string(), Db2Type::VarChar { length: 10 });
    let column_types = Arc::new(FakeColumnTypes::new().with_table("CLIENTS", types));

    let config = Config {
        connection: "HOSTNAME=db".to_string(),
        table: "CLIENTS".to_string(),
        key: "ID".to_string(),
    };
    (Writer::new(conn, column_types, config), table)
}

fn change(id: i64, name: &str, delete: bool, seq: i64) -> ChangeRecord {
    let key: StructuredData = [("ID".to_string(), json!(id))].into();
    let row: StructuredData = [("ID".to_string(), json!(id)), ("NAME".to_string(), json!(name))].into();
    let operation = if delete { Operation::Delete } else { Operation::Update };
    ChangeRecord::new(operation, Position::cdc(seq), key, row)
}

async fn apply(writer: &Writer, records: &[ChangeRecord]) {
    for record in records {
        writer.write(record).await.unwrap();
    }
}

#[tokio::test]
async fn test_upsert_twice_is_upsert_once() {
    let (writer, table) = emulated_writer();
    let record = change(1, "Alice", false, 1);

    apply(&writer, &[record.clone()]).await;
    let once = table.lock().unwrap().clone();
    apply(&writer, &[record]).await;

    assert_eq!(*table.lock().unwrap(), once);
    assert_eq!(once.len(), 1);
}

#[tokio::test]
async fn test_delete_of_missing_row_is_harmless() {
    let (writer, table) = emulated_writer();
    apply(&writer, &[change(1, "a", false, 1), change(1, "a", true, 2)]).await;
    apply(&writer, &[change(1, "a", true, 2)]).await;
    assert!(table.lock().unwrap().is_empty());
}

proptest! {
    #[test]
    fn prop_replaying_a_suffix_is_idempotent(
        ops in proptest::collection::vec((0i64..5, "[a-z]{1,4}", any::<bool>()), 1..30),
        replay_from in any::<proptest::sample::Index>(),
    ) {
        let records: Vec<ChangeRecord> = ops
            .iter()
            .enumerate()
            .map(|(seq, (id, name, delete))| change(*id, name, *delete, seq as i64))
            .collect();
        let start = replay_from.index(records.len());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let (once, replayed) = runtime.block_on(async {
            let (writer, table) = emulated_writer();
            apply(&writer, &records).await;
            let once = table.lock().unwrap().clone();

            // Crash after applying, before the position was persisted
            apply(&writer, &records[start..]).await;
            let replayed = table.lock().unwrap().clone();
            (once, replayed)
        });

        prop_assert_eq!(once, replayed);
    }
}
