//! DB2 trigger-based change tracking infrastructure
//!
//! Sets up, per source table, a tracking table that mirrors the source
//! columns plus three bookkeeping columns, and the insert/update/delete
//! triggers that append every changed row to it. The iterator reads changes
//! back in tracking-identity order.

use crate::error::{ProvisionError, ProvisionStep};
use crate::queries::{
    build_augmentation_ddl, build_drop_table_ddl, build_drop_trigger_ddl, build_identity_ddl,
    build_not_null_ddl, build_reorg_ddl, build_table_exists_query, build_tracking_table_ddl,
    build_triggers, build_unique_index_ddl, tracking_table_name, TriggerOperation,
    COLUMN_OPERATION_TYPE, COLUMN_TRACKING_CREATED_DATE, COLUMN_TRACKING_ID,
};
use db2_client::{ClientError, ColumnTypeService, Connection};
use db2_types::ColumnTypes;
use tracing::{debug, info, warn};

/// SQLSTATE for "undefined object or constraint name".
const SQLSTATE_UNDEFINED_NAME: &str = "42704";

/// Provision change tracking for `table`.
///
/// Re-running against an already provisioned table skips the tracking table
/// creation and only refreshes the triggers and the reorg, so the call is
/// safe to repeat on every start.
pub async fn setup_change_tracking(
    conn: &dyn Connection,
    column_types: &dyn ColumnTypeService,
    table: &str,
) -> Result<(), ProvisionError> {
    let tracking = tracking_table_name(table);

    let types = column_types
        .column_types(table)
        .await
        .map_err(ProvisionError::step(ProvisionStep::LoadColumnTypes))?;
    if types.is_empty() {
        return Err(ProvisionError::NoColumns(table.to_string()));
    }
    let triggers = build_triggers(&tracking, table, &types)?;

    let exists = build_table_exists_query(&tracking);
    let count = conn
        .query_scalar(&exists.sql, &exists.params)
        .await
        .map_err(ProvisionError::step(ProvisionStep::CheckTrackingTable))?;

    if count.as_i64().unwrap_or(0) > 0 {
        info!("Tracking table {tracking} already exists, skipping creation");
    } else {
        info!("Creating tracking table {tracking} for {table}");
        for (step, sql) in tracking_table_steps(table, &tracking) {
            run_step(conn, step, &sql).await?;
        }
    }

    for (operation, sql) in triggers.iter() {
        debug!("Installing {} trigger on {table}", operation.as_str());
        run_step(conn, ProvisionStep::CreateTriggers, sql).await?;
    }

    run_step(
        conn,
        ProvisionStep::ReorgTrackingTable,
        &build_reorg_ddl(&tracking),
    )
    .await?;

    info!(
        "DB2 trigger-based change tracking ready for {table} ({} columns)",
        types.len()
    );
    Ok(())
}

/// Drop the triggers and the tracking table of `table`.
///
/// Objects that do not exist are skipped, so a partially provisioned table
/// can be cleaned up.
pub async fn teardown_change_tracking(
    conn: &dyn Connection,
    table: &str,
) -> Result<(), ProvisionError> {
    let tracking = tracking_table_name(table);

    for operation in TriggerOperation::ALL {
        drop_if_exists(
            conn,
            ProvisionStep::DropTriggers,
            &build_drop_trigger_ddl(operation, table),
        )
        .await?;
    }
    drop_if_exists(
        conn,
        ProvisionStep::DropTrackingTable,
        &build_drop_table_ddl(&tracking),
    )
    .await?;

    info!("Removed change tracking for {table}");
    Ok(())
}

/// Every statement [`setup_change_tracking`] runs on a fresh table, in order.
///
/// Pure; used to print the DDL without a database connection.
pub fn provisioning_statements(
    table: &str,
    types: &ColumnTypes,
) -> Result<Vec<(ProvisionStep, String)>, ProvisionError> {
    if types.is_empty() {
        return Err(ProvisionError::NoColumns(table.to_string()));
    }
    let tracking = tracking_table_name(table);
    let triggers = build_triggers(&tracking, table, types)?;

    let mut statements: Vec<_> = tracking_table_steps(table, &tracking).into();
    statements.extend(
        triggers
            .iter()
            .map(|(_, sql)| (ProvisionStep::CreateTriggers, sql.to_string())),
    );
    statements.push((ProvisionStep::ReorgTrackingTable, build_reorg_ddl(&tracking)));
    Ok(statements)
}

fn tracking_table_steps(table: &str, tracking: &str) -> [(ProvisionStep, String); 6] {
    [
        (
            ProvisionStep::CreateTrackingTable,
            build_tracking_table_ddl(table, tracking),
        ),
        (
            ProvisionStep::AddTrackingColumns,
            build_augmentation_ddl(
                tracking,
                COLUMN_OPERATION_TYPE,
                COLUMN_TRACKING_CREATED_DATE,
                COLUMN_TRACKING_ID,
            ),
        ),
        (
            ProvisionStep::SetNotNull,
            build_not_null_ddl(tracking, COLUMN_OPERATION_TYPE),
        ),
        (
            ProvisionStep::SetNotNull,
            build_not_null_ddl(tracking, COLUMN_TRACKING_ID),
        ),
        (
            ProvisionStep::SetIdentity,
            build_identity_ddl(tracking, COLUMN_TRACKING_ID),
        ),
        (
            ProvisionStep::CreateUniqueIndex,
            build_unique_index_ddl(tracking, COLUMN_TRACKING_ID),
        ),
    ]
}

async fn run_step(
    conn: &dyn Connection,
    step: ProvisionStep,
    sql: &str,
) -> Result<(), ProvisionError> {
    debug!("{step}: {sql}");
    conn.execute(sql, &[])
        .await
        .map(|_| ())
        .map_err(ProvisionError::step(step))
}

async fn drop_if_exists(
    conn: &dyn Connection,
    step: ProvisionStep,
    sql: &str,
) -> Result<(), ProvisionError> {
    match conn.execute(sql, &[]).await {
        Ok(_) => Ok(()),
        Err(ClientError::Database {
            sqlstate: Some(state),
            ..
        }) if state == SQLSTATE_UNDEFINED_NAME => {
            warn!("Skipping '{sql}': object does not exist");
            Ok(())
        }
        Err(e) => Err(ProvisionError::Step { step, source: e }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db2_client::testing::{FakeColumnTypes, FakeConnection};
    use db2_types::{ColumnTypes, Db2Type, Row};

    fn clients() -> FakeColumnTypes {
        let mut types = ColumnTypes::new();
        types.insert("ID".to_string(), Db2Type::Integer);
        types.insert("NAME".to_string(), Db2Type::VarChar { length: 40 });
        FakeColumnTypes::new().with_table("CLIENTS", types)
    }

    #[tokio::test]
    async fn test_setup_runs_steps_in_order() {
        let conn = FakeConnection::new();
        setup_change_tracking(&conn, &clients(), "CLIENTS")
            .await
            .unwrap();

        let log = conn.sql_log();
        let expected_prefixes = [
            "SELECT count(*) AS count FROM SYSCAT.TABLES",
            "CREATE TABLE CONDUIT_TRACKING_CLIENTS AS",
            "ALTER TABLE CONDUIT_TRACKING_CLIENTS ADD COLUMN",
            "ALTER TABLE CONDUIT_TRACKING_CLIENTS ALTER COLUMN CONDUIT_OPERATION_TYPE SET NOT NULL",
            "ALTER TABLE CONDUIT_TRACKING_CLIENTS ALTER COLUMN CONDUIT_TRACKING_ID SET NOT NULL",
            "ALTER TABLE CONDUIT_TRACKING_CLIENTS ALTER COLUMN CONDUIT_TRACKING_ID SET GENERATED",
            "CREATE UNIQUE INDEX",
            "CREATE OR REPLACE TRIGGER CONDUIT_TRIGGER_insert_CLIENTS",
            "CREATE OR REPLACE TRIGGER CONDUIT_TRIGGER_update_CLIENTS",
            "CREATE OR REPLACE TRIGGER CONDUIT_TRIGGER_delete_CLIENTS",
            "CALL sysproc.admin_cmd('reorg table CONDUIT_TRACKING_CLIENTS')",
        ];
        assert_eq!(log.len(), expected_prefixes.len());
        for (sql, prefix) in log.iter().zip(expected_prefixes) {
            assert!(sql.starts_with(prefix), "expected '{prefix}', got '{sql}'");
        }
    }

    #[tokio::test]
    async fn test_setup_skips_creation_when_tracking_table_exists() {
        let conn = FakeConnection::new();
        conn.on_query("SYSCAT.TABLES", vec![Row::new().with("COUNT", 1i64)]);

        setup_change_tracking(&conn, &clients(), "CLIENTS")
            .await
            .unwrap();

        let log = conn.sql_log();
        assert_eq!(log.len(), 5);
        assert!(log.iter().all(|sql| !sql.starts_with("CREATE TABLE")));
        assert!(log[1].starts_with("CREATE OR REPLACE TRIGGER"));
        assert!(log[4].starts_with("CALL sysproc.admin_cmd"));
    }

    #[tokio::test]
    async fn test_setup_fails_fast_without_columns() {
        let conn = FakeConnection::new();
        let result = setup_change_tracking(&conn, &FakeColumnTypes::new(), "EMPTY").await;

        assert!(matches!(result, Err(ProvisionError::NoColumns(t)) if t == "EMPTY"));
        assert_eq!(conn.call_count(), 0);
    }

    #[tokio::test]
    async fn test_setup_aborts_on_failing_step() {
        let conn = FakeConnection::new();
        conn.fail_on(
            "CREATE UNIQUE INDEX",
            ClientError::database(Some("42710"), "duplicate object"),
        );

        let err = setup_change_tracking(&conn, &clients(), "CLIENTS")
            .await
            .unwrap_err();
        match err {
            ProvisionError::Step { step, source } => {
                assert_eq!(step, ProvisionStep::CreateUniqueIndex);
                assert_eq!(
                    source,
                    ClientError::database(Some("42710"), "duplicate object")
                );
            }
            other => panic!("unexpected error: {other}"),
        }

        // No trigger was installed after the failure
        assert!(conn
            .sql_log()
            .iter()
            .all(|sql| !sql.contains("TRIGGER")));
    }

    #[tokio::test]
    async fn test_teardown_tolerates_missing_objects() {
        let conn = FakeConnection::new();
        conn.fail_on(
            "DROP TRIGGER CONDUIT_TRIGGER_update_CLIENTS",
            ClientError::database(Some(SQLSTATE_UNDEFINED_NAME), "not found"),
        );

        teardown_change_tracking(&conn, "CLIENTS").await.unwrap();
        assert_eq!(
            conn.sql_log(),
            vec![
                "DROP TRIGGER CONDUIT_TRIGGER_insert_CLIENTS",
                "DROP TRIGGER CONDUIT_TRIGGER_update_CLIENTS",
                "DROP TRIGGER CONDUIT_TRIGGER_delete_CLIENTS",
                "DROP TABLE CONDUIT_TRACKING_CLIENTS",
            ]
        );
    }

    #[tokio::test]
    async fn test_teardown_surfaces_other_errors() {
        let conn = FakeConnection::new();
        conn.fail_on(
            "DROP TABLE",
            ClientError::database(Some("42501"), "not authorized"),
        );

        let err = teardown_change_tracking(&conn, "CLIENTS").await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Step {
                step: ProvisionStep::DropTrackingTable,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_provisioning_statements_match_fresh_setup() {
        let conn = FakeConnection::new();
        let types = clients();
        setup_change_tracking(&conn, &types, "CLIENTS").await.unwrap();

        let planned = provisioning_statements("CLIENTS", &types.column_types("CLIENTS").await.unwrap())
            .unwrap();
        let executed: Vec<String> = conn.sql_log().into_iter().skip(1).collect();
        assert_eq!(
            planned.iter().map(|(_, sql)| sql.clone()).collect::<Vec<_>>(),
            executed
        );
        assert_eq!(planned[0].0, ProvisionStep::CreateTrackingTable);
        assert_eq!(planned.last().unwrap().0, ProvisionStep::ReorgTrackingTable);

        assert!(matches!(
            provisioning_statements("EMPTY", &ColumnTypes::new()),
            Err(ProvisionError::NoColumns(_))
        ));
    }
}
