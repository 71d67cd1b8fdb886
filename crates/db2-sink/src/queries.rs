//! MERGE and DELETE statement text.

/// Upsert of one row keyed on `key`.
///
/// `columns` are bound in order through the `VALUES` row; every column,
/// the key included, is updated on match.
pub fn build_merge_query(table: &str, key: &str, columns: &[String]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    let updates = columns
        .iter()
        .map(|c| format!("tab.{c} = merge.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let inserts = columns
        .iter()
        .map(|c| format!("merge.{c}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "MERGE INTO {table} AS tab USING (VALUES ({placeholders})) AS merge ({}) \
         ON tab.{key} = merge.{key} \
         WHEN MATCHED THEN UPDATE SET {updates} \
         WHEN NOT MATCHED THEN INSERT ({}) VALUES ({inserts})",
        columns.join(", "),
        columns.join(", "),
    )
}

pub fn build_delete_query(table: &str, key: &str) -> String {
    format!("DELETE FROM {table} WHERE {key} = ?")
}
