use crate::core::{DbError, Result, Value, WriteRequest};
use crate::result::{Row, WriteResult};
use crate::storage::registry::TenantDatabase;
use rusqlite::{Connection, params_from_iter};

/// Runs parameterized statements against a tenant database.
pub struct QueryExecutor;

impl QueryExecutor {
    /// Executes a write statement and reports its outcome.
    pub fn execute_write(db: &TenantDatabase, request: &WriteRequest) -> Result<WriteResult> {
        Self::execute_write_with(db, request, |_| ()).map(|(result, _)| result)
    }

    /// Executes a write statement, then calls `on_applied` before releasing
    /// the tenant's connection.
    ///
    /// The affected-row count and last insert id are read under the same lock
    /// as the statement, and `on_applied` observes writes to one tenant in the
    /// order they were applied. A statement that changed no rows (DDL, or DML
    /// matching nothing) reports zero for both, since SQLite keeps the counters
    /// of the previous write.
    pub fn execute_write_with<T, F>(
        db: &TenantDatabase,
        request: &WriteRequest,
        on_applied: F,
    ) -> Result<(WriteResult, T)>
    where
        F: FnOnce(&WriteResult) -> T,
    {
        let conn = db.connection()?;
        let changes_before = total_changes(&conn)?;
        let affected = conn
            .execute(&request.query, params_from_iter(request.args.iter()))
            .map_err(|e| match e {
                rusqlite::Error::ExecuteReturnedResults => DbError::Statement(
                    "statement returned rows; use the read endpoint".to_string(),
                ),
                other => DbError::from(other),
            })?;

        let result = if total_changes(&conn)? == changes_before {
            WriteResult::new(0, 0)
        } else {
            let affected_rows = u64::try_from(affected).map_err(|_| {
                DbError::Statement(format!("invalid affected row count {}", affected))
            })?;
            WriteResult::new(affected_rows, conn.last_insert_rowid())
        };
        let extra = on_applied(&result);
        Ok((result, extra))
    }

    /// Executes a query and materializes every row.
    pub fn execute_read(db: &TenantDatabase, request: &WriteRequest) -> Result<Vec<Row>> {
        let conn = db.connection()?;
        let mut stmt = conn.prepare(&request.query)?;
        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        let mut rows_iter = stmt.query(params_from_iter(request.args.iter()))?;
        let mut rows = Vec::new();
        while let Some(row) = rows_iter.next()? {
            let mut record = Row::with_capacity(columns.len());
            for (idx, column) in columns.iter().enumerate() {
                record.push(column.clone(), Value::from(row.get_ref(idx)?));
            }
            rows.push(record);
        }
        Ok(rows)
    }
}

fn total_changes(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT total_changes()", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_db() -> TenantDatabase {
        let db = TenantDatabase::open_in_memory("test").unwrap();
        QueryExecutor::execute_write(
            &db,
            &WriteRequest::new(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, score REAL, avatar BLOB)",
            ),
        )
        .unwrap();
        db
    }

    #[test]
    fn test_write_reports_outcome() {
        let db = users_db();
        let result = QueryExecutor::execute_write(
            &db,
            &WriteRequest::new("INSERT INTO users (name) VALUES (?), (?)")
                .arg("alice")
                .arg("bob"),
        )
        .unwrap();

        assert_eq!(result, WriteResult::new(2, 2));
    }

    #[test]
    fn test_statement_without_row_changes_reports_zero() {
        let db = users_db();
        let insert = QueryExecutor::execute_write(
            &db,
            &WriteRequest::new("INSERT INTO users (name) VALUES ('a'), ('b'), ('c')"),
        )
        .unwrap();
        assert_eq!(insert, WriteResult::new(3, 3));

        let create =
            QueryExecutor::execute_write(&db, &WriteRequest::new("CREATE TABLE audit (v)")).unwrap();
        assert_eq!(create, WriteResult::new(0, 0));

        let miss = QueryExecutor::execute_write(
            &db,
            &WriteRequest::new("UPDATE users SET score = 1 WHERE id = ?").arg(404),
        )
        .unwrap();
        assert_eq!(miss, WriteResult::new(0, 0));

        let update = QueryExecutor::execute_write(
            &db,
            &WriteRequest::new("UPDATE users SET score = 2 WHERE id <= ?").arg(2),
        )
        .unwrap();
        assert_eq!(update.affected_rows, 2);
    }

    #[test]
    fn test_write_is_visible_to_next_read() {
        let db = users_db();
        QueryExecutor::execute_write(
            &db,
            &WriteRequest::with_args(
                "INSERT INTO users (name, score, avatar) VALUES (?, ?, ?)",
                vec![Value::from("carol"), Value::Float(9.5), Value::Bytes(vec![0, 1])],
            ),
        )
        .unwrap();

        let rows = QueryExecutor::execute_read(
            &db,
            &WriteRequest::new("SELECT name, score, avatar, id FROM users WHERE name = ?")
                .arg("carol"),
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(
            row.column_names().collect::<Vec<_>>(),
            vec!["name", "score", "avatar", "id"]
        );
        assert_eq!(row.get("score"), Some(&Value::Float(9.5)));
        assert_eq!(row.get("avatar"), Some(&Value::Bytes(vec![0, 1])));
        assert_eq!(row.get("id"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_read_with_no_matches_is_empty() {
        let db = users_db();
        let rows = QueryExecutor::execute_read(
            &db,
            &WriteRequest::new("SELECT * FROM users WHERE id = ?").arg(404),
        )
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_arity_mismatch_is_statement_error() {
        let db = users_db();
        let err = QueryExecutor::execute_write(
            &db,
            &WriteRequest::new("INSERT INTO users (name) VALUES (?)")
                .arg("a")
                .arg("b"),
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Statement(_)));
    }

    #[test]
    fn test_select_on_write_path_fails() {
        let db = users_db();
        let err = QueryExecutor::execute_write(&db, &WriteRequest::new("SELECT 1")).unwrap_err();
        assert!(matches!(err, DbError::Statement(_)));
    }

    #[test]
    fn test_syntax_error_is_surfaced() {
        let db = users_db();
        let err =
            QueryExecutor::execute_read(&db, &WriteRequest::new("SELEC * FROM users")).unwrap_err();
        match err {
            DbError::Statement(msg) => assert!(msg.contains("syntax error"), "{msg}"),
            other => panic!("expected statement error, got {other:?}"),
        }
    }
}
