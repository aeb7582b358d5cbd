//! `function_unit_access` queries.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{DbError, models::FunctionUnitAccess};

pub async fn list_access(
    conn: &mut PgConnection,
    version_id: Uuid,
) -> Result<Vec<FunctionUnitAccess>, DbError> {
    let rows = sqlx::query_as::<_, FunctionUnitAccess>(
        r#"
        SELECT id, function_unit_version_id, access_type, target_type, target_id
        FROM function_unit_access
        WHERE function_unit_version_id = $1
        ORDER BY access_type, target_type, target_id
        "#,
    )
    .bind(version_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

pub async fn insert_access(
    conn: &mut PgConnection,
    rule: &FunctionUnitAccess,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO function_unit_access
            (id, function_unit_version_id, access_type, target_type, target_id)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(rule.id)
    .bind(rule.function_unit_version_id)
    .bind(&rule.access_type)
    .bind(&rule.target_type)
    .bind(&rule.target_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => DbError::Constraint(
            format!("access rule references missing version {}", rule.function_unit_version_id),
        ),
        other => DbError::Sqlx(other),
    })?;

    Ok(())
}

pub async fn delete_access_by_version(
    conn: &mut PgConnection,
    version_id: Uuid,
) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM function_unit_access WHERE function_unit_version_id = $1")
        .bind(version_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}
