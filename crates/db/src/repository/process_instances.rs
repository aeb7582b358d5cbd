//! `process_instances` queries.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{DbError, models::ProcessInstance};

pub async fn insert_process_instance(
    conn: &mut PgConnection,
    instance: &ProcessInstance,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO process_instances
            (id, process_definition_key, function_unit_version_id, start_user_id,
             start_user_name, status, variables, started_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(instance.id)
    .bind(&instance.process_definition_key)
    .bind(instance.function_unit_version_id)
    .bind(&instance.start_user_id)
    .bind(&instance.start_user_name)
    .bind(instance.status.to_string())
    .bind(sqlx::types::Json(&instance.variables))
    .bind(instance.started_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn list_process_instances(
    conn: &mut PgConnection,
    version_id: Uuid,
) -> Result<Vec<ProcessInstance>, DbError> {
    let rows = sqlx::query_as::<_, ProcessInstance>(
        r#"
        SELECT id, process_definition_key, function_unit_version_id, start_user_id,
               start_user_name, status, variables, started_at
        FROM process_instances
        WHERE function_unit_version_id = $1
        ORDER BY started_at ASC
        "#,
    )
    .bind(version_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

pub async fn count_process_instances(
    conn: &mut PgConnection,
    version_id: Uuid,
) -> Result<u64, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM process_instances WHERE function_unit_version_id = $1",
    )
    .bind(version_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count.max(0) as u64)
}

pub async fn delete_process_instances(
    conn: &mut PgConnection,
    version_id: Uuid,
) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM process_instances WHERE function_unit_version_id = $1")
        .bind(version_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}
