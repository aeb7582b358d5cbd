//! `function_unit_versions` queries.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{DbError, models::FunctionUnitVersion};

const COLUMNS: &str = "id, name, version, is_active, deployed_at, process_definition_key, \
     previous_version_id, metadata, process_definition_id, deployment_id";

/// Fetch a single version by its primary key.
pub async fn find_version(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<FunctionUnitVersion>, DbError> {
    let row = sqlx::query_as::<_, FunctionUnitVersion>(&format!(
        "SELECT {COLUMNS} FROM function_unit_versions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

pub async fn find_active_version(
    conn: &mut PgConnection,
    name: &str,
) -> Result<Option<FunctionUnitVersion>, DbError> {
    let row = sqlx::query_as::<_, FunctionUnitVersion>(&format!(
        "SELECT {COLUMNS} FROM function_unit_versions \
         WHERE name = $1 AND is_active \
         ORDER BY deployed_at DESC LIMIT 1"
    ))
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

/// All versions of `name`, newest deployment first.  The textual `version`
/// column does not sort semantically, so callers re-order.
pub async fn list_versions(
    conn: &mut PgConnection,
    name: &str,
) -> Result<Vec<FunctionUnitVersion>, DbError> {
    let rows = sqlx::query_as::<_, FunctionUnitVersion>(&format!(
        "SELECT {COLUMNS} FROM function_unit_versions WHERE name = $1 ORDER BY deployed_at DESC"
    ))
    .bind(name)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

pub async fn version_exists(
    conn: &mut PgConnection,
    name: &str,
    version: &str,
) -> Result<bool, DbError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM function_unit_versions WHERE name = $1 AND version = $2)",
    )
    .bind(name)
    .bind(version)
    .fetch_one(&mut *conn)
    .await?;

    Ok(exists)
}

/// Insert a new version row.
///
/// The `(name, version)` unique constraint turns a concurrent duplicate into
/// [`DbError::DuplicateVersion`].
pub async fn insert_version(
    conn: &mut PgConnection,
    version: &FunctionUnitVersion,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO function_unit_versions
            (id, name, version, is_active, deployed_at, process_definition_key,
             previous_version_id, metadata, process_definition_id, deployment_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(version.id)
    .bind(&version.name)
    .bind(&version.version)
    .bind(version.is_active)
    .bind(version.deployed_at)
    .bind(&version.process_definition_key)
    .bind(version.previous_version_id)
    .bind(&version.metadata)
    .bind(&version.process_definition_id)
    .bind(&version.deployment_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => DbError::DuplicateVersion {
            name: version.name.clone(),
            version: version.version.clone(),
        },
        other => DbError::Sqlx(other),
    })?;

    Ok(())
}

pub async fn set_version_active(
    conn: &mut PgConnection,
    id: Uuid,
    active: bool,
) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE function_unit_versions SET is_active = $1 WHERE id = $2")
        .bind(active)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                DbError::Constraint(format!("a second active version for the unit of {id}"))
            }
            other => DbError::Sqlx(other),
        })?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

pub async fn record_deployment(
    conn: &mut PgConnection,
    id: Uuid,
    process_definition_id: &str,
    deployment_id: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE function_unit_versions \
         SET process_definition_id = $1, deployment_id = $2 WHERE id = $3",
    )
    .bind(process_definition_id)
    .bind(deployment_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// `SELECT … FOR UPDATE` over every version of `name`.
pub async fn lock_versions(conn: &mut PgConnection, name: &str) -> Result<(), DbError> {
    sqlx::query("SELECT id FROM function_unit_versions WHERE name = $1 FOR UPDATE")
        .bind(name)
        .fetch_all(&mut *conn)
        .await?;
    Ok(())
}

/// Permanently delete a version by its primary key.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_version(conn: &mut PgConnection, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM function_unit_versions WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                DbError::Constraint(format!("version {id} still has dependent rows"))
            }
            other => DbError::Sqlx(other),
        })?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
