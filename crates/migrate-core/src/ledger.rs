//! 적용 이력(ledger) 테이블 스키마와 쿼리.
//!
//! 이력은 추가만 가능합니다. 엔진은 행을 UPDATE/DELETE 하지 않습니다.

use sqlx::PgExecutor;

use crate::models::LedgerEntry;

/// 이력 테이블 이름
pub const LEDGER_TABLE: &str = "schema_migrations";

/// 이력 테이블 생성 (이미 있으면 무시)
pub async fn ensure_table<'e, E>(executor: E) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            fingerprint CHAR(64) NOT NULL
        )
        "#,
    )
    .execute(executor)
    .await?;

    Ok(())
}

/// 이력 테이블 존재 여부 (읽기 전용 조회용)
pub async fn table_exists<'e, E>(executor: E) -> Result<bool, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
        .bind(LEDGER_TABLE)
        .fetch_one(executor)
        .await
}

/// 전체 이력 조회 (적용 순서)
pub async fn load_entries<'e, E>(executor: E) -> Result<Vec<LedgerEntry>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, LedgerEntry>(
        r#"
        SELECT id, name, fingerprint, applied_at
        FROM schema_migrations
        ORDER BY id
        "#,
    )
    .fetch_all(executor)
    .await
}

/// 이력 추가
pub async fn insert_entry<'e, E>(
    executor: E,
    name: &str,
    fingerprint: &str,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO schema_migrations (name, fingerprint)
        VALUES ($1, $2)
        "#,
    )
    .bind(name)
    .bind(fingerprint)
    .execute(executor)
    .await?;

    Ok(())
}
