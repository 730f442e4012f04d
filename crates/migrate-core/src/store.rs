//! 마이그레이션 저장소 추상화.
//!
//! 엔진은 트랜잭션, savepoint, 트랜잭션 범위 advisory lock을 지원하는
//! 저장소라면 어디서든 동작합니다. 운영 구현은 PostgreSQL(`PgStore`)입니다.

use async_trait::async_trait;
use sqlx::{Executor, PgPool, Postgres, Transaction};

use crate::error::{Result, StageExt};
use crate::ledger;
use crate::models::LedgerEntry;

/// 세션 단위 DB 결과 (단계 정보는 호출자가 붙임)
pub type DbResult<T> = std::result::Result<T, sqlx::Error>;

/// 세션(트랜잭션)을 여는 저장소
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// SERIALIZABLE 트랜잭션 시작
    async fn begin(&self) -> Result<Box<dyn MigrationSession>>;

    /// 이력 읽기 (트랜잭션/잠금 없음). 테이블이 없으면 `None`.
    async fn read_ledger(&self) -> Result<Option<Vec<LedgerEntry>>>;
}

/// 한 번의 실행 동안 열려 있는 트랜잭션
///
/// 커밋 없이 drop되면 트랜잭션은 롤백되고 advisory lock도 해제됩니다.
#[async_trait]
pub trait MigrationSession: Send {
    /// 이력 테이블 보장
    async fn ensure_ledger(&mut self) -> DbResult<()>;

    /// 트랜잭션 범위 advisory lock 시도 (대기하지 않음)
    async fn try_advisory_lock(&mut self, lock_id: i64) -> DbResult<bool>;

    /// 전체 이력 조회
    async fn ledger_entries(&mut self) -> DbResult<Vec<LedgerEntry>>;

    /// 이력 추가
    async fn record(&mut self, name: &str, fingerprint: &str) -> DbResult<()>;

    /// 스크립트 원문 실행 (여러 문장 가능)
    async fn execute_script(&mut self, sql: &str) -> DbResult<()>;

    async fn savepoint(&mut self, name: &str) -> DbResult<()>;

    async fn release_savepoint(&mut self, name: &str) -> DbResult<()>;

    async fn rollback_to_savepoint(&mut self, name: &str) -> DbResult<()>;

    async fn commit(self: Box<Self>) -> DbResult<()>;

    async fn rollback(self: Box<Self>) -> DbResult<()>;
}

/// PostgreSQL 저장소
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MigrationStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn MigrationSession>> {
        let mut tx = self.pool.begin().await.stage("begin")?;

        // 트랜잭션의 첫 문장이어야 함
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .stage("begin")?;

        Ok(Box::new(PgSession { tx }))
    }

    async fn read_ledger(&self) -> Result<Option<Vec<LedgerEntry>>> {
        if !ledger::table_exists(&self.pool).await.stage("ledger")? {
            return Ok(None);
        }
        let entries = ledger::load_entries(&self.pool).await.stage("ledger")?;
        Ok(Some(entries))
    }
}

/// PostgreSQL 트랜잭션 세션
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl MigrationSession for PgSession {
    async fn ensure_ledger(&mut self) -> DbResult<()> {
        ledger::ensure_table(&mut *self.tx).await
    }

    async fn try_advisory_lock(&mut self, lock_id: i64) -> DbResult<bool> {
        sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(lock_id)
            .fetch_one(&mut *self.tx)
            .await
    }

    async fn ledger_entries(&mut self) -> DbResult<Vec<LedgerEntry>> {
        ledger::load_entries(&mut *self.tx).await
    }

    async fn record(&mut self, name: &str, fingerprint: &str) -> DbResult<()> {
        ledger::insert_entry(&mut *self.tx, name, fingerprint).await
    }

    async fn execute_script(&mut self, sql: &str) -> DbResult<()> {
        // 바인드 인자가 없으면 simple query 프로토콜: 한 스크립트에 여러 문장 허용
        self.tx.execute(sql).await?;
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> DbResult<()> {
        self.tx
            .execute(format!("SAVEPOINT {}", name).as_str())
            .await?;
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.tx
            .execute(format!("RELEASE SAVEPOINT {}", name).as_str())
            .await?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.tx
            .execute(format!("ROLLBACK TO SAVEPOINT {}", name).as_str())
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        let session = *self;
        session.tx.commit().await
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        let session = *self;
        session.tx.rollback().await
    }
}
