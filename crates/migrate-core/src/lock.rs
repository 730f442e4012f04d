//! 동시 실행 방지용 advisory lock.
//!
//! 잠금은 트랜잭션 범위(`pg_try_advisory_xact_lock`)라서 커밋/롤백 시
//! 자동으로 해제됩니다. 명시적으로 해제하지 않습니다.

use crate::error::{MigrateError, Result, StageExt};
use crate::store::MigrationSession;

/// 같은 데이터베이스를 대상으로 하는 모든 엔진이 공유하는 잠금 ID
pub const MIGRATION_LOCK_ID: i64 = 7_305_817_204_661;

/// 잠금 시도 (대기하지 않음)
pub async fn try_acquire(session: &mut dyn MigrationSession, lock_id: i64) -> Result<bool> {
    session.try_advisory_lock(lock_id).await.stage("lock")
}

/// 잠금 획득, 실패 시 `LockContention`
pub async fn acquire_or_fail(session: &mut dyn MigrationSession, lock_id: i64) -> Result<()> {
    if try_acquire(session, lock_id).await? {
        tracing::debug!(lock_id, "advisory lock 획득");
        Ok(())
    } else {
        tracing::warn!(lock_id, "다른 마이그레이션이 advisory lock을 보유 중");
        Err(MigrateError::LockContention { lock_id })
    }
}
