//! 단일 스크립트 적용.
//!
//! 스크립트마다 savepoint를 열어 실패한 스크립트를 정확히 지목합니다.
//! 바깥 트랜잭션은 어차피 전체 롤백되므로 savepoint가 부분 진행을
//! 보존하지는 않습니다.

use crate::error::{MigrateError, Result, StageExt};
use crate::models::MigrationScript;
use crate::store::MigrationSession;

/// `step`번째 스크립트의 savepoint 이름
fn savepoint_name(step: usize) -> String {
    format!("migration_step_{}", step)
}

/// 스크립트 실행 + 이력 기록
///
/// 실행이나 기록이 실패하면 savepoint로 되돌린 뒤 원인 에러를 그대로 담아
/// `ExecutionFailure`를 반환합니다.
pub async fn apply(
    session: &mut dyn MigrationSession,
    script: &MigrationScript,
    step: usize,
) -> Result<()> {
    let savepoint = savepoint_name(step);
    session.savepoint(&savepoint).await.stage("savepoint")?;

    let outcome = match session.execute_script(&script.content).await {
        Ok(()) => session.record(&script.name, &script.fingerprint).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => {
            session
                .release_savepoint(&savepoint)
                .await
                .stage("release_savepoint")?;
            tracing::info!(name = %script.name, step, "마이그레이션 적용");
            Ok(())
        }
        Err(cause) => {
            tracing::error!(name = %script.name, step, error = %cause, "마이그레이션 실행 실패");
            // 진단용 복구. 바깥 트랜잭션은 호출자가 롤백한다.
            if let Err(e) = session.rollback_to_savepoint(&savepoint).await {
                tracing::warn!(name = %script.name, error = %e, "savepoint 롤백 실패");
            }
            Err(MigrateError::ExecutionFailure {
                name: script.name.clone(),
                cause,
            })
        }
    }
}
