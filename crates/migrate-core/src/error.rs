//! 에러 타입 정의.

use std::path::PathBuf;

use thiserror::Error;

/// 마이그레이션 실행 에러
///
/// 어떤 변형이든 실행 전체를 중단시키며, 감싸고 있는 트랜잭션은 롤백됩니다.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// 다른 실행이 advisory lock을 보유 중 (나중에 재시도 가능)
    #[error("다른 마이그레이션이 실행 중입니다 (advisory lock {lock_id})")]
    LockContention { lock_id: i64 },

    /// 이미 적용된 스크립트의 내용이 변경됨
    #[error("적용된 마이그레이션이 변경되었습니다: {name} (기록: {recorded}, 현재: {current})")]
    DriftDetected {
        name: String,
        recorded: String,
        current: String,
    },

    /// 스크립트 실행 실패
    #[error("마이그레이션 실행 실패 [{name}]: {cause}")]
    ExecutionFailure {
        name: String,
        #[source]
        cause: sqlx::Error,
    },

    /// 데이터베이스 연결/통신 실패
    #[error("데이터베이스 에러 ({stage}): {source}")]
    Connection {
        stage: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// 마이그레이션 디렉토리/파일 읽기 실패
    #[error("마이그레이션 소스 에러 {path:?}: {reason}")]
    Catalog { path: PathBuf, reason: String },

    /// 외부 취소 요청
    #[error("마이그레이션이 취소되었습니다 ({stage})")]
    Cancelled { stage: &'static str },

    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),
}

impl MigrateError {
    /// 연결 에러 생성 헬퍼
    pub fn connection(stage: &'static str, source: sqlx::Error) -> Self {
        Self::Connection { stage, source }
    }

    /// 자동 재시도 없이 나중에 다시 실행하면 성공할 수 있는 에러인지
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockContention { .. })
    }

    /// 문제가 된 스크립트 이름
    pub fn script_name(&self) -> Option<&str> {
        match self {
            Self::DriftDetected { name, .. } | Self::ExecutionFailure { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// `sqlx::Error`에 실행 단계를 붙이는 확장 트레이트
pub trait StageExt<T> {
    fn stage(self, stage: &'static str) -> Result<T>;
}

impl<T> StageExt<T> for std::result::Result<T, sqlx::Error> {
    fn stage(self, stage: &'static str) -> Result<T> {
        self.map_err(|e| MigrateError::connection(stage, e))
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, MigrateError>;
