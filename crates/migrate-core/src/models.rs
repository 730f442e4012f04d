//! 마이그레이션 엔진 데이터 모델.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::fingerprint::fingerprint;

/// 디스크에서 읽은 마이그레이션 스크립트
///
/// 파일명이 식별자이자 적용 순서입니다. 한 번 읽으면 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    /// 파일명 (예: 001_create_table.sql)
    pub name: String,
    /// 전체 경로
    pub path: PathBuf,
    /// 스크립트 원문
    pub content: String,
    /// 원문 바이트의 SHA-256 (hex)
    pub fingerprint: String,
}

impl MigrationScript {
    /// 새 스크립트 생성 (fingerprint는 내용에서 계산)
    pub fn new(name: impl Into<String>, path: PathBuf, content: impl Into<String>) -> Self {
        let content = content.into();
        let fingerprint = fingerprint(content.as_bytes());
        Self {
            name: name.into(),
            path,
            content,
            fingerprint,
        }
    }
}

/// 적용 이력 테이블의 한 행
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LedgerEntry {
    /// 대리 키
    pub id: i64,
    /// 스크립트 파일명 (UNIQUE)
    pub name: String,
    /// 적용 당시 fingerprint
    pub fingerprint: String,
    /// 적용 시각
    pub applied_at: DateTime<Utc>,
}

/// 한 번의 실행 상태
///
/// `Idle → LockAcquired → Validating → Applying(i) → Committed`
/// 진행 중 어느 단계에서든 `Aborted`로 전이할 수 있습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    LockAcquired,
    Validating,
    /// 1부터 시작하는 적용 순번
    Applying(usize),
    Committed,
    Aborted,
}

impl RunState {
    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Committed | RunState::Aborted)
    }

    /// `next`로의 전이가 허용되는지 확인
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, LockAcquired) | (Idle, Aborted) => true,
            (LockAcquired, Validating) | (LockAcquired, Aborted) => true,
            (Validating, Applying(1)) | (Validating, Committed) | (Validating, Aborted) => true,
            (Applying(i), Applying(j)) => j == i + 1,
            (Applying(_), Committed) | (Applying(_), Aborted) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::LockAcquired => write!(f, "lock_acquired"),
            RunState::Validating => write!(f, "validating"),
            RunState::Applying(i) => write!(f, "applying({})", i),
            RunState::Committed => write!(f, "committed"),
            RunState::Aborted => write!(f, "aborted"),
        }
    }
}

/// 성공한 실행 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// 이번 실행에서 적용된 스크립트 (적용 순서)
    pub applied: Vec<String>,
    /// 이미 적용되어 건너뛴 스크립트 수
    pub skipped: usize,
    /// 디스크에 없는 이력 항목 수
    pub orphaned: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunSummary {
    /// 적용된 스크립트 수
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            applied = self.applied.len(),
            skipped = self.skipped,
            orphaned = self.orphaned,
            elapsed = format!("{:.2}s", self.elapsed.as_secs_f64()),
            "마이그레이션 완료"
        );
    }
}
