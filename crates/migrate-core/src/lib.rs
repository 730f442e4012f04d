//! 트랜잭션 기반 스키마 마이그레이션 엔진.
//!
//! 디렉토리의 SQL 스크립트를 파일명 순서대로 정확히 한 번씩 적용합니다.
//!
//! - 실행 전체가 하나의 SERIALIZABLE 트랜잭션: 실패하면 아무것도 남지 않음
//! - 트랜잭션 범위 advisory lock으로 동시 실행 차단 (대기 없이 즉시 실패)
//! - 적용된 스크립트의 SHA-256을 기록해 이후 변경(drift)을 치명적 에러로 처리
//!
//! # 사용 예시
//!
//! ```ignore
//! use migrate_core::{MigrationCatalog, Migrator, PgStore};
//!
//! let pool = sqlx::PgPool::connect(&database_url).await?;
//! let migrator = Migrator::new(PgStore::new(pool), MigrationCatalog::new("migrations"));
//! let summary = migrator.run().await?;
//! println!("{} 개 적용", summary.applied_count());
//! ```

pub mod catalog;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod ledger;
pub mod lock;
pub mod models;
pub mod orchestrator;
pub mod status;
pub mod store;

#[cfg(test)]
mod memory;

pub use catalog::MigrationCatalog;
pub use error::{MigrateError, Result};
pub use lock::MIGRATION_LOCK_ID;
pub use models::{LedgerEntry, MigrationScript, RunState, RunSummary};
pub use orchestrator::{Migrator, RunContext};
pub use status::{inspect, ScriptState, ScriptStatus, StatusReport};
pub use store::{MigrationSession, MigrationStore, PgSession, PgStore};
