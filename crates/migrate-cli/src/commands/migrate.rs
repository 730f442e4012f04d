//! 마이그레이션 CLI 명령어.
//!
//! # 사용법
//!
//! ```bash
//! # 미적용 마이그레이션 적용
//! migrate run --dir migrations
//!
//! # 적용 상태 확인 (읽기 전용)
//! migrate status
//! migrate status --format json
//!
//! # 적용된 스크립트 변경 여부만 검사
//! migrate verify
//! ```

use std::process::ExitCode;

use clap::ValueEnum;
use migrate_core::{inspect, MigrateError, MigrationCatalog, Migrator, PgStore, Result};
use tokio_util::sync::CancellationToken;

use crate::config::MigrateConfig;

/// 재시도 가능한 실패(잠금 경합)의 종료 코드 (EX_TEMPFAIL)
pub const EXIT_LOCK_CONTENTION: u8 = 75;

/// 상태 출력 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// 표
    Table,
    /// JSON
    Json,
}

/// 에러별 프로세스 종료 코드
pub fn exit_code(err: &MigrateError) -> ExitCode {
    ExitCode::from(exit_status(err))
}

fn exit_status(err: &MigrateError) -> u8 {
    if err.is_retryable() {
        EXIT_LOCK_CONTENTION
    } else {
        1
    }
}

/// 연결 후 저장소/카탈로그 준비
async fn prepare(config: &MigrateConfig) -> Result<(PgStore, MigrationCatalog)> {
    tracing::debug!(
        database = %config.database.display_target(),
        dir = ?config.migrations_dir,
        "설정 로드 완료"
    );

    let pool = config.database.connect().await?;
    Ok((PgStore::new(pool), MigrationCatalog::new(&config.migrations_dir)))
}

/// 마이그레이션 적용
pub async fn run_apply(config: &MigrateConfig, cancel: CancellationToken) -> Result<()> {
    let (store, catalog) = prepare(config).await?;

    let migrator = Migrator::new(store, catalog).with_cancellation(cancel);
    let result = migrator.run().await;
    migrator.store().pool().close().await;

    let summary = result?;
    if summary.applied.is_empty() {
        println!("✅ 적용할 마이그레이션이 없습니다 ({} 개 적용됨)", summary.skipped);
    } else {
        println!("✅ {} 개 마이그레이션 적용 완료", summary.applied_count());
        for name in &summary.applied {
            println!("   - {}", name);
        }
    }
    if summary.orphaned > 0 {
        println!("⚠️ 파일이 없는 이력 항목: {} 개", summary.orphaned);
    }

    Ok(())
}

/// 마이그레이션 상태 확인
pub async fn run_status(config: &MigrateConfig, format: OutputFormat) -> Result<()> {
    let (store, catalog) = prepare(config).await?;
    let report = inspect(&store, &catalog).await;
    store.pool().close().await;
    let report = report?;

    match format {
        OutputFormat::Table => {
            if !report.ledger_initialized {
                println!("(이력 테이블 없음: 아직 한 번도 실행되지 않았습니다)");
            }
            println!("{}", report);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| MigrateError::Config(format!("JSON 직렬화 실패: {}", e)))?;
            println!("{}", json);
        }
    }

    Ok(())
}

/// 적용된 스크립트 drift 검증
pub async fn run_verify(config: &MigrateConfig) -> Result<()> {
    let (store, catalog) = prepare(config).await?;
    let report = inspect(&store, &catalog).await;
    store.pool().close().await;
    let report = report?;

    for script in report.drifted() {
        eprintln!("❌ 변경됨: {}", script.name);
    }
    report.verify()?;

    println!(
        "✅ 검증 통과: {} 개 적용, {} 개 대기",
        report.applied_count(),
        report.pending_count()
    );
    Ok(())
}
