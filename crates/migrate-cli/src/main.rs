//! 스키마 마이그레이션 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # DATABASE_URL 또는 PGHOST/PGUSER/PGPASSWORD/PGDATABASE 사용
//! migrate run --dir migrations
//! migrate status --format json
//! migrate verify
//! ```
//!
//! 성공 시 종료 코드 0, 다른 실행이 잠금을 보유 중이면 75, 그 외 실패는 1.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::migrate::{exit_code, run_apply, run_status, run_verify, OutputFormat};
use config::MigrateConfig;
use migrate_core::Result;

#[derive(Parser)]
#[command(name = "migrate")]
#[command(about = "Transactional schema migration runner for PostgreSQL", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 마이그레이션 디렉토리
    #[arg(long, global = true, default_value = "migrations")]
    dir: PathBuf,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// 로그 형식
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// 미적용 마이그레이션 적용 (전체가 하나의 트랜잭션)
    Run,

    /// 스크립트별 적용 상태 조회 (읽기 전용)
    Status {
        /// 출력 형식
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// 적용된 스크립트 변경 여부 검사 (읽기 전용)
    Verify,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// 로깅 초기화 (RUST_LOG 우선)
fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("migrate_core={},migrate_cli={}", log_level, log_level).into()
    });

    // 로그는 stderr, 결과 출력은 stdout
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

/// Ctrl+C 또는 SIGTERM 수신 시 취소 토큰을 취소합니다.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C 핸들러 설치 실패");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM 핸들러 설치 실패");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Ctrl+C 수신, 마이그레이션 중단"),
        _ = terminate => warn!("SIGTERM 수신, 마이그레이션 중단"),
        _ = cancel.cancelled() => return,
    }

    cancel.cancel();
}

/// 명령 실행
async fn dispatch(cli: Cli) -> Result<()> {
    let config = MigrateConfig::from_env(cli.dir)?;

    match cli.command {
        Commands::Run => {
            let cancel = CancellationToken::new();
            let signal = tokio::spawn(shutdown_signal(cancel.clone()));
            let result = run_apply(&config, cancel.clone()).await;
            // 시그널 대기 태스크 정리
            cancel.cancel();
            let _ = signal.await;
            result
        }
        Commands::Status { format } => run_status(&config, format).await,
        Commands::Verify => run_verify(&config).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    match dispatch(cli).await {
        Ok(()) => {
            info!("완료");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "마이그레이션 실패");
            eprintln!("error: {}", e);
            exit_code(&e)
        }
    }
}
