//! 읽기 전용 상태 조회 및 drift 검증.
//!
//! 트랜잭션이나 잠금 없이 이력을 읽기만 하므로 실행 중인 마이그레이션과
//! 동시에 호출해도 안전합니다. 이력 테이블이 없으면 모든 스크립트가 미적용입니다.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::MigrationCatalog;
use crate::error::{MigrateError, Result};
use crate::fingerprint;
use crate::models::LedgerEntry;
use crate::store::MigrationStore;

/// 스크립트별 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScriptState {
    /// 적용됨, 내용 일치
    Applied { applied_at: DateTime<Utc> },
    /// 미적용
    Pending,
    /// 적용 후 내용 변경됨
    Drifted { recorded: String, current: String },
}

/// 스크립트 상태 한 줄
#[derive(Debug, Clone, Serialize)]
pub struct ScriptStatus {
    pub name: String,
    pub fingerprint: String,
    #[serde(flatten)]
    pub state: ScriptState,
}

/// 전체 상태 보고서
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    /// 이력 테이블 존재 여부
    pub ledger_initialized: bool,
    /// 카탈로그 순서의 스크립트 상태
    pub scripts: Vec<ScriptStatus>,
    /// 파일이 없는 이력 항목
    pub orphaned: Vec<LedgerEntry>,
}

impl StatusReport {
    pub fn pending_count(&self) -> usize {
        self.count(|s| matches!(s, ScriptState::Pending))
    }

    pub fn applied_count(&self) -> usize {
        self.count(|s| matches!(s, ScriptState::Applied { .. }))
    }

    pub fn drifted(&self) -> impl Iterator<Item = &ScriptStatus> {
        self.scripts
            .iter()
            .filter(|s| matches!(s.state, ScriptState::Drifted { .. }))
    }

    pub fn has_drift(&self) -> bool {
        self.drifted().next().is_some()
    }

    /// 첫 drift를 `DriftDetected`로 반환
    pub fn verify(&self) -> Result<()> {
        match self.drifted().next() {
            Some(ScriptStatus {
                name,
                state: ScriptState::Drifted { recorded, current },
                ..
            }) => Err(MigrateError::DriftDetected {
                name: name.clone(),
                recorded: recorded.clone(),
                current: current.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn count(&self, pred: impl Fn(&ScriptState) -> bool) -> usize {
        self.scripts.iter().filter(|s| pred(&s.state)).count()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<48} {:<10} {}", "MIGRATION", "STATE", "DETAIL")?;
        writeln!(f, "{:-<90}", "")?;

        for script in &self.scripts {
            let (state, detail) = match &script.state {
                ScriptState::Applied { applied_at } => {
                    ("applied", applied_at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                }
                ScriptState::Pending => ("pending", String::new()),
                ScriptState::Drifted { recorded, .. } => {
                    // 손상된 이력 값도 그대로 보여줄 수 있도록 문자 단위로 자름
                    let short: String = recorded.chars().take(12).collect();
                    ("DRIFTED", format!("recorded {}", short))
                }
            };
            writeln!(f, "{:<48} {:<10} {}", script.name, state, detail)?;
        }

        for entry in &self.orphaned {
            writeln!(f, "{:<48} {:<10} {}", entry.name, "orphaned", "파일 없음")?;
        }

        writeln!(f, "{:-<90}", "")?;
        write!(
            f,
            "applied: {}, pending: {}, drifted: {}, orphaned: {}",
            self.applied_count(),
            self.pending_count(),
            self.drifted().count(),
            self.orphaned.len()
        )
    }
}

/// 카탈로그와 이력을 비교한 상태 보고서 생성
pub async fn inspect<S: MigrationStore + ?Sized>(
    store: &S,
    catalog: &MigrationCatalog,
) -> Result<StatusReport> {
    let scripts = catalog.list()?;
    let entries = store.read_ledger().await?;
    let ledger_initialized = entries.is_some();

    let ledger: HashMap<String, LedgerEntry> = entries
        .unwrap_or_default()
        .into_iter()
        .map(|e| (e.name.clone(), e))
        .collect();

    let known: HashSet<&str> = scripts.iter().map(|s| s.name.as_str()).collect();
    let mut orphaned: Vec<LedgerEntry> = ledger
        .values()
        .filter(|e| !known.contains(e.name.as_str()))
        .cloned()
        .collect();
    orphaned.sort_by_key(|e| e.id);

    let scripts = scripts
        .iter()
        .map(|script| {
            let entry = ledger.get(&script.name);
            let state = match (entry, fingerprint::check_drift(script, entry)) {
                (None, _) => ScriptState::Pending,
                (Some(entry), Ok(())) => ScriptState::Applied {
                    applied_at: entry.applied_at,
                },
                (Some(_), Err(MigrateError::DriftDetected {
                    recorded, current, ..
                })) => ScriptState::Drifted { recorded, current },
                (Some(_), Err(e)) => return Err(e),
            };
            Ok(ScriptStatus {
                name: script.name.clone(),
                fingerprint: script.fingerprint.clone(),
                state,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(StatusReport {
        ledger_initialized,
        scripts,
        orphaned,
    })
}
