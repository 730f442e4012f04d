//! 테스트용 인메모리 저장소.
//!
//! 트랜잭션은 커밋된 상태의 스냅샷 복사본으로, savepoint는 스냅샷 스택으로
//! 흉내 냅니다. `INVALID`를 포함한 문장은 실행 에러가 됩니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{MigrateError, Result};
use crate::models::LedgerEntry;
use crate::store::{DbResult, MigrationSession, MigrationStore};

type ExecuteHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct Snapshot {
    ledger_exists: bool,
    entries: Vec<LedgerEntry>,
    schema: Vec<String>,
    next_id: i64,
}

#[derive(Debug, Default)]
struct Shared {
    committed: Snapshot,
    /// 잠금 ID → 보유 세션
    lock_holders: HashMap<i64, u64>,
    next_session: u64,
    unavailable: bool,
    fail_commit: bool,
}

/// 인메모리 저장소
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
    execute_hook: Option<ExecuteHook>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 스크립트 실행 직전에 호출되는 콜백 설정
    pub fn with_execute_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.execute_hook = Some(Arc::new(hook));
        self
    }

    /// 커밋된 스키마 (실행된 문장 목록)
    pub fn schema(&self) -> Vec<String> {
        self.shared.lock().unwrap().committed.schema.clone()
    }

    /// 커밋된 이력
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.shared.lock().unwrap().committed.entries.clone()
    }

    /// advisory lock 보유 여부 (ID 무관)
    pub fn is_locked(&self) -> bool {
        !self.shared.lock().unwrap().lock_holders.is_empty()
    }

    /// 이전 실행에서 적용된 것처럼 이력 추가
    pub fn seed_entry(&self, name: &str, fingerprint: &str) {
        let mut shared = self.shared.lock().unwrap();
        let committed = &mut shared.committed;
        committed.ledger_exists = true;
        committed.next_id += 1;
        let id = committed.next_id;
        committed.entries.push(LedgerEntry {
            id,
            name: name.to_string(),
            fingerprint: fingerprint.to_string(),
            applied_at: Utc::now(),
        });
    }

    /// 커밋 시 직렬화 실패 발생 여부
    pub fn set_commit_failure(&self, fail: bool) {
        self.shared.lock().unwrap().fail_commit = fail;
    }

    /// 연결 불가 상태 전환
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.lock().unwrap().unavailable = unavailable;
    }
}

#[async_trait]
impl MigrationStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn MigrationSession>> {
        let mut shared = self.shared.lock().unwrap();
        if shared.unavailable {
            return Err(MigrateError::connection("begin", sqlx::Error::PoolTimedOut));
        }
        shared.next_session += 1;

        Ok(Box::new(MemorySession {
            id: shared.next_session,
            shared: Arc::clone(&self.shared),
            working: shared.committed.clone(),
            savepoints: Vec::new(),
            execute_hook: self.execute_hook.clone(),
        }))
    }

    async fn read_ledger(&self) -> Result<Option<Vec<LedgerEntry>>> {
        let shared = self.shared.lock().unwrap();
        if shared.unavailable {
            return Err(MigrateError::connection("ledger", sqlx::Error::PoolTimedOut));
        }
        let committed = &shared.committed;
        Ok(committed.ledger_exists.then(|| committed.entries.clone()))
    }
}

struct MemorySession {
    id: u64,
    shared: Arc<Mutex<Shared>>,
    working: Snapshot,
    savepoints: Vec<(String, Snapshot)>,
    execute_hook: Option<ExecuteHook>,
}

impl MemorySession {
    fn release_lock(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.lock_holders.retain(|_, holder| *holder != self.id);
    }

    fn savepoint_index(&self, name: &str) -> DbResult<usize> {
        self.savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| sqlx::Error::Protocol(format!("savepoint \"{}\" does not exist", name)))
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.release_lock();
    }
}

#[async_trait]
impl MigrationSession for MemorySession {
    async fn ensure_ledger(&mut self) -> DbResult<()> {
        self.working.ledger_exists = true;
        Ok(())
    }

    async fn try_advisory_lock(&mut self, lock_id: i64) -> DbResult<bool> {
        let mut shared = self.shared.lock().unwrap();
        let holder = *shared.lock_holders.entry(lock_id).or_insert(self.id);
        Ok(holder == self.id)
    }

    async fn ledger_entries(&mut self) -> DbResult<Vec<LedgerEntry>> {
        if !self.working.ledger_exists {
            return Err(sqlx::Error::Protocol(
                "relation \"schema_migrations\" does not exist".to_string(),
            ));
        }
        Ok(self.working.entries.clone())
    }

    async fn record(&mut self, name: &str, fingerprint: &str) -> DbResult<()> {
        if self.working.entries.iter().any(|e| e.name == name) {
            return Err(sqlx::Error::Protocol(format!(
                "duplicate key value violates unique constraint: {}",
                name
            )));
        }
        self.working.next_id += 1;
        self.working.entries.push(LedgerEntry {
            id: self.working.next_id,
            name: name.to_string(),
            fingerprint: fingerprint.to_string(),
            applied_at: Utc::now(),
        });
        Ok(())
    }

    async fn execute_script(&mut self, sql: &str) -> DbResult<()> {
        if let Some(hook) = &self.execute_hook {
            hook.as_ref()(sql);
        }
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            if statement.contains("INVALID") {
                return Err(sqlx::Error::Protocol(format!(
                    "syntax error at or near \"{}\"",
                    statement
                )));
            }
            self.working.schema.push(statement.to_string());
        }
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> DbResult<()> {
        self.savepoints.push((name.to_string(), self.working.clone()));
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> DbResult<()> {
        let index = self.savepoint_index(name)?;
        self.savepoints.truncate(index);
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> DbResult<()> {
        let index = self.savepoint_index(name)?;
        self.working = self.savepoints[index].1.clone();
        self.savepoints.truncate(index + 1);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        let mut shared = self.shared.lock().unwrap();
        if shared.fail_commit {
            return Err(sqlx::Error::Protocol(
                "could not serialize access due to read/write dependencies among transactions"
                    .to_string(),
            ));
        }
        shared.committed = self.working.clone();
        // 잠금은 Drop에서 해제 (guard가 먼저 drop됨)
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        Ok(())
    }
}
