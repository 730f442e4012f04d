//! 마이그레이션 실행 오케스트레이터.
//!
//! # 실행 순서
//!
//! 1. SERIALIZABLE 트랜잭션 하나를 연다
//! 2. advisory lock 획득 (실패 시 `LockContention`)
//! 3. 이력 테이블 보장
//! 4. 적용된 모든 스크립트의 fingerprint 사전 검사 (drift 시 중단)
//! 5. 미적용 스크립트를 이름 순으로 하나씩 적용
//! 6. 모두 성공하면 커밋, 하나라도 실패하면 전체 롤백
//!
//! 실패한 실행은 스키마와 이력을 실행 전 상태 그대로 남깁니다.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::catalog::MigrationCatalog;
use crate::error::{MigrateError, Result, StageExt};
use crate::executor;
use crate::fingerprint;
use crate::lock::{self, MIGRATION_LOCK_ID};
use crate::models::{LedgerEntry, MigrationScript, RunState, RunSummary};
use crate::store::{MigrationSession, MigrationStore};

/// 한 번의 실행 동안만 존재하는 컨텍스트
///
/// 세션은 `commit` 또는 `abort`로만 소비됩니다. 중간에 drop되면
/// 트랜잭션은 롤백됩니다.
pub struct RunContext {
    session: Box<dyn MigrationSession>,
    state: RunState,
    pending: Vec<MigrationScript>,
    applied: Vec<String>,
}

impl RunContext {
    fn new(session: Box<dyn MigrationSession>) -> Self {
        Self {
            session,
            state: RunState::Idle,
            pending: Vec::new(),
            applied: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        log_transition(self.state, next);
        self.state = next;
    }

    /// 커밋이 성공해야 `Committed`. SERIALIZABLE 커밋은 직렬화 실패(40001)로
    /// 거부될 수 있고, 이 경우 서버가 트랜잭션을 이미 롤백한 상태다.
    async fn commit(self) -> Result<Vec<String>> {
        let Self {
            session,
            state,
            applied,
            ..
        } = self;

        match session.commit().await {
            Ok(()) => {
                log_transition(state, RunState::Committed);
                Ok(applied)
            }
            Err(e) => {
                log_transition(state, RunState::Aborted);
                tracing::warn!(state = %state, error = %e, "커밋 실패, 트랜잭션 롤백됨");
                Err(MigrateError::connection("commit", e))
            }
        }
    }

    async fn abort(mut self, reason: &MigrateError) {
        let at = self.state;
        self.transition(RunState::Aborted);
        tracing::warn!(state = %at, error = %reason, "마이그레이션 중단, 트랜잭션 롤백");
        if let Err(e) = self.session.rollback().await {
            // 연결이 끊긴 경우 서버가 트랜잭션을 정리한다
            tracing::warn!(error = %e, "롤백 실패");
        }
    }
}

/// 마이그레이션 실행기
pub struct Migrator<S> {
    store: S,
    catalog: MigrationCatalog,
    lock_id: i64,
    cancel: CancellationToken,
}

impl<S: MigrationStore> Migrator<S> {
    /// 새 실행기 생성
    pub fn new(store: S, catalog: MigrationCatalog) -> Self {
        Self {
            store,
            catalog,
            lock_id: MIGRATION_LOCK_ID,
            cancel: CancellationToken::new(),
        }
    }

    /// 외부 취소 토큰 연결
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// advisory lock ID 변경 (테스트 DB 격리용)
    pub fn with_lock_id(mut self, lock_id: i64) -> Self {
        self.lock_id = lock_id;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// 미적용 스크립트를 모두 적용
    ///
    /// 진행 중인 DB 호출 도중 취소되면 future가 drop되면서 세션이 닫히고
    /// 서버가 트랜잭션을 롤백합니다.
    pub async fn run(&self) -> Result<RunSummary> {
        tokio::select! {
            biased;
            result = self.run_transaction() => result,
            _ = self.cancel.cancelled() => {
                tracing::warn!("취소 요청 수신, 진행 중인 트랜잭션 폐기");
                Err(MigrateError::Cancelled { stage: "interrupt" })
            }
        }
    }

    async fn run_transaction(&self) -> Result<RunSummary> {
        let start = Instant::now();
        self.checkpoint("begin")?;

        tracing::info!(dir = ?self.catalog.dir(), "마이그레이션 시작");

        let session = self.store.begin().await?;
        let mut ctx = RunContext::new(session);

        match self.drive(&mut ctx).await {
            Ok(mut summary) => {
                summary.applied = ctx.commit().await?;
                summary.elapsed = start.elapsed();
                summary.log_summary("migrate run");
                Ok(summary)
            }
            Err(e) => {
                ctx.abort(&e).await;
                Err(e)
            }
        }
    }

    async fn drive(&self, ctx: &mut RunContext) -> Result<RunSummary> {
        self.checkpoint("lock")?;
        lock::acquire_or_fail(ctx.session.as_mut(), self.lock_id).await?;
        ctx.transition(RunState::LockAcquired);

        ctx.session.ensure_ledger().await.stage("ledger")?;

        self.checkpoint("validate")?;
        ctx.transition(RunState::Validating);

        let scripts = self.catalog.list()?;
        let ledger: HashMap<String, LedgerEntry> = ctx
            .session
            .ledger_entries()
            .await
            .stage("ledger")?
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect();

        // 어떤 변경보다도 먼저 전체 검사
        fingerprint::check_all(&scripts, &ledger)?;

        let orphaned = count_orphans(&scripts, &ledger);
        let (applied, pending): (Vec<_>, Vec<_>) = scripts
            .into_iter()
            .partition(|s| ledger.contains_key(&s.name));

        tracing::info!(
            total = applied.len() + pending.len(),
            pending = pending.len(),
            "fingerprint 검증 완료"
        );

        ctx.pending = pending;

        for index in 0..ctx.pending.len() {
            self.checkpoint("apply")?;
            let step = index + 1;
            ctx.transition(RunState::Applying(step));
            executor::apply(ctx.session.as_mut(), &ctx.pending[index], step).await?;
            ctx.applied.push(ctx.pending[index].name.clone());
        }

        self.checkpoint("commit")?;

        Ok(RunSummary {
            applied: Vec::new(),
            skipped: applied.len(),
            orphaned,
            elapsed: Default::default(),
        })
    }

    /// 단계 사이 취소 확인
    fn checkpoint(&self, stage: &'static str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MigrateError::Cancelled { stage });
        }
        Ok(())
    }
}

fn log_transition(from: RunState, to: RunState) {
    debug_assert!(
        from.can_transition_to(to),
        "invalid run state transition {} -> {}",
        from,
        to
    );
    tracing::debug!(from = %from, to = %to, "실행 상태 전이");
}

/// 디스크에 없는 이력 항목 수 (경고만 남기고 무시)
fn count_orphans(scripts: &[MigrationScript], ledger: &HashMap<String, LedgerEntry>) -> usize {
    let known: HashSet<&str> = scripts.iter().map(|s| s.name.as_str()).collect();
    let mut orphans: Vec<&str> = ledger
        .keys()
        .map(String::as_str)
        .filter(|name| !known.contains(name))
        .collect();
    orphans.sort_unstable();

    for name in &orphans {
        tracing::warn!(name = %name, "이력에는 있지만 스크립트 파일이 없습니다");
    }
    orphans.len()
}
