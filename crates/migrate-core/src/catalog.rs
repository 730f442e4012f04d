//! 마이그레이션 스크립트 카탈로그.
//!
//! 디렉토리의 `.sql` 파일을 읽어 파일명 바이트 순서로 정렬합니다.
//! 적용 순서는 오직 파일명으로 결정되므로 `001_`, `20240101_` 같은
//! 고정 폭 접두사를 사용해야 합니다.

use std::{fs, path::Path, path::PathBuf};

use crate::error::{MigrateError, Result};
use crate::models::MigrationScript;

/// 마이그레이션 파일 확장자
const SCRIPT_EXTENSION: &str = "sql";

/// 디렉토리 기반 스크립트 카탈로그
#[derive(Debug, Clone)]
pub struct MigrationCatalog {
    dir: PathBuf,
}

impl MigrationCatalog {
    /// 새 카탈로그 생성
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 스크립트 디렉토리
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 전체 스크립트를 적용 순서대로 반환
    ///
    /// 하위 디렉토리와 `.sql`이 아닌 파일은 무시합니다.
    /// 읽기 실패는 복구하지 않고 그대로 에러로 반환합니다.
    pub fn list(&self) -> Result<Vec<MigrationScript>> {
        if !self.dir.is_dir() {
            return Err(self.error(&self.dir, "디렉토리가 존재하지 않습니다".to_string()));
        }

        let entries = fs::read_dir(&self.dir)
            .map_err(|e| self.error(&self.dir, format!("디렉토리 읽기 실패: {}", e)))?;

        let mut scripts = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| self.error(&self.dir, format!("디렉토리 읽기 실패: {}", e)))?;
            let path = entry.path();

            if !path.is_file() || !path.extension().is_some_and(|e| e == SCRIPT_EXTENSION) {
                continue;
            }

            scripts.push(self.read_script(&path)?);
        }

        sort_scripts(&mut scripts);

        tracing::debug!(dir = ?self.dir, count = scripts.len(), "마이그레이션 스크립트 스캔 완료");

        Ok(scripts)
    }

    /// 단일 스크립트 읽기
    fn read_script(&self, path: &Path) -> Result<MigrationScript> {
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| self.error(path, "파일명이 UTF-8이 아닙니다".to_string()))?
            .to_string();

        let bytes = fs::read(path).map_err(|e| self.error(path, format!("파일 읽기 실패: {}", e)))?;
        let content = String::from_utf8(bytes)
            .map_err(|e| self.error(path, format!("UTF-8 텍스트가 아닙니다: {}", e)))?;

        Ok(MigrationScript::new(name, path.to_path_buf(), content))
    }

    fn error(&self, path: &Path, reason: String) -> MigrateError {
        MigrateError::Catalog {
            path: path.to_path_buf(),
            reason,
        }
    }
}

/// 파일명 바이트 사전순 정렬
pub fn sort_scripts(scripts: &mut [MigrationScript]) {
    scripts.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
}
