//! 스크립트 fingerprint 계산 및 변경(drift) 검출.
//!
//! 적용된 스크립트는 원문 바이트의 SHA-256으로 기록되며, 이후 실행에서
//! 한 바이트라도 달라지면 실행 전체를 중단합니다.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::error::{MigrateError, Result};
use crate::models::{LedgerEntry, MigrationScript};

/// fingerprint 문자열 길이 (SHA-256 hex)
pub const FINGERPRINT_LEN: usize = 64;

/// 내용의 SHA-256 (소문자 hex)
pub fn fingerprint(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// 단일 스크립트 drift 검사
///
/// 이력이 없으면 아직 적용 전이므로 통과합니다.
pub fn check_drift(script: &MigrationScript, entry: Option<&LedgerEntry>) -> Result<()> {
    let Some(entry) = entry else {
        return Ok(());
    };

    // CHAR(64) 컬럼은 공백 패딩될 수 있음
    if entry.fingerprint.trim_end() == script.fingerprint {
        return Ok(());
    }

    Err(MigrateError::DriftDetected {
        name: script.name.clone(),
        recorded: entry.fingerprint.trim_end().to_string(),
        current: script.fingerprint.clone(),
    })
}

/// 변경 없이 모든 스크립트를 검사 (카탈로그 순서상 첫 drift 반환)
pub fn check_all(scripts: &[MigrationScript], ledger: &HashMap<String, LedgerEntry>) -> Result<()> {
    for script in scripts {
        check_drift(script, ledger.get(&script.name))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;

    use super::*;

    fn script(name: &str, content: &str) -> MigrationScript {
        MigrationScript::new(name, PathBuf::from(name), content)
    }

    fn entry(name: &str, fingerprint: &str) -> LedgerEntry {
        LedgerEntry {
            id: 1,
            name: name.to_string(),
            fingerprint: fingerprint.to_string(),
            applied_at: Utc::now(),
        }
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(fingerprint(b"abc").len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_single_byte_change_detected() {
        assert_ne!(
            fingerprint(b"CREATE TABLE t (id INT);"),
            fingerprint(b"CREATE TABLE t (id INT); ")
        );
    }

    #[test]
    fn test_unapplied_script_passes() {
        let s = script("002_add.sql", "ALTER TABLE t ADD COLUMN c INT;");
        assert!(check_drift(&s, None).is_ok());
    }

    #[test]
    fn test_matching_entry_passes() {
        let s = script("001_init.sql", "CREATE TABLE t (id INT);");
        let e = entry("001_init.sql", &s.fingerprint);
        assert!(check_drift(&s, Some(&e)).is_ok());
    }

    #[test]
    fn test_padded_entry_passes() {
        let s = script("001_init.sql", "CREATE TABLE t (id INT);");
        let e = entry("001_init.sql", &format!("{}  ", s.fingerprint));
        assert!(check_drift(&s, Some(&e)).is_ok());
    }

    #[test]
    fn test_mismatch_is_drift() {
        let original = script("001_init.sql", "CREATE TABLE t (id INT);");
        let edited = script("001_init.sql", "CREATE TABLE t (id BIGINT);");
        let e = entry("001_init.sql", &original.fingerprint);

        let err = check_drift(&edited, Some(&e)).unwrap_err();
        match err {
            MigrateError::DriftDetected {
                name,
                recorded,
                current,
            } => {
                assert_eq!(name, "001_init.sql");
                assert_eq!(recorded, original.fingerprint);
                assert_eq!(current, edited.fingerprint);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_check_all_reports_first_drift_in_order() {
        let a = script("001_a.sql", "A2");
        let b = script("002_b.sql", "B2");
        let mut ledger = HashMap::new();
        ledger.insert(a.name.clone(), entry(&a.name, &fingerprint(b"A1")));
        ledger.insert(b.name.clone(), entry(&b.name, &fingerprint(b"B1")));

        let err = check_all(&[a, b], &ledger).unwrap_err();
        assert_eq!(err.script_name(), Some("001_a.sql"));
    }
}
