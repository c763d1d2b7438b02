//! VL-012: Artifact store: stage1/stage2 path derivation, atomic publish, load.
//!
//! stage2 (the compiled [`Program`], JSON) is published first, then stage1 (the
//! dependency checks plus stage2's BLAKE3 hash, YAML). Each file goes through
//! temp-file-then-rename, so a reader sees either the old or the new file.

use super::fileio;
use super::types::{DependencySet, Program, Stage1};
use crate::cache::eventlog::now_iso8601;
use crate::cache::hasher;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Suffix appended to a stage1 path to name its stage2 sibling.
pub const STAGE2_SUFFIX: &str = "-stage2";

/// Stage1 schema version.
pub const STAGE1_SCHEMA: &str = "1.0";

/// Derive the stage2 path for a stage1 output path.
pub fn stage2_path(output: &Path) -> PathBuf {
    let mut s = OsString::from(output.as_os_str());
    s.push(STAGE2_SUFFIX);
    PathBuf::from(s)
}

/// Load a stage1 artifact. Returns None if it doesn't exist.
pub fn load_stage1(output: &Path) -> Result<Option<Stage1>, String> {
    if !output.exists() {
        return Ok(None);
    }
    let content = fileio::read_file(output)?;
    let stage1: Stage1 = serde_yaml_ng::from_str(&content)
        .map_err(|e| format!("invalid stage1 {}: {}", output.display(), e))?;
    Ok(Some(stage1))
}

/// Publish a compiled program: stage2 first, then the stage1 that vouches for it.
pub fn save_artifacts(
    output: &Path,
    program: &Program,
    dependencies: &DependencySet,
) -> Result<Stage1, String> {
    let stage2 = stage2_path(output);
    let body = serde_json::to_string_pretty(program)
        .map_err(|e| format!("serialize error {}: {}", stage2.display(), e))?;
    fileio::write_file(&stage2, &body)?;

    let stage1 = Stage1 {
        schema: STAGE1_SCHEMA.to_string(),
        template: program.template.clone(),
        generated_at: now_iso8601(),
        generator: format!("vellum {}", env!("CARGO_PKG_VERSION")),
        dependencies: dependencies.clone(),
        stage2,
        stage2_hash: hasher::hash_string(&body),
    };
    let yaml = render_stage1(&stage1)?;
    fileio::write_file(output, &yaml)?;
    Ok(stage1)
}

/// Stage1 YAML, preceded by the dependency checks it encodes as comments.
fn render_stage1(stage1: &Stage1) -> Result<String, String> {
    let yaml = serde_yaml_ng::to_string(stage1)
        .map_err(|e| format!("serialize error {}: {}", stage1.template, e))?;
    let mut out = format!("# vellum stage1 for template '{}'\n", stage1.template);
    for check in stage1.dependencies.checks() {
        out.push_str("# stale if ");
        out.push_str(&check);
        out.push('\n');
    }
    out.push_str(&yaml);
    Ok(out)
}

/// Load the stage2 program a stage1 points at, verifying its hash.
pub fn load_stage2(stage1: &Stage1) -> Result<Program, String> {
    let body = fileio::read_file(&stage1.stage2)?;
    let actual = hasher::hash_string(&body);
    if actual != stage1.stage2_hash {
        return Err(format!(
            "stage2 {} hash mismatch: expected {}, found {}",
            stage1.stage2.display(),
            stage1.stage2_hash,
            actual
        ));
    }
    serde_json::from_str(&body)
        .map_err(|e| format!("invalid stage2 {}: {}", stage1.stage2.display(), e))
}

/// Remove a stage1 artifact so the next load recompiles.
pub fn remove_stage1(output: &Path) -> Result<(), String> {
    fileio::remove_file(output)
}

/// Remove both artifacts of a pair.
pub fn remove_artifacts(output: &Path) -> Result<(), String> {
    fileio::remove_file(output)?;
    fileio::remove_file(&stage2_path(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Op;

    fn program() -> Program {
        Program {
            template: "index".to_string(),
            ops: vec![
                Op::Guard {
                    marker: "VELLUM".to_string(),
                },
                Op::Text {
                    text: "hello".to_string(),
                },
            ],
        }
    }

    fn deps() -> DependencySet {
        let mut deps = DependencySet::new();
        deps.record(Path::new("/t/index.tpl"), 100);
        deps.record(Path::new("/t/header.tpl"), 200);
        deps
    }

    #[test]
    fn test_vl012_stage2_path() {
        let p = stage2_path(Path::new("/cache/tpl-default-index-abc"));
        assert_eq!(p, PathBuf::from("/cache/tpl-default-index-abc-stage2"));
    }

    #[test]
    fn test_vl012_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("tpl-default-index-abc");
        let saved = save_artifacts(&output, &program(), &deps()).unwrap();
        assert!(saved.stage2_hash.starts_with("blake3:"));
        assert!(saved.generated_at.contains('T'));

        let loaded = load_stage1(&output).unwrap().unwrap();
        assert_eq!(loaded, saved);
        let keys: Vec<_> = loaded.dependencies.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(keys, vec![PathBuf::from("/t/index.tpl"), PathBuf::from("/t/header.tpl")]);

        assert_eq!(load_stage2(&loaded).unwrap(), program());
    }

    #[test]
    fn test_vl012_stage1_lists_checks() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        save_artifacts(&output, &program(), &deps()).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.contains("# stale if mtime(\"/t/header.tpl\") > 200"));
    }

    #[test]
    fn test_vl012_load_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_stage1(&dir.path().join("ghost")).unwrap().is_none());
    }

    #[test]
    fn test_vl012_load_garbage_stage1() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        std::fs::write(&output, "{ not: [valid").unwrap();
        assert!(load_stage1(&output).unwrap_err().contains("invalid stage1"));
    }

    #[test]
    fn test_vl012_stage2_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        let stage1 = save_artifacts(&output, &program(), &deps()).unwrap();
        std::fs::write(stage2_path(&output), "{\"template\":\"x\",\"ops\":[]}").unwrap();
        assert!(load_stage2(&stage1).unwrap_err().contains("hash mismatch"));
    }

    #[test]
    fn test_vl012_no_temp_files_left() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        save_artifacts(&output, &program(), &deps()).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2, "{:?}", names);
    }

    #[test]
    fn test_vl012_remove_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        save_artifacts(&output, &program(), &deps()).unwrap();
        remove_stage1(&output).unwrap();
        assert!(!output.exists());
        assert!(stage2_path(&output).exists());
        remove_artifacts(&output).unwrap();
        assert!(!stage2_path(&output).exists());
    }
}
