//! VL-004: Include resolution (compile pass 1).
//!
//! Recursively replaces `{include NAME}` statements with the text they name and
//! records every file touched along the way in a [`DependencySet`]. Raw files are
//! inlined verbatim; compiled templates are expanded recursively. Recursion is
//! bounded by a maximum include depth, which is what stops include cycles.

use super::fileio;
use super::locator::TemplateLocator;
use super::types::{DependencySet, Location};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

static INCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\{include\s+(.+?)\}").expect("include pattern is valid")
});

/// Expand a template and all of its includes into one text.
pub fn expand_template(
    locator: &dyn TemplateLocator,
    path: &Path,
    max_depth: usize,
) -> Result<(String, DependencySet), String> {
    let mut deps = DependencySet::new();
    let text = expand(locator, path, 0, max_depth, &mut deps)?;
    Ok((text, deps))
}

/// Expand one file at `depth` (0 for the top-level template).
pub fn expand(
    locator: &dyn TemplateLocator,
    path: &Path,
    depth: usize,
    max_depth: usize,
    deps: &mut DependencySet,
) -> Result<String, String> {
    let depth = depth + 1;
    if depth > max_depth {
        return Err(format!(
            "include depth exceeded the maximum of {} at {}; is there a circular include? \
             If not, raise max_include_depth in vellum.yaml",
            max_depth,
            path.display()
        ));
    }

    let mut template = fileio::read_file(path)?;
    deps.record(path, fileio::file_mtime(path)?);

    let matches: Vec<(String, String)> = INCLUDE_RE
        .captures_iter(&template)
        .map(|c| (c[0].to_string(), include_name(&c[1])))
        .collect();

    let mut done: HashSet<String> = HashSet::new();
    for (statement, name) in matches {
        if !done.insert(statement.clone()) {
            continue;
        }
        tracing::debug!(file = %path.display(), include = %name, depth, "resolving include");

        let replacement = match locator.locate(&name)? {
            Location::Raw(raw) => {
                let body = fileio::read_file(&raw)?;
                deps.record(&raw, fileio::file_mtime(&raw)?);
                body
            }
            Location::Compiled { source, .. } => expand(locator, &source, depth, max_depth, deps)?,
        };
        template = template.replace(&statement, &replacement);
    }

    Ok(template)
}

/// Template name from the statement argument: trimmed, surrounding quotes removed.
fn include_name(raw: &str) -> String {
    let name = raw.trim();
    let unquoted = name
        .strip_prefix('"')
        .and_then(|n| n.strip_suffix('"'))
        .or_else(|| name.strip_prefix('\'').and_then(|n| n.strip_suffix('\'')));
    unquoted.unwrap_or(name).to_string()
}

/// True when the text still holds an include statement.
pub fn has_includes(text: &str) -> bool {
    INCLUDE_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Locator over a flat directory, counting lookups.
    struct TestLocator {
        dir: PathBuf,
        raw: HashMap<String, PathBuf>,
        calls: Cell<usize>,
    }

    impl TestLocator {
        fn new(dir: &Path) -> Self {
            Self {
                dir: dir.to_path_buf(),
                raw: HashMap::new(),
                calls: Cell::new(0),
            }
        }
    }

    impl TemplateLocator for TestLocator {
        fn locate(&self, name: &str) -> Result<Location, String> {
            self.calls.set(self.calls.get() + 1);
            if let Some(raw) = self.raw.get(name) {
                return Ok(Location::Raw(raw.clone()));
            }
            let source = self.dir.join(format!("{}.tpl", name));
            if !source.exists() {
                return Err(format!("template '{}' not found", name));
            }
            Ok(Location::Compiled {
                output: self.dir.join(format!("{}.out", name)),
                source,
            })
        }
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let p = dir.join(format!("{}.tpl", name));
        std::fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn test_vl004_no_includes() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main", "hello {NAME}");
        let locator = TestLocator::new(dir.path());
        let (text, deps) = expand_template(&locator, &main, 50).unwrap();
        assert_eq!(text, "hello {NAME}");
        assert_eq!(deps.len(), 1);
        assert!(deps.contains(&main));
    }

    #[test]
    fn test_vl004_nested_includes_and_deps() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main", "[{include header}|body|{include footer}]");
        let header = write(dir.path(), "header", "H({include logo})");
        let logo = write(dir.path(), "logo", "L");
        let footer = write(dir.path(), "footer", "F");
        let locator = TestLocator::new(dir.path());
        let (text, deps) = expand_template(&locator, &main, 50).unwrap();
        assert_eq!(text, "[H(L)|body|F]");
        assert!(!has_includes(&text));
        assert_eq!(deps.len(), 4);
        for p in [&main, &header, &logo, &footer] {
            assert_eq!(deps.get(p), Some(fileio::file_mtime(p).unwrap()));
        }
    }

    #[test]
    fn test_vl004_missing_source_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let locator = TestLocator::new(dir.path());
        let err = expand_template(&locator, &dir.path().join("ghost.tpl"), 50).unwrap_err();
        assert!(err.contains("does not exist"), "{}", err);
    }

    #[test]
    fn test_vl004_missing_raw_include_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main", "{include gone}");
        let mut locator = TestLocator::new(dir.path());
        locator.raw.insert("gone".to_string(), dir.path().join("gone.html"));
        let err = expand_template(&locator, &main, 50).unwrap_err();
        assert!(err.contains("does not exist"), "{}", err);
    }

    #[test]
    fn test_vl004_duplicate_statement_resolved_once() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main", "{include sep}a{include sep}b{include sep}");
        write(dir.path(), "sep", "-");
        let locator = TestLocator::new(dir.path());
        let (text, _) = expand_template(&locator, &main, 50).unwrap();
        assert_eq!(text, "-a-b-");
        assert_eq!(locator.calls.get(), 1);
    }

    #[test]
    fn test_vl004_differently_spaced_statements_resolve_separately() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main", "{include sep}|{include  sep}");
        write(dir.path(), "sep", "-");
        let locator = TestLocator::new(dir.path());
        let (text, _) = expand_template(&locator, &main, 50).unwrap();
        assert_eq!(text, "-|-");
        assert_eq!(locator.calls.get(), 2);
    }

    #[test]
    fn test_vl004_raw_include_inlined_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main", "<{include \"raw\"}>");
        let raw = dir.path().join("raw.html");
        std::fs::write(&raw, "{include nothing} {VAR}").unwrap();
        let mut locator = TestLocator::new(dir.path());
        locator.raw.insert("raw".to_string(), raw.clone());
        let (text, deps) = expand_template(&locator, &main, 50).unwrap();
        assert_eq!(text, "<{include nothing} {VAR}>");
        assert!(deps.contains(&raw));
    }

    #[test]
    fn test_vl004_case_insensitive_keyword() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main", "{INCLUDE part}");
        write(dir.path(), "part", "P");
        let locator = TestLocator::new(dir.path());
        let (text, _) = expand_template(&locator, &main, 50).unwrap();
        assert_eq!(text, "P");
    }

    #[test]
    fn test_vl004_include_var_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main", "{include_var PAGE}{include_once x}");
        let locator = TestLocator::new(dir.path());
        let (text, _) = expand_template(&locator, &main, 50).unwrap();
        assert_eq!(text, "{include_var PAGE}{include_once x}");
        assert_eq!(locator.calls.get(), 0);
    }

    #[test]
    fn test_vl004_self_include_fails_within_limit() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "loop", "x{include loop}");
        let locator = TestLocator::new(dir.path());
        let err = expand_template(&locator, &main, 5).unwrap_err();
        assert!(err.contains("include depth"));
        assert!(err.contains("circular"));
        // top-level call plus at most `max_depth` recursive calls
        assert!(locator.calls.get() <= 5);
    }

    #[test]
    fn test_vl004_mutual_cycle_fails() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a", "{include b}");
        write(dir.path(), "b", "{include a}");
        let locator = TestLocator::new(dir.path());
        assert!(expand_template(&locator, &a, 50).is_err());
    }

    #[test]
    fn test_vl004_depth_limit_allows_exact_depth() {
        let dir = tempfile::tempdir().unwrap();
        let top = write(dir.path(), "t0", "0{include t1}");
        write(dir.path(), "t1", "1{include t2}");
        write(dir.path(), "t2", "2");
        let locator = TestLocator::new(dir.path());
        let (text, _) = expand_template(&locator, &top, 3).unwrap();
        assert_eq!(text, "012");
        assert!(expand_template(&locator, &top, 2).is_err());
    }

    #[test]
    fn test_vl004_missing_include_target() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main", "{include ghost}");
        let locator = TestLocator::new(dir.path());
        let err = expand_template(&locator, &main, 50).unwrap_err();
        assert!(err.contains("ghost"));
    }

    #[test]
    fn test_vl004_include_name() {
        assert_eq!(include_name(" header "), "header");
        assert_eq!(include_name("\"footer\""), "footer");
        assert_eq!(include_name("'x'"), "x");
    }
}
