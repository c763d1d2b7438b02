//! VL-002: Checked file I/O for template sources and compiled artifacts.
//!
//! Every step (exists, open, read, write, rename, read-back) is checked and any
//! failure is returned as a terminal error for the current compile or render.

use std::io::{Read, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Read a file's contents. A missing file is an error, an empty file is `""`.
pub fn read_file(path: &Path) -> Result<String, String> {
    if !path.exists() {
        return Err(format!("file {} does not exist", path.display()));
    }
    let mut file = std::fs::File::open(path)
        .map_err(|e| format!("failed to open {} for reading: {}", path.display(), e))?;
    let mut data = String::new();
    file.read_to_string(&mut data)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    Ok(data)
}

/// Modification time in nanoseconds since the Unix epoch.
pub fn file_mtime(path: &Path) -> Result<u64, String> {
    let meta = std::fs::metadata(path)
        .map_err(|e| format!("cannot stat {}: {}", path.display(), e))?;
    let modified = meta
        .modified()
        .map_err(|e| format!("no modification time for {}: {}", path.display(), e))?;
    let nanos = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("modification time of {} predates epoch: {}", path.display(), e))?
        .as_nanos();
    u64::try_from(nanos).map_err(|_| format!("modification time of {} out of range", path.display()))
}

/// Write a file atomically (temp file in the same directory, then rename), then
/// verify the result can be opened for reading.
pub fn write_file(path: &Path, data: &str) -> Result<(), String> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("cannot create dir {}: {}", dir.display(), e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".vellum-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| {
            format!(
                "failed to write to {}: {} (check permissions on the cache directory)",
                path.display(),
                e
            )
        })?;
    tmp.write_all(data.as_bytes())
        .map_err(|e| format!("failed to write to {}: {}", path.display(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| format!("error closing {}: {} (is the disk full?)", path.display(), e))?;
    tmp.persist(path)
        .map_err(|e| format!("cannot rename temp file to {}: {}", path.display(), e.error))?;

    // Read-back check: the file was written but must also be usable.
    std::fs::File::open(path).map_err(|e| {
        format!(
            "wrote {} but cannot read it back: {} (check permissions on the cache directory)",
            path.display(),
            e
        )
    })?;
    Ok(())
}

/// Remove a file if present. A file that is already gone is not an error.
pub fn remove_file(path: &Path) -> Result<(), String> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(format!("cannot remove {}: {}", path.display(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vl002_read_missing() {
        let result = read_file(Path::new("/nonexistent/template.tpl"));
        assert!(result.unwrap_err().contains("does not exist"));
    }

    #[test]
    fn test_vl002_read_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tpl");
        std::fs::write(&path, "").unwrap();
        assert_eq!(read_file(&path).unwrap(), "");
    }

    #[test]
    fn test_vl002_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out");
        write_file(&path, "compiled").unwrap();
        assert_eq!(read_file(&path).unwrap(), "compiled");
    }

    #[test]
    fn test_vl002_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        write_file(&path, "one").unwrap();
        write_file(&path, "two").unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["out"]);
        assert_eq!(read_file(&path).unwrap(), "two");
    }

    #[test]
    fn test_vl002_mtime_tracks_set_modified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tpl");
        std::fs::write(&path, "x").unwrap();
        let t = UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(t)
            .unwrap();
        assert_eq!(file_mtime(&path).unwrap(), 1_700_000_000 * 1_000_000_000);
    }

    #[test]
    fn test_vl002_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_file(&dir.path().join("ghost")).unwrap();
    }
}
