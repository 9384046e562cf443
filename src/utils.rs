use std::path::Path;

use tempfile::NamedTempFile;

const FLOAT_EPSILON: f64 = 1e-9;

pub fn approx_eq(lhs: f64, rhs: f64) -> bool {
    (lhs - rhs).abs() <= FLOAT_EPSILON
}

/// Arithmetic mean; `None` for an empty input.
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0_f64, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { None } else { Some(sum / count as f64) }
}

/// Write a file by filling a temporary sibling and renaming it into place.
///
/// The destination is only touched once `fill` succeeded; on error the temporary
/// file is removed when dropped.
pub fn write_atomically<F>(path: &Path, fill: F) -> Result<(), String>
where
    F: FnOnce(&mut std::fs::File) -> Result<(), String>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| format!("create {} failed: {}", dir.display(), e))?;
    let mut tmp =
        NamedTempFile::new_in(dir).map_err(|e| format!("create temp file in {} failed: {}", dir.display(), e))?;
    fill(tmp.as_file_mut())?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| format!("sync {} failed: {}", tmp.path().display(), e))?;
    tmp.persist(path)
        .map_err(|e| format!("rename into {} failed: {}", path.display(), e.error))?;
    Ok(())
}
