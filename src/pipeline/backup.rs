use crate::error::EtlError;
use crate::error::ResultMessage;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;

/// Copies every existing file into `directory` as `<stem>_<stamp>.<extension>`.
/// Files that do not exist yet, such as a database before its first run, are passed over.
pub fn backup_files(directory: &Path, paths: &[&Path], stamp: &str) -> Result<Vec<PathBuf>, EtlError> {
    std::fs::create_dir_all(directory)
        .map_err(EtlError::from)
        .with_prefix(&format!("Creating backup directory '{}'", directory.display()))?;
    let mut backups = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.is_file() {
            continue;
        }
        let stem = path.file_stem().map(|stem| stem.to_string_lossy()).unwrap_or_default();
        let name = match path.extension() {
            Some(extension) => format!("{stem}_{stamp}.{}", extension.to_string_lossy()),
            None => format!("{stem}_{stamp}"),
        };
        let target = directory.join(name);
        std::fs::copy(path, &target)
            .map_err(EtlError::from)
            .with_prefix(&format!("Backing up '{}'", path.display()))?;
        info!(source = %path.display(), backup = %target.display(), "backed up file");
        backups.push(target);
    }
    Ok(backups)
}
