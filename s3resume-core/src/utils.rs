use std::{
    env,
    path::{Path, PathBuf},
};
use tokio::fs;

pub const LOCK_FILE_PREFIX: &str = "s3resume_";

/// Creates a directory and all of its parents. Succeeds if it already exists.
pub async fn create_directory_tree(path: &Path) -> std::io::Result<()> {
    if fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Ok(());
    }
    fs::create_dir_all(path).await
}

/// Path of the advisory lock guarding downloads into `file_name`.
///
/// Depends only on the file name, so every process targeting the same
/// destination name contends on the same lock regardless of working or
/// temporary directory.
pub fn lock_path_for(file_name: &str) -> PathBuf {
    let digest = md5::compute(file_name.as_bytes());
    env::temp_dir().join(format!("{LOCK_FILE_PREFIX}{digest:x}"))
}

/// Path of the temporary file holding part `index` of `base`.
pub fn part_path(base: &Path, index: u64) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".part{index}"));
    PathBuf::from(name)
}

/// Gets a file name from an object key (its last path segment).
pub fn file_name_from_key(key: &str) -> Option<String> {
    let trimmed = key.trim_end_matches('/');
    let name = match trimmed.rfind('/') {
        Some(index) => &trimmed[index + 1..],
        None => trimmed,
    };
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}
