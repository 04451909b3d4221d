//! Path helpers.
use directories::BaseDirs;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
#[error("Cannot expand '{0}': the home directory of the current user is unknown")]
pub struct HomeDirUnavailable(pub String);

/// Expands a leading `~` or `~/` to the current user's home directory.
///
/// `~user` forms are not supported and, like any other path, are returned unchanged.
pub fn expand_home(path: &str) -> Result<PathBuf, HomeDirUnavailable> {
    let Some(rest) = path.strip_prefix('~') else {
        return Ok(PathBuf::from(path));
    };
    if !rest.is_empty() && !rest.starts_with('/') {
        return Ok(PathBuf::from(path));
    }

    let dirs = BaseDirs::new().ok_or_else(|| HomeDirUnavailable(path.to_string()))?;
    Ok(dirs.home_dir().join(rest.trim_start_matches('/')))
}
