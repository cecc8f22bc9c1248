use std::path::{Path, PathBuf};

use actiongraph_core::paths::ACTIONGRAPH_DIR;

/// Resolve the directory holding `.actiongraph/`.
///
/// Priority:
/// 1. `--root` flag / `ACTIONGRAPH_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.actiongraph/`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd).unwrap_or(cwd)
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(ACTIONGRAPH_DIR).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_actiongraph_dir_from_subdir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".actiongraph")).unwrap();
        let subdir = dir.path().join("pipelines/deep");
        std::fs::create_dir_all(&subdir).unwrap();
        assert_eq!(find_upward(&subdir), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn no_marker_found() {
        let dir = TempDir::new().unwrap();
        assert!(find_upward(dir.path())
            .map(|p| !p.starts_with(dir.path()))
            .unwrap_or(true));
    }
}
