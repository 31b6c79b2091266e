//! PID 文件管理

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 写入当前进程 PID，返回写入的路径
pub fn write_pid_file(pid_path: Option<&str>) -> Result<Option<PathBuf>> {
    let Some(path_str) = pid_path else {
        return Ok(None);
    };
    let path = Path::new(path_str);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create PID file directory: {parent:?}"))?;
    }

    let pid = std::process::id();
    let mut file =
        fs::File::create(path).with_context(|| format!("Failed to create PID file: {path:?}"))?;
    writeln!(file, "{pid}").with_context(|| format!("Failed to write PID to file: {path:?}"))?;

    info!("PID file written: {:?} (PID: {})", path, pid);
    Ok(Some(path.to_path_buf()))
}

pub fn remove_pid_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!("PID file removed: {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove PID file {:?}: {}", path, e),
    }
}

/// drop 时删除 PID 文件
pub struct PidFileGuard {
    path: Option<PathBuf>,
}

impl PidFileGuard {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            remove_pid_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run/keygate.pid");

        let written = write_pid_file(path.to_str()).unwrap();
        assert_eq!(written.as_deref(), Some(path.as_path()));
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());

        drop(PidFileGuard::new(written));
        assert!(!path.exists());
    }

    #[test]
    fn test_no_pid_path() {
        assert!(write_pid_file(None).unwrap().is_none());
    }
}
