use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::QueryError;

const PROC_MODPROBE: &str = "/proc/sys/kernel/modprobe";
const DEFAULT_MODPROBE: &str = "/sbin/modprobe";

/// The helper the kernel itself uses to load modules.
fn default_modprobe() -> PathBuf {
    match fs::read_to_string(PROC_MODPROBE) {
        Ok(content) if !content.trim().is_empty() => PathBuf::from(content.trim()),
        _ => PathBuf::from(DEFAULT_MODPROBE),
    }
}

/// Loads `module` with `modprobe`, or with the helper advertised by the kernel when none is
/// given.
pub fn load_kernel_module(module: &str, modprobe: Option<&Path>) -> Result<(), QueryError> {
    let program = modprobe.map_or_else(default_modprobe, Path::to_path_buf);
    debug!("Loading kernel module {} with {}", module, program.display());
    let status = Command::new(&program)
        .arg(module)
        .status()
        .map_err(|source| QueryError::ModuleLoadFailed {
            module: module.to_string(),
            source,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(QueryError::ModuleLoadFailed {
            module: module.to_string(),
            source: io::Error::new(
                io::ErrorKind::Other,
                format!("{} exited with {}", program.display(), status),
            ),
        })
    }
}
