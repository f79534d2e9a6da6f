//! Utility functions for path manipulation.
//!
//! This module provides helpers to locate the configuration file of the
//! minder daemon.

use std::{env, path::Path, path::PathBuf};

/// Name of the configuration file looked up next to the executable.
pub const CONFIG_FILE_NAME: &str = "minder.yaml";

/// Constructs a file system path by joining a directory path with a file name.
///
/// Non UTF-8 characters are replaced with `U+FFFD`.
///
/// # Examples
///
/// ```
/// # use minder::utils::get_path;
/// let path = get_path("/opt/minder", "minder.yaml");
/// assert_eq!(path, "/opt/minder/minder.yaml");
/// ```
pub fn get_path(dir_path: &str, file_name: &str) -> String {
    let path_buf: PathBuf = [dir_path, file_name].iter().collect();
    path_buf.to_string_lossy().into_owned()
}

/// Returns the path of [`CONFIG_FILE_NAME`] in the directory of the running
/// executable, or in the current directory if it cannot be resolved.
pub fn default_config_path() -> String {
    let exe_dir = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    get_path(&exe_dir.to_string_lossy(), CONFIG_FILE_NAME)
}
