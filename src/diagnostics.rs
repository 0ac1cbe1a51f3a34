//! Environment report for "why can't it find LibreOffice?" questions.
//!
//! [`collect`] never fails. Each probe that goes wrong is reported in place
//! (a missing path, an unreadable directory) so the caller always gets a
//! complete, well-formed [`DebugReport`].

use office_locate::{is_executable_file, scan_dir, well_known_dirs, Locator, Platform, Tool};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Environment variables echoed in the report.
pub const REPORTED_ENV: &[&str] = &["PATH", "HOME", "USER", "PORT"];

/// Name fragments that mark an install directory entry as interesting.
const NEEDLES: &[&str] = &["libre", "office"];

const NOT_SET: &str = "Not set";

#[derive(Debug, Clone, Serialize)]
pub struct DebugReport {
    pub system: SystemInfo,
    pub tools: BTreeMap<String, ToolReport>,
    pub environment: BTreeMap<String, String>,
    pub file_system: BTreeMap<String, DirReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub family: String,
    /// Which candidate table the locator consults.
    pub platform: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolReport {
    pub found_path: Option<String>,
    pub exists: bool,
    pub is_executable: bool,
}

/// One well-known install directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DirReport {
    Listed {
        exists: bool,
        matches: Vec<String>,
        all_files_count: usize,
    },
    Unreadable {
        exists: bool,
        error: String,
    },
}

/// Build the report from the live process environment.
pub fn collect(locator: &Locator) -> DebugReport {
    collect_with_env(locator, |key| std::env::var(key).ok())
}

/// Build the report, reading environment variables through `env`.
pub fn collect_with_env<F>(locator: &Locator, env: F) -> DebugReport
where
    F: Fn(&str) -> Option<String>,
{
    DebugReport {
        system: system_info(locator.platform()),
        tools: Tool::ALL
            .iter()
            .map(|&tool| (tool.as_str().to_string(), tool_report(locator, tool)))
            .collect(),
        environment: REPORTED_ENV
            .iter()
            .map(|&key| (key.to_string(), env(key).unwrap_or_else(|| NOT_SET.to_string())))
            .collect(),
        file_system: well_known_dirs(locator.platform())
            .iter()
            .map(|&dir| (dir.to_string(), dir_report(Path::new(dir))))
            .collect(),
    }
}

fn system_info(platform: Platform) -> SystemInfo {
    SystemInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        family: std::env::consts::FAMILY.to_string(),
        platform: platform.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn tool_report(locator: &Locator, tool: Tool) -> ToolReport {
    match locator.locate(tool).path() {
        Some(path) => ToolReport {
            found_path: Some(path.display().to_string()),
            exists: path.exists(),
            is_executable: is_executable_file(path),
        },
        None => ToolReport {
            found_path: None,
            exists: false,
            is_executable: false,
        },
    }
}

fn dir_report(dir: &Path) -> DirReport {
    let scan = scan_dir(dir, NEEDLES);
    match scan.error {
        Some(error) => DirReport::Unreadable {
            exists: scan.exists,
            error,
        },
        None => DirReport::Listed {
            exists: scan.exists,
            matches: scan.matches,
            all_files_count: scan.total,
        },
    }
}
