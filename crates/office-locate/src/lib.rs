//! # office-locate
//!
//! Find the executables that office2pdf drives (the LibreOffice `soffice`
//! binary, Microsoft Word, and the platform automation host) without
//! hard-coding platform branches at every call site.
//!
//! ## How it works
//!
//! A [`CandidateTable`] maps `(Platform, Tool)` to an ordered list of
//! [`Candidate`]s: absolute install paths first, bare command names last.
//! [`Locator::locate`] walks that list and returns the first hit:
//!
//! 1. an absolute candidate that exists as a regular file, or
//! 2. a bare command name that resolves through the executable search path.
//!
//! Fixed install directories come before `PATH` lookups because `PATH` may
//! resolve to distro wrapper scripts with inconsistent flag handling.
//!
//! Results are cached per [`Locator`] instance. Installed tooling does not
//! change during a process lifetime, so the cache is never invalidated;
//! [`Locator::refresh`] re-probes explicitly when a caller wants a fresh look.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use office_locate::{CandidateTable, Locator, Tool};
//!
//! let locator = Locator::new(CandidateTable::builtin());
//! match locator.locate(Tool::Soffice).path() {
//!     Some(path) => println!("soffice at {}", path.display()),
//!     None => println!("LibreOffice is not installed"),
//! }
//! ```
//!
//! ## Platform support
//!
//! | Family    | soffice                        | word           | automation-host |
//! |-----------|--------------------------------|----------------|-----------------|
//! | `windows` | Program Files, then `PATH`     | `WINWORD.EXE`  | PowerShell      |
//! | `macos`   | `LibreOffice.app`, then `PATH` | `Word.app`     | `osascript`     |
//! | `unix`    | `/usr/bin`, `/opt`, snap, `PATH` | —            | —               |

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned when parsing locator configuration.
///
/// Locating itself never fails: a missing tool is the normal
/// [`ExecutableLocation::NotFound`] result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    /// The platform family name is not one of `windows`, `macos`, `unix`.
    #[error("Unknown platform family '{0}' (expected windows, macos or unix)")]
    UnknownPlatform(String),

    /// The tool name is not one of `soffice`, `word`, `automation-host`.
    #[error("Unknown tool '{0}' (expected soffice, word or automation-host)")]
    UnknownTool(String),
}

// ── Platform and tool keys ───────────────────────────────────────────────────

/// Operating-system family used to key the candidate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    Windows,
    MacOs,
    /// Linux and every other Unix-like system.
    Unix,
}

impl Platform {
    /// The family of the running process.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Unix
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Unix => "unix",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = LocateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" => Ok(Platform::Windows),
            "macos" | "mac" | "darwin" => Ok(Platform::MacOs),
            "unix" | "linux" => Ok(Platform::Unix),
            other => Err(LocateError::UnknownPlatform(other.to_string())),
        }
    }
}

/// An external program the converter may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tool {
    /// LibreOffice's `soffice` / `libreoffice` launcher.
    Soffice,
    /// The Microsoft Word application executable.
    Word,
    /// The scripting host that drives Word: `osascript` or PowerShell.
    AutomationHost,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::Soffice, Tool::Word, Tool::AutomationHost];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Soffice => "soffice",
            Tool::Word => "word",
            Tool::AutomationHost => "automation-host",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = LocateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "soffice" | "libreoffice" => Ok(Tool::Soffice),
            "word" | "winword" => Ok(Tool::Word),
            "automation-host" | "osascript" | "powershell" => Ok(Tool::AutomationHost),
            other => Err(LocateError::UnknownTool(other.to_string())),
        }
    }
}

// ── Candidate table ──────────────────────────────────────────────────────────

/// One place a tool might live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// A path checked directly on the filesystem.
    Path(PathBuf),
    /// A bare command name resolved through the search path.
    Command(String),
}

impl Candidate {
    /// Classify a user-supplied string: anything containing a path
    /// separator is a path, everything else a command name.
    pub fn parse(s: &str) -> Self {
        if s.contains('/') || s.contains('\\') {
            Candidate::Path(PathBuf::from(s))
        } else {
            Candidate::Command(s.to_string())
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::Path(p) => write!(f, "{}", p.display()),
            Candidate::Command(c) => f.write_str(c),
        }
    }
}

/// Ordered candidate lists keyed by platform family and tool.
#[derive(Debug, Clone, Default)]
pub struct CandidateTable {
    entries: HashMap<(Platform, Tool), Vec<Candidate>>,
}

fn paths(list: &[&str]) -> Vec<Candidate> {
    list.iter().map(|p| Candidate::Path(PathBuf::from(p))).collect()
}

fn commands(list: &[&str]) -> Vec<Candidate> {
    list.iter().map(|c| Candidate::Command((*c).to_string())).collect()
}

impl CandidateTable {
    /// A table with no candidates at all. Every lookup is `NotFound`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The install locations LibreOffice and Word use on stock systems.
    pub fn builtin() -> Self {
        let mut table = Self::empty();

        // LibreOffice
        let mut win_soffice = paths(&[
            r"C:\Program Files\LibreOffice\program\soffice.exe",
            r"C:\Program Files (x86)\LibreOffice\program\soffice.exe",
            r"C:\Program Files\LibreOffice\program\libreoffice.exe",
            r"C:\Program Files (x86)\LibreOffice\program\libreoffice.exe",
        ]);
        win_soffice.extend(commands(&["libreoffice", "soffice"]));
        table.set(Platform::Windows, Tool::Soffice, win_soffice);

        let unix_soffice_paths = [
            "/usr/bin/libreoffice",
            "/usr/bin/soffice",
            "/usr/local/bin/libreoffice",
            "/usr/local/bin/soffice",
            "/opt/libreoffice/program/soffice",
            "/opt/libreoffice/program/libreoffice",
            "/snap/bin/libreoffice",
        ];
        let mut unix_soffice = paths(&unix_soffice_paths);
        unix_soffice.extend(commands(&["libreoffice", "soffice"]));
        table.set(Platform::Unix, Tool::Soffice, unix_soffice);

        let mut mac_soffice = paths(&[
            "/Applications/LibreOffice.app/Contents/MacOS/soffice",
            "/opt/homebrew/bin/soffice",
        ]);
        mac_soffice.extend(paths(&unix_soffice_paths));
        mac_soffice.extend(commands(&["libreoffice", "soffice"]));
        table.set(Platform::MacOs, Tool::Soffice, mac_soffice);

        // Microsoft Word
        table.set(
            Platform::Windows,
            Tool::Word,
            paths(&[
                r"C:\Program Files\Microsoft Office\root\Office16\WINWORD.EXE",
                r"C:\Program Files (x86)\Microsoft Office\root\Office16\WINWORD.EXE",
                r"C:\Program Files\Microsoft Office\Office16\WINWORD.EXE",
                r"C:\Program Files (x86)\Microsoft Office\Office16\WINWORD.EXE",
                r"C:\Program Files\Microsoft Office\Office15\WINWORD.EXE",
            ]),
        );
        table.set(
            Platform::MacOs,
            Tool::Word,
            paths(&["/Applications/Microsoft Word.app/Contents/MacOS/Microsoft Word"]),
        );

        // Automation hosts
        let mut win_host = paths(&[r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe"]);
        win_host.extend(commands(&["powershell", "pwsh"]));
        table.set(Platform::Windows, Tool::AutomationHost, win_host);

        let mut mac_host = paths(&["/usr/bin/osascript"]);
        mac_host.extend(commands(&["osascript"]));
        table.set(Platform::MacOs, Tool::AutomationHost, mac_host);

        table
    }

    /// Replace the candidate list for `(platform, tool)`.
    pub fn set(&mut self, platform: Platform, tool: Tool, candidates: Vec<Candidate>) {
        self.entries.insert((platform, tool), candidates);
    }

    /// Builder-style [`CandidateTable::set`].
    pub fn with(mut self, platform: Platform, tool: Tool, candidates: Vec<Candidate>) -> Self {
        self.set(platform, tool, candidates);
        self
    }

    /// Insert `candidate` ahead of every existing candidate for the pair.
    pub fn prepend(&mut self, platform: Platform, tool: Tool, candidate: Candidate) {
        self.entries
            .entry((platform, tool))
            .or_default()
            .insert(0, candidate);
    }

    /// Candidates in probe order. Empty when the pair has no entry.
    pub fn candidates(&self, platform: Platform, tool: Tool) -> &[Candidate] {
        self.entries
            .get(&(platform, tool))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ── Location results ─────────────────────────────────────────────────────────

/// Result of a lookup. `NotFound` is an ordinary answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutableLocation {
    Found(PathBuf),
    NotFound,
}

impl ExecutableLocation {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ExecutableLocation::Found(p) => Some(p),
            ExecutableLocation::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ExecutableLocation::Found(_))
    }
}

// ── Locator ──────────────────────────────────────────────────────────────────

/// Probes a [`CandidateTable`] for the running platform and caches answers.
///
/// Safe to share between threads (`Arc<Locator>`); the cache sits behind a
/// short-lived mutex that is never held across a filesystem probe.
#[derive(Debug)]
pub struct Locator {
    platform: Platform,
    table: CandidateTable,
    search_path: Option<OsString>,
    cache: Mutex<HashMap<Tool, ExecutableLocation>>,
}

impl Locator {
    /// A locator for the current platform that resolves commands through
    /// this process's `PATH`.
    pub fn new(table: CandidateTable) -> Self {
        Self {
            platform: Platform::current(),
            table,
            search_path: std::env::var_os("PATH"),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Probe another platform's candidate list (tests, diagnostics).
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Resolve bare command names through `search_path` instead of `PATH`.
    /// `None` disables search-path resolution entirely.
    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn table(&self) -> &CandidateTable {
        &self.table
    }

    /// Find `tool`, answering from the cache after the first probe.
    pub fn locate(&self, tool: Tool) -> ExecutableLocation {
        if let Some(hit) = self.cached(tool) {
            return hit;
        }
        self.refresh(tool)
    }

    /// Probe again, replacing whatever the cache held for `tool`.
    pub fn refresh(&self, tool: Tool) -> ExecutableLocation {
        let location = self.probe(tool);
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(tool, location.clone());
        location
    }

    /// The cached answer for `tool`, if it has been probed.
    pub fn cached(&self, tool: Tool) -> Option<ExecutableLocation> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&tool)
            .cloned()
    }

    fn probe(&self, tool: Tool) -> ExecutableLocation {
        let candidates = self.table.candidates(self.platform, tool);
        debug!(
            tool = %tool,
            platform = %self.platform,
            candidates = candidates.len(),
            "probing for executable"
        );

        for candidate in candidates {
            let hit = match candidate {
                Candidate::Path(p) => {
                    if p.is_file() {
                        Some(p.clone())
                    } else {
                        None
                    }
                }
                Candidate::Command(name) => search_path(name, self.search_path.as_deref()),
            };
            if let Some(path) = hit {
                debug!(tool = %tool, path = %path.display(), "found");
                return ExecutableLocation::Found(path);
            }
        }

        debug!(tool = %tool, "not found in any candidate location");
        ExecutableLocation::NotFound
    }
}

// ── Search-path resolution ───────────────────────────────────────────────────

/// Resolve a bare command name through a `PATH`-style variable.
///
/// Returns the first directory entry that is an executable regular file.
/// On Windows each `PATHEXT` extension is tried when `name` has none.
pub fn search_path(name: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    let path_var = path_var?;
    let exts = executable_extensions(name);

    for dir in std::env::split_paths(path_var) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        for ext in &exts {
            let candidate = if ext.is_empty() {
                dir.join(name)
            } else {
                dir.join(format!("{name}{ext}"))
            };
            if is_executable_file(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

fn executable_extensions(name: &str) -> Vec<String> {
    if !cfg!(windows) || Path::new(name).extension().is_some() {
        return vec![String::new()];
    }
    let pathext = std::env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
    let mut exts = vec![String::new()];
    exts.extend(
        pathext
            .split(';')
            .filter(|e| !e.is_empty())
            .map(|e| e.to_ascii_lowercase()),
    );
    exts
}

/// `true` for a regular file the current user may execute.
///
/// On non-Unix platforms every regular file qualifies.
pub fn is_executable_file(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

// ── Directory scans (diagnostics) ────────────────────────────────────────────

/// Install directories worth listing when a tool cannot be found.
pub fn well_known_dirs(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Windows => &[
            r"C:\Program Files\LibreOffice\program",
            r"C:\Program Files (x86)\LibreOffice\program",
            r"C:\Program Files\Microsoft Office\root\Office16",
        ],
        Platform::MacOs => &[
            "/Applications/LibreOffice.app/Contents/MacOS",
            "/Applications/Microsoft Word.app/Contents/MacOS",
            "/opt/homebrew/bin",
            "/usr/local/bin",
        ],
        Platform::Unix => &["/usr/bin", "/usr/local/bin", "/opt/libreoffice/program", "/snap/bin"],
    }
}

/// What a directory listing turned up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirScan {
    pub exists: bool,
    /// Entry names whose lowercase form contains one of the needles.
    pub matches: Vec<String>,
    pub total: usize,
    /// Set when the directory exists but could not be read.
    pub error: Option<String>,
}

/// List `dir`, keeping entries whose lowercase name contains any of
/// `needles`. Never fails: a missing or unreadable directory is reported
/// in the returned [`DirScan`].
pub fn scan_dir(dir: &Path, needles: &[&str]) -> DirScan {
    if !dir.is_dir() {
        return DirScan::default();
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            return DirScan {
                exists: true,
                error: Some(e.to_string()),
                ..DirScan::default()
            }
        }
    };

    let mut scan = DirScan {
        exists: true,
        ..DirScan::default()
    };
    for entry in entries.flatten() {
        scan.total += 1;
        let name = entry.file_name().to_string_lossy().into_owned();
        let lower = name.to_lowercase();
        if needles.iter().any(|n| lower.contains(n)) {
            scan.matches.push(name);
        }
    }
    scan.matches.sort();
    scan
}

// ── Tests ─────────────────────────────────────────────────────────────────────
