//! Script materialization: writes the script body to an executable temporary file.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tempfile::{Builder, TempPath};

use super::ExecutionError;

const SCRIPT_PREFIX: &str = "script";

/// Kind of script file, derived from the interpreter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Batch,
    PowerShell,
    Posix,
    Plain,
}

/// Interpreter-name fragments checked in order against the lowercased interpreter.
/// A naming heuristic only: `pwsh` or `zsh` both land on the POSIX entry.
const KIND_PATTERNS: &[(&str, ScriptKind)] = &[
    ("cmd", ScriptKind::Batch),
    ("powershell", ScriptKind::PowerShell),
    ("sh", ScriptKind::Posix),
];

impl ScriptKind {
    pub fn for_interpreter(interpreter: &str) -> Self {
        let lower = interpreter.to_ascii_lowercase();
        KIND_PATTERNS
            .iter()
            .find(|(pattern, _)| lower.contains(pattern))
            .map(|(_, kind)| *kind)
            .unwrap_or(ScriptKind::Plain)
    }

    pub fn extension(self) -> &'static str {
        match self {
            ScriptKind::Batch => ".bat",
            ScriptKind::PowerShell => ".ps1",
            ScriptKind::Posix => ".sh",
            ScriptKind::Plain => "",
        }
    }
}

/// A script file on disk, owned by a single execution.
///
/// The file is removed at most once: either through [`MaterializedScript::remove`]
/// or, if that never ran, when the value is dropped.
#[derive(Debug)]
pub struct MaterializedScript {
    file: Option<TempPath>,
    path: PathBuf,
}

impl MaterializedScript {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file. Later calls (and the drop) are no-ops.
    pub fn remove(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(file) => file.close(),
            None => Ok(()),
        }
    }
}

impl Drop for MaterializedScript {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "script has not been cleaned after execution"
            );
        }
    }
}

/// Creates a uniquely named executable file in `dir` holding `body` verbatim.
///
/// The write handle is closed before returning. If any step fails after the file
/// was created, the partial file is deleted before the error is returned.
pub fn materialize(
    body: &str,
    interpreter: &str,
    dir: &Path,
) -> Result<MaterializedScript, ExecutionError> {
    let kind = ScriptKind::for_interpreter(interpreter);
    let mut file = Builder::new()
        .prefix(SCRIPT_PREFIX)
        .suffix(kind.extension())
        .tempfile_in(dir)
        .map_err(ExecutionError::Materialize)?;

    make_executable(file.path()).map_err(ExecutionError::NotExecutable)?;
    file.write_all(body.as_bytes())
        .map_err(ExecutionError::Materialize)?;
    file.flush().map_err(ExecutionError::Materialize)?;

    let file = file.into_temp_path();
    let path = file.to_path_buf();
    tracing::debug!(path = %path.display(), ?kind, "script materialized");
    Ok(MaterializedScript {
        file: Some(file),
        path,
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o700);
    fs::set_permissions(path, perms)?;

    if fs::metadata(path)?.permissions().mode() & 0o100 == 0 {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!(
                "'{}' could not be made executable, check your permissions",
                path.display()
            ),
        ));
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(path: &Path) -> io::Result<()> {
    // No executable bit outside unix; the file only has to exist and be writable.
    let perms = fs::metadata(path)?.permissions();
    if perms.readonly() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("'{}' is read-only", path.display()),
        ));
    }
    Ok(())
}
