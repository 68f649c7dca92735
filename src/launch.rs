//! Fire-and-forget launchers for the emulator, the project editor, and the
//! platform file browser.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Project descriptor the editor opens.
pub const PROJECT_FILENAME: &str = "Project.snake";

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Emulator executable not specified. Set it in the Preferences tab.")]
    EmulatorNotSet,
    #[error("Project editor not specified. Set it in the Preferences tab.")]
    EditorNotSet,
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Split a configured command line into program and leading arguments.
///
/// Double quotes group words so paths with spaces can be configured.
pub fn split_command(cmd: &str) -> Option<(String, Vec<String>)> {
    let mut words = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut has_word = false;
    for c in cmd.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_word = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_word {
                    words.push(std::mem::take(&mut cur));
                    has_word = false;
                }
            }
            c => {
                cur.push(c);
                has_word = true;
            }
        }
    }
    if has_word {
        words.push(cur);
    }
    let mut it = words.into_iter();
    let program = it.next()?;
    Some((program, it.collect()))
}

fn spawn_detached(program: &str, args: &[String], target: &Path) -> Result<(), LaunchError> {
    tracing::info!(program, target = %target.display(), "launching");
    let mut child = Command::new(program)
        .args(args)
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            program: program.to_string(),
            source,
        })?;
    // Reap the child when it exits so it does not linger as a zombie.
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

/// Start the emulator on `rom`. Returns `Ok(false)` when the ROM field is empty.
pub fn run_rom(emulator: Option<&str>, rom: &str) -> Result<bool, LaunchError> {
    let (program, args) = emulator
        .and_then(split_command)
        .ok_or(LaunchError::EmulatorNotSet)?;
    let rom = rom.trim();
    if rom.is_empty() {
        return Ok(false);
    }
    spawn_detached(&program, &args, Path::new(rom))?;
    Ok(true)
}

/// Path of the project descriptor inside `project`.
pub fn project_file(project: &str) -> PathBuf {
    Path::new(project.trim()).join(PROJECT_FILENAME)
}

/// Open the project in the external editor. Returns `Ok(false)` when the
/// project field is empty.
pub fn edit_project(editor: Option<&str>, project: &str) -> Result<bool, LaunchError> {
    let (program, args) = editor
        .and_then(split_command)
        .ok_or(LaunchError::EditorNotSet)?;
    if project.trim().is_empty() {
        return Ok(false);
    }
    spawn_detached(&program, &args, &project_file(project))?;
    Ok(true)
}

#[cfg(target_os = "macos")]
const OPENER: &str = "open";
#[cfg(target_os = "windows")]
const OPENER: &str = "explorer";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const OPENER: &str = "xdg-open";

/// Show `path` in the platform file browser.
pub fn open_folder(path: &str) -> Result<bool, LaunchError> {
    if path.trim().is_empty() {
        return Ok(false);
    }
    spawn_detached(OPENER, &[], Path::new(path.trim()))?;
    Ok(true)
}
