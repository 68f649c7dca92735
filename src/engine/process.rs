//! Engine adapters backed by external command-line tools.

use super::{DialogueExtractor, Engine, EngineError, Reporter};
use crate::model::RomExpansion;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Drives the engine's command-line front-end (`decompile`, `compile`, ...).
#[derive(Debug, Clone)]
pub struct ExternalEngine {
    program: PathBuf,
}

impl ExternalEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn invoke(&self, args: Vec<OsString>, reporter: &dyn Reporter) -> Result<(), EngineError> {
        run_tool(&self.program, &args, reporter)
    }
}

fn os(p: &Path) -> OsString {
    p.as_os_str().to_owned()
}

impl Engine for ExternalEngine {
    fn decompile_rom(
        &self,
        rom: &Path,
        project: &Path,
        reporter: &dyn Reporter,
    ) -> Result<(), EngineError> {
        self.invoke(vec!["decompile".into(), os(rom), os(project)], reporter)
    }

    fn compile_project(
        &self,
        project: &Path,
        base_rom: &Path,
        output_rom: &Path,
        reporter: &dyn Reporter,
    ) -> Result<(), EngineError> {
        self.invoke(
            vec!["compile".into(), os(project), os(base_rom), os(output_rom)],
            reporter,
        )
    }

    fn upgrade_project(
        &self,
        project: &Path,
        base_rom: &Path,
        reporter: &dyn Reporter,
    ) -> Result<(), EngineError> {
        self.invoke(vec!["upgrade".into(), os(base_rom), os(project)], reporter)
    }

    fn expand_rom(
        &self,
        rom: &Path,
        expansion: RomExpansion,
        reporter: &dyn Reporter,
    ) -> Result<(), EngineError> {
        let mut args: Vec<OsString> = vec!["expand".into()];
        if expansion == RomExpansion::Mbit48 {
            args.push("--ex".into());
        }
        args.push(os(rom));
        self.invoke(args, reporter)
    }

    fn add_header(&self, rom: &Path, reporter: &dyn Reporter) -> Result<(), EngineError> {
        self.invoke(vec!["addheader".into(), os(rom)], reporter)
    }

    fn strip_header(&self, rom: &Path, reporter: &dyn Reporter) -> Result<(), EngineError> {
        self.invoke(vec!["stripheader".into(), os(rom)], reporter)
    }
}

/// Runs the dialogue extractor as `<program> -o <output_dir> <rom>`.
#[derive(Debug, Clone)]
pub struct ExternalExtractor {
    program: PathBuf,
}

impl ExternalExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DialogueExtractor for ExternalExtractor {
    fn extract(
        &self,
        rom: &Path,
        output_dir: &Path,
        reporter: &dyn Reporter,
    ) -> Result<(), EngineError> {
        run_tool(
            &self.program,
            &["-o".into(), os(output_dir), os(rom)],
            reporter,
        )
    }
}

/// Spawn `program`, stream its stdout/stderr into `reporter`, and wait for it.
///
/// Lines shaped like `42%` are treated as progress updates rather than console
/// output. A non-zero exit carries the last non-empty stderr line as detail.
pub(crate) fn run_tool(
    program: &Path,
    args: &[OsString],
    reporter: &dyn Reporter,
) -> Result<(), EngineError> {
    let program_name = program.display().to_string();
    tracing::debug!(program = %program_name, ?args, "spawning tool");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| EngineError::Launch {
            program: program_name.clone(),
            source,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // stderr drains on its own thread so a chatty tool cannot fill one pipe
    // while we block reading the other.
    let last_stderr = std::thread::scope(|scope| {
        let err_handle = stderr.map(|err| {
            scope.spawn(move || {
                let mut last = None;
                drain_lines(err, |line| {
                    forward_line(&line, reporter);
                    if !line.trim().is_empty() {
                        last = Some(line);
                    }
                });
                last
            })
        });

        if let Some(out) = stdout {
            drain_lines(out, |line| forward_line(&line, reporter));
        }

        err_handle.and_then(|h| h.join().ok()).flatten()
    });

    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(EngineError::Exited {
            program: program_name,
            code: status.code(),
            detail: last_stderr.unwrap_or_default(),
        })
    }
}

/// Read `src` to EOF and hand each line to `on_line`. Bytes that are not
/// UTF-8 are replaced, so the pipe is never closed while the tool still writes.
fn drain_lines(src: impl Read, mut on_line: impl FnMut(String)) {
    let mut reader = BufReader::new(src);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                on_line(line.trim_end_matches(|c: char| c == '\n' || c == '\r').to_string());
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("pipe read failed: {e}");
                break;
            }
        }
    }
}

fn forward_line(line: &str, reporter: &dyn Reporter) {
    match parse_progress(line) {
        Some(p) => reporter.progress(p),
        None => reporter.line(line),
    }
}

/// Parse a bare percentage line (`"37%"`, `" 12.5 % "`).
pub(crate) fn parse_progress(line: &str) -> Option<f64> {
    let value = line.trim().strip_suffix('%')?.trim_end();
    let pct: f64 = value.parse().ok()?;
    (0.0..=100.0).contains(&pct).then_some(pct)
}

/// Resolve a program name to an executable path.
///
/// Names containing a path separator must exist as given; bare names are
/// searched on `PATH`.
pub fn locate_program(name: &Path) -> Option<PathBuf> {
    if name.as_os_str().is_empty() {
        return None;
    }
    if name.components().count() > 1 || name.is_absolute() {
        return name.is_file().then(|| name.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| candidates(&dir, name))
        .find(|candidate| candidate.is_file())
}

#[cfg(windows)]
fn candidates(dir: &Path, name: &Path) -> Vec<PathBuf> {
    vec![dir.join(name), dir.join(name).with_extension("exe")]
}

#[cfg(not(windows))]
fn candidates(dir: &Path, name: &Path) -> Vec<PathBuf> {
    vec![dir.join(name)]
}
