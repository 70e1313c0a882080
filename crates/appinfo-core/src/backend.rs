//! Package management system backends.
//!
//! A backend only has to answer one question: which package names does the
//! underlying system know about right now. Backends are looked up by a fixed
//! identifier through [`resolve`].

use crate::config::BackendSection;
use std::io;
use std::path::PathBuf;
use std::process::{Command as ProcessCommand, Stdio};

pub const KNOWN_BACKENDS: &[&str] = &["dpkg", "rpm", "pacman", "pisi", "list"];

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Selected PMS ({0}) is not available yet.")]
    Unknown(String),
    #[error("{0} not found in PATH")]
    MissingTool(String),
    #[error("failed to run {0}: {1}")]
    Spawn(String, io::Error),
    #[error("{0} failed: {1}")]
    Failed(String, String),
    #[error("backend `list` needs [backend] list_file in config")]
    MissingListFile,
    #[error("failed to read package list {0}: {1}")]
    ReadList(PathBuf, io::Error),
}

pub trait PackageSource {
    fn name(&self) -> &str;

    /// Current package names known to this system, in backend order.
    fn package_names(&self) -> Result<Vec<String>, BackendError>;
}

pub fn resolve(id: &str, section: &BackendSection) -> Result<Box<dyn PackageSource>, BackendError> {
    let source: Box<dyn PackageSource> = match id {
        "dpkg" => Box::new(CommandSource::new(
            "dpkg",
            "dpkg-query",
            &["-W", "-f=${Package}\\n"],
            LineFormat::Whole,
        )),
        "rpm" => Box::new(CommandSource::new(
            "rpm",
            "rpm",
            &["-qa", "--qf", "%{NAME}\\n"],
            LineFormat::Whole,
        )),
        "pacman" => Box::new(CommandSource::new(
            "pacman",
            "pacman",
            &["-Qq"],
            LineFormat::Whole,
        )),
        "pisi" => Box::new(CommandSource::new(
            "pisi",
            "pisi",
            &["list-installed"],
            LineFormat::FirstColumn,
        )),
        "list" => {
            let path = section
                .list_file
                .clone()
                .ok_or(BackendError::MissingListFile)?;
            Box::new(ListFileSource { path })
        }
        other => return Err(BackendError::Unknown(other.to_string())),
    };
    tracing::debug!(backend = id, "resolved package backend");
    Ok(source)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineFormat {
    Whole,
    FirstColumn,
}

#[derive(Debug, Clone)]
pub struct CommandSource {
    name: &'static str,
    program: &'static str,
    args: Vec<&'static str>,
    format: LineFormat,
}

impl CommandSource {
    fn new(
        name: &'static str,
        program: &'static str,
        args: &[&'static str],
        format: LineFormat,
    ) -> Self {
        CommandSource {
            name,
            program,
            args: args.to_vec(),
            format,
        }
    }
}

impl PackageSource for CommandSource {
    fn name(&self) -> &str {
        self.name
    }

    fn package_names(&self) -> Result<Vec<String>, BackendError> {
        let output = ProcessCommand::new(self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| {
                if err.kind() == io::ErrorKind::NotFound {
                    BackendError::MissingTool(self.program.to_string())
                } else {
                    BackendError::Spawn(self.program.to_string(), err)
                }
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Failed(
                self.program.to_string(),
                format!("status={}, stderr={}", output.status, stderr.trim()),
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let names = parse_lines(&stdout, self.format);
        tracing::debug!(backend = self.name, count = names.len(), "listed packages");
        Ok(names)
    }
}

/// Reads names from a plain text file, one per line. `#` starts a comment.
#[derive(Debug, Clone)]
pub struct ListFileSource {
    path: PathBuf,
}

impl ListFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ListFileSource { path: path.into() }
    }
}

impl PackageSource for ListFileSource {
    fn name(&self) -> &str {
        "list"
    }

    fn package_names(&self) -> Result<Vec<String>, BackendError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|err| BackendError::ReadList(self.path.clone(), err))?;
        let stripped: String = content
            .lines()
            .map(|line| line.split('#').next().unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(parse_lines(&stripped, LineFormat::Whole))
    }
}

fn parse_lines(text: &str, format: LineFormat) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let name = match format {
                LineFormat::Whole => line,
                LineFormat::FirstColumn => line.split_whitespace().next().unwrap_or_default(),
            };
            if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            }
        })
        .collect()
}
