// src/sources.rs

//! Source List Provider: builds the ordered, non-empty [`ImageList`] from
//! command-line arguments, an optional list file and piped stdin.

use crate::codec::is_url;
use crate::error::StartupError;
use anyhow::Context;
use log::{debug, warn};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Ordered, immutable list of image sources (paths or URLs). Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageList {
    sources: Vec<String>,
}

impl ImageList {
    /// Refuses an empty list: the render core cannot start without an image.
    pub fn new(sources: Vec<String>) -> Result<Self, StartupError> {
        if sources.is_empty() {
            return Err(StartupError::EmptyImageList);
        }
        Ok(ImageList { sources })
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Bounds-checked lookup.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.sources.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(String::as_str)
    }
}

/// Keeps arguments that exist on disk or look like URLs.
pub fn filter_arguments<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut kept = Vec::new();
    for arg in args {
        let arg = arg.as_ref();
        if is_url(arg) || Path::new(arg).exists() {
            kept.push(arg.to_string());
        } else {
            warn!("Skipping '{}': no such file", arg);
        }
    }
    kept
}

/// Reads one source per line, skipping blank lines.
pub fn read_lines<R: Read>(reader: R) -> anyhow::Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line.context("Failed to read source list")?;
        let trimmed = line.trim_end_matches('\r');
        if !trimmed.trim().is_empty() {
            lines.push(trimmed.to_string());
        }
    }
    Ok(lines)
}

/// Reads a list file given with `-f`.
pub fn read_list_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open list file {}", path.display()))?;
    read_lines(file)
}

/// True if stdin is a pipe or a redirected file rather than a terminal.
#[cfg(target_os = "linux")]
pub fn stdin_is_piped() -> bool {
    use std::os::fd::AsFd;

    match nix::sys::stat::fstat(std::io::stdin().as_fd()) {
        Ok(stat) => is_piped_mode(stat.st_mode),
        Err(e) => {
            debug!("Cannot stat stdin: {}", e);
            false
        }
    }
}

/// True for the file types that carry a source list: a FIFO or a regular file.
#[cfg(target_os = "linux")]
fn is_piped_mode(mode: nix::libc::mode_t) -> bool {
    use nix::sys::stat::SFlag;

    let file_type = SFlag::from_bits_truncate(mode) & SFlag::S_IFMT;
    file_type == SFlag::S_IFIFO || file_type == SFlag::S_IFREG
}

#[cfg(not(target_os = "linux"))]
pub fn stdin_is_piped() -> bool {
    use std::io::IsTerminal;
    !std::io::stdin().is_terminal()
}

/// Assembles the list in the order: arguments, list file, stdin.
pub fn collect_sources<I, S>(
    args: I,
    list_file: Option<&Path>,
    stdin: Option<&mut dyn Read>,
) -> anyhow::Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sources = filter_arguments(args);
    if let Some(path) = list_file {
        sources.extend(read_list_file(path)?);
    }
    if let Some(reader) = stdin {
        sources.extend(read_lines(reader)?);
    }
    debug!("Collected {} sources", sources.len());
    Ok(sources)
}
