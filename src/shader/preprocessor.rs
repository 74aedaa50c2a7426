//! WGSL `#include` preprocessor
//!
//! Kernels share helpers through textual inclusion. Expansion happens before
//! hashing, so the cache key covers every included file and an edit to a
//! shared header invalidates all kernels that pull it in.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::GpuError;

/// Resolves `#include "file"` and `#include <file>` directives.
///
/// Includes resolve relative to the including file first, then through the
/// registered include directories. Each file is expanded at most once per
/// preprocessor, so mutually-including headers terminate.
pub struct Preprocessor {
    include_dirs: Vec<PathBuf>,
    processed_files: HashSet<PathBuf>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            include_dirs: vec![],
            processed_files: HashSet::new(),
        }
    }

    /// Adds a directory to search for include files.
    pub fn add_include_dir<P: AsRef<Path>>(&mut self, path: P) {
        self.include_dirs.push(path.as_ref().to_path_buf());
    }

    /// Reads a kernel source file and expands all includes.
    pub fn process_file<P: AsRef<Path>>(&mut self, path: P) -> Result<String, GpuError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| GpuError::SourceIo {
            path: path.to_path_buf(),
            source,
        })?;
        self.process_content(&content, path)
    }

    /// Expands all includes in `content`, resolving relative paths against
    /// `current_file`.
    pub fn process_content(&mut self, content: &str, current_file: &Path) -> Result<String, GpuError> {
        let mut result = String::new();
        let parent_dir = current_file.parent();

        for line in content.lines() {
            if let Some(include_path) = Self::parse_include_directive(line) {
                let resolved = self.resolve_include_path(&include_path, parent_dir)?;

                // Already-expanded files are skipped, which breaks cycles.
                if self.processed_files.insert(resolved.clone()) {
                    let included =
                        fs::read_to_string(&resolved).map_err(|source| GpuError::SourceIo {
                            path: resolved.clone(),
                            source,
                        })?;
                    let processed = self.process_content(&included, &resolved)?;
                    result.push_str(&processed);
                }
            } else {
                result.push_str(line);
                result.push('\n');
            }
        }

        Ok(result)
    }

    fn parse_include_directive(line: &str) -> Option<String> {
        let trimmed = line.trim();
        if !trimmed.starts_with("#include") {
            return None;
        }
        let after_include = trimmed.trim_start_matches("#include").trim();

        if after_include.starts_with('"') && after_include.ends_with('"') {
            Some(after_include.trim_matches('"').to_string())
        } else if after_include.starts_with('<') && after_include.ends_with('>') {
            Some(
                after_include
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string(),
            )
        } else {
            None
        }
    }

    fn resolve_include_path(
        &self,
        include_path: &str,
        current_dir: Option<&Path>,
    ) -> Result<PathBuf, GpuError> {
        let relative = Path::new(include_path);

        if let Some(dir) = current_dir {
            let candidate = dir.join(relative);
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        for include_dir in &self.include_dirs {
            let candidate = include_dir.join(relative);
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        Err(GpuError::IncludeNotFound {
            path: include_path.to_string(),
        })
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
