// Project context assembled from filesystem metadata
//
// Detects build manifests, lists top-level entries and inlines any context
// documents found at the project root. The result is cached after the first
// build; call `invalidate` to force a rebuild.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use super::ContextProvider;

/// Documents inlined into the context, in this order
const CONTEXT_FILENAMES: &[&str] = &["LOOPER.md", "CONTEXT.md", "README.md"];

/// Manifest file name and the ecosystem it implies
const MANIFESTS: &[(&str, &str)] = &[
    ("Cargo.toml", "Rust (cargo)"),
    ("package.json", "JavaScript/TypeScript (npm)"),
    ("pyproject.toml", "Python"),
    ("go.mod", "Go"),
    ("pom.xml", "Java (maven)"),
];

/// Per-document character budget
const MAX_DOC_CHARS: usize = 4000;

const MAX_ENTRIES: usize = 50;

pub struct ProjectContextBuilder {
    root: PathBuf,
    cache: Mutex<Option<String>>,
}

impl ProjectContextBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn invalidate(&self) {
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn render(&self) -> Result<String> {
        let name = self
            .root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| self.root.display().to_string());

        let mut lines = vec![
            format!("# {} Project Context", name),
            String::new(),
            "## Project Information".to_string(),
            format!("- Name: {}", name),
            format!("- Root: {}", self.root.display()),
        ];

        let stacks: Vec<&str> = MANIFESTS
            .iter()
            .filter(|(file, _)| self.root.join(file).exists())
            .map(|(_, stack)| *stack)
            .collect();
        if stacks.is_empty() {
            lines.push("- Technology: unknown".to_string());
        } else {
            lines.push(format!("- Technology: {}", stacks.join(", ")));
        }
        if let Some(version) = self.package_version() {
            lines.push(format!("- Version: {}", version));
        }

        lines.push(String::new());
        lines.push("## Layout".to_string());
        for entry in self.top_level_entries()? {
            lines.push(format!("- {}", entry));
        }

        for &filename in CONTEXT_FILENAMES {
            if let Some(content) = read_non_empty(&self.root.join(filename)) {
                lines.push(String::new());
                lines.push(format!("## {}", filename));
                lines.push(truncate(&content, MAX_DOC_CHARS));
            }
        }

        Ok(lines.join("\n"))
    }

    /// Sorted, non-hidden top-level entries; directories end in `/`
    fn top_level_entries(&self) -> Result<Vec<String>> {
        let dir = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read project directory {}", self.root.display()))?;

        let mut entries: Vec<String> = dir
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    return None;
                }
                let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
                Some(if is_dir { format!("{}/", name) } else { name })
            })
            .collect();
        entries.sort();
        entries.truncate(MAX_ENTRIES);
        Ok(entries)
    }

    /// Version from Cargo.toml `[package]` or package.json
    fn package_version(&self) -> Option<String> {
        if let Some(text) = read_non_empty(&self.root.join("Cargo.toml")) {
            // A malformed Cargo.toml falls through to package.json
            if let Ok(value) = toml::from_str::<toml::Value>(&text) {
                if let Some(v) = value
                    .get("package")
                    .and_then(|p| p.get("version"))
                    .and_then(|v| v.as_str())
                {
                    return Some(v.to_string());
                }
            }
        }
        if let Some(text) = read_non_empty(&self.root.join("package.json")) {
            let value: serde_json::Value = serde_json::from_str(&text).ok()?;
            return value.get("version").and_then(|v| v.as_str()).map(str::to_string);
        }
        None
    }
}

impl ContextProvider for ProjectContextBuilder {
    fn build_context(&self) -> Result<String> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.as_ref() {
            return Ok(cached.clone());
        }
        let context = self.render()?;
        debug!("Built project context: {} characters", context.len());
        *cache = Some(context.clone());
        Ok(context)
    }
}

fn read_non_empty(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => Some(content),
        Ok(_) => None,
        Err(e) => {
            debug!("Failed to read {}: {}", path.display(), e);
            None
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("\n[truncated]");
    out
}
