//! Which ecosystems a repository contains, derived from its file list.

use std::fmt;
use std::path::Path;

/// Ecosystem presence flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Composition {
    pub go: bool,
    pub python: bool,
    pub shell: bool,
    pub yaml: bool,
    pub markdown: bool,
    pub containerfile: bool,
}

impl Composition {
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::default();
        for path in paths {
            out.observe(path.as_ref());
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn observe(&mut self, path: &str) {
        let path = Path::new(path);
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase());

        match extension.as_deref() {
            Some("go") => self.go = true,
            Some("py" | "pyi") => self.python = true,
            Some("sh" | "bash") => self.shell = true,
            Some("yaml" | "yml") => self.yaml = true,
            Some("md" | "markdown") => self.markdown = true,
            _ => {}
        }
        if file_name.contains("containerfile") || file_name.contains("dockerfile") {
            self.containerfile = true;
        }
    }
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "The following file types were found in this repo, and tasks will be run against them:"
        )?;
        let entries = [
            (self.go, "Go"),
            (self.python, "Python"),
            (self.shell, "Shell (sh, bash, etc.)"),
            (self.yaml, "YAML"),
            (self.markdown, "Markdown"),
            (self.containerfile, "Containerfile"),
        ];
        if self.is_empty() {
            return writeln!(f, "- (none, only the version check will run)");
        }
        for (present, name) in entries {
            if present {
                writeln!(f, "- {name}")?;
            }
        }
        Ok(())
    }
}
