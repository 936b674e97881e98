use super::TemplateError;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory-backed catalog of named script templates. Resolution prefers a
/// provider-specific override, then the raw-mode override, then the plain
/// script name; first file found wins.
#[derive(Debug, Clone)]
pub struct ScriptCatalog {
    root: PathBuf,
}

impl ScriptCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidates(&self, provider: Option<&str>, script: &str) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(provider) = provider.map(str::trim).filter(|p| !p.is_empty()) {
            names.push(format!("{provider}-{script}"));
        }
        names.push(format!("raw-{script}"));
        names.push(script.to_string());
        names
    }

    pub fn resolve(&self, provider: Option<&str>, script: &str) -> Result<String, TemplateError> {
        let candidates = self.candidates(provider, script);
        for name in &candidates {
            let path = self.root.join(format!("{name}.sh"));
            match fs::read_to_string(&path) {
                Ok(text) => return Ok(text),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(TemplateError::Read {
                        path: path.display().to_string(),
                        source,
                    })
                }
            }
        }
        Err(TemplateError::NotFound {
            script: script.to_string(),
            tried: candidates.join(", "),
        })
    }
}
