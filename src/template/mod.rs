mod catalog;
mod compile;

pub use catalog::ScriptCatalog;
pub use compile::{compile, substitute_tokens};

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("no template found for script `{script}` (tried {tried})")]
    NotFound { script: String, tried: String },
    #[error("failed to read template {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
