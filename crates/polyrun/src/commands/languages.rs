//! Languages command: list the registered backends.

use super::build_registry;
use miette::{IntoDiagnostic, WrapErr};
use polyrun_runtime::{RuntimeRegistry, SandboxConfig};
use serde::Serialize;
use starbase::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageEntry {
    pub language: String,
    pub kind: String,
    pub loaded: bool,
}

/// Run the languages command
pub fn run_languages(config: &SandboxConfig, json: bool) -> AppResult {
    let registry = build_registry(config)?;
    let entries = language_entries(&registry);

    if json {
        let rendered = serde_json::to_string_pretty(&entries)
            .into_diagnostic()
            .wrap_err("Failed to serialize language list")?;
        println!("{}", rendered);
        return Ok(None);
    }

    println!("{:<12} {:<12}", "Language", "Backend");
    println!("{}", "-".repeat(24));
    for entry in &entries {
        println!("{:<12} {:<12}", entry.language, entry.kind);
    }
    Ok(None)
}

pub fn language_entries(registry: &RuntimeRegistry) -> Vec<LanguageEntry> {
    registry
        .supported_languages()
        .into_iter()
        .filter_map(|language| {
            registry.get_runtime(language).map(|runtime| LanguageEntry {
                language: language.to_string(),
                kind: runtime.kind().to_string(),
                loaded: runtime.is_loaded(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyrun_runtime::config::CacheConfig;

    #[test]
    fn test_language_entries() {
        let temp = tempfile::tempdir().unwrap();
        let config = SandboxConfig {
            cache: CacheConfig {
                directory: Some(temp.path().to_path_buf()),
            },
            ..SandboxConfig::default()
        };
        let registry = RuntimeRegistry::from_config(&config).unwrap();

        let entries = language_entries(&registry);

        let names: Vec<_> = entries.iter().map(|e| e.language.as_str()).collect();
        assert_eq!(names, vec!["javascript", "python", "c", "cpp"]);
        assert_eq!(entries[0].kind, "dynamic");
        assert!(entries[0].loaded);
        assert_eq!(entries[3].kind, "compiled");
        assert!(!entries[3].loaded);
    }
}
