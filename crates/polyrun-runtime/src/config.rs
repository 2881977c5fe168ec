//! Sandbox configuration
//!
//! Loaded from `polyrun.toml`. Every section and field has a default, so an
//! empty file (or no file at all) yields a working configuration.
//!
//! ```toml
//! [cache]
//! directory = "/var/cache/polyrun"
//!
//! [network]
//! timeout_secs = 300
//!
//! [compiler]
//! path = "/opt/wasi-sdk"
//! strict_imports = true
//!
//! [python]
//! preload = ["json", "math"]
//! ```

use crate::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up by [`discover_config`].
pub const CONFIG_FILE: &str = "polyrun.toml";

/// wasi-sdk release used when no local toolchain is configured.
pub const DEFAULT_WASI_SDK_URL: &str = "https://github.com/WebAssembly/wasi-sdk/releases/download/wasi-sdk-24/wasi-sdk-24.0-x86_64-linux.tar.gz";

/// CPython build for WASI with the standard library embedded.
pub const DEFAULT_PYTHON_URL: &str = "https://github.com/vmware-labs/webassembly-language-runtimes/releases/download/python%2F3.12.0%2B20231211-040d5a6/python-3.12.0.wasm";

/// Root configuration from polyrun.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Where fetched modules and toolchains are cached
    pub cache: CacheConfig,
    /// HTTP client settings for fetches
    pub network: NetworkConfig,
    /// C / C++ toolchain
    pub compiler: CompilerConfig,
    /// Python interpreter module
    pub python: PythonConfig,
}

impl SandboxConfig {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SandboxConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the nearest `polyrun.toml` at or above `start_dir`, or defaults.
    pub fn discover(start_dir: &Path) -> Result<Self> {
        match discover_config(start_dir) {
            Some(path) => {
                tracing::debug!("Using configuration at {:?}", path);
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }
}

/// Walk up directory tree to find polyrun.toml
pub fn discover_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();

    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    None
}

/// Cache configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory (defaults to ~/.cache/polyrun).
    pub directory: Option<PathBuf>,
}

impl CacheConfig {
    /// The configured directory, or the platform cache directory.
    pub fn resolve(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.directory {
            return Ok(dir.clone());
        }
        dirs::cache_dir()
            .map(|dir| dir.join("polyrun"))
            .ok_or_else(|| RuntimeError::Config("Could not determine cache directory".into()))
    }
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Request timeout in seconds. Toolchain archives are large.
    pub timeout_secs: u64,

    /// Maximum number of redirects to follow.
    pub max_redirects: u32,

    /// User agent string.
    pub user_agent: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            max_redirects: 10,
            user_agent: None,
        }
    }
}

/// C / C++ compiler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Root of a local wasi-sdk install. Takes precedence over `url`.
    pub path: Option<PathBuf>,

    /// wasi-sdk release archive to download when `path` is unset.
    pub url: String,

    /// Clang target triple.
    pub target: String,

    /// Optimization flag passed to every compile.
    pub opt_level: String,

    /// Refuse to link modules importing syscalls the shim lacks.
    pub strict_imports: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            path: None,
            url: DEFAULT_WASI_SDK_URL.to_string(),
            target: "wasm32-wasip1".to_string(),
            opt_level: "-O2".to_string(),
            strict_imports: false,
        }
    }
}

/// Python interpreter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    /// Local interpreter module. Takes precedence over `url`.
    pub path: Option<PathBuf>,

    /// Interpreter module to download when `path` is unset.
    pub url: String,

    /// Modules imported once at load time to verify the interpreter.
    pub preload: Vec<String>,

    /// Host directory exposed read-only as `/usr/local/lib`, for builds that
    /// do not embed the standard library.
    pub lib_dir: Option<PathBuf>,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            path: None,
            url: DEFAULT_PYTHON_URL.to_string(),
            preload: Vec::new(),
            lib_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_yields_defaults() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "")?;

        let config = SandboxConfig::load(&path)?;
        assert_eq!(config, SandboxConfig::default());
        assert_eq!(config.compiler.opt_level, "-O2");
        assert!(!config.compiler.strict_imports);
        Ok(())
    }

    #[test]
    fn test_partial_sections_keep_defaults() -> anyhow::Result<()> {
        let toml_content = r#"
[compiler]
path = "/opt/wasi-sdk"
strict_imports = true

[python]
preload = ["json"]
"#;
        let dir = tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, toml_content)?;

        let config = SandboxConfig::load(&path)?;
        assert_eq!(config.compiler.path, Some(PathBuf::from("/opt/wasi-sdk")));
        assert!(config.compiler.strict_imports);
        assert_eq!(config.compiler.url, DEFAULT_WASI_SDK_URL);
        assert_eq!(config.compiler.target, "wasm32-wasip1");
        assert_eq!(config.python.preload, vec!["json"]);
        assert_eq!(config.python.url, DEFAULT_PYTHON_URL);
        assert_eq!(config.network, NetworkConfig::default());
        Ok(())
    }

    #[test]
    fn test_round_trip_through_toml() -> anyhow::Result<()> {
        let mut config = SandboxConfig::default();
        config.cache.directory = Some(PathBuf::from("/tmp/polyrun-cache"));
        config.network.user_agent = Some("polyrun-test".into());

        let text = toml::to_string(&config)?;
        let parsed: SandboxConfig = toml::from_str(&text)?;
        assert_eq!(parsed, config);
        Ok(())
    }

    #[test]
    fn test_malformed_file_is_error() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[compiler\npath = 1")?;

        assert!(matches!(SandboxConfig::load(&path), Err(RuntimeError::Toml(_))));
        Ok(())
    }

    #[test]
    fn test_discover_walks_up() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested)?;
        std::fs::write(dir.path().join(CONFIG_FILE), "[network]\ntimeout_secs = 5\n")?;

        assert_eq!(discover_config(&nested), Some(dir.path().join(CONFIG_FILE)));
        let config = SandboxConfig::discover(&nested)?;
        assert_eq!(config.network.timeout_secs, 5);
        Ok(())
    }

    #[test]
    fn test_cache_directory_override() -> anyhow::Result<()> {
        let config = CacheConfig {
            directory: Some(PathBuf::from("/srv/cache")),
        };
        assert_eq!(config.resolve()?, PathBuf::from("/srv/cache"));
        Ok(())
    }
}
