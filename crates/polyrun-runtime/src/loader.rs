//! Fetching and caching backend artefacts
//!
//! Interpreter modules and compiler toolchains are downloaded once into the
//! cache directory and reused by later loads. Downloads land in a temp
//! directory first and are renamed into place, so an interrupted fetch never
//! leaves a partial entry behind.

use crate::config::{NetworkConfig, SandboxConfig};
use crate::error::RuntimeError;
use polyrun_core::LoadError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const WASM_MAGIC: &[u8] = b"\0asm";

/// Downloads and caches WebAssembly modules and toolchain archives.
pub struct ModuleLoader {
    /// Cache directory for downloaded artefacts
    cache_dir: PathBuf,
    /// Staging directory for in-flight downloads
    temp_dir: PathBuf,
    client: reqwest::Client,
}

impl ModuleLoader {
    /// Create a loader caching under `cache_dir`. Directories are created on
    /// first fetch.
    pub fn new(cache_dir: PathBuf, network: &NetworkConfig) -> Result<Self, LoadError> {
        let user_agent = network
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("polyrun/{}", env!("CARGO_PKG_VERSION")));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(network.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(
                network.max_redirects as usize,
            ))
            .user_agent(user_agent)
            .build()
            .map_err(|e| LoadError::Fetch {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let temp_dir = cache_dir.join("temp");
        Ok(Self {
            cache_dir,
            temp_dir,
            client,
        })
    }

    /// Create a loader from the `[cache]` and `[network]` sections.
    pub fn from_config(config: &SandboxConfig) -> Result<Self, RuntimeError> {
        let cache_dir = config.cache.resolve()?;
        Ok(Self::new(cache_dir, &config.network)?)
    }

    /// Use a module already on disk.
    pub async fn load_from_path(&self, path: &Path) -> Result<PathBuf, LoadError> {
        if !tokio::fs::try_exists(path).await? {
            return Err(LoadError::InvalidModule(format!(
                "Module file not found: {:?}",
                path
            )));
        }

        if path.extension().and_then(|e| e.to_str()) != Some("wasm") {
            return Err(LoadError::InvalidModule(format!(
                "Expected .wasm file, got: {:?}",
                path
            )));
        }

        debug!("Loading module from path: {:?}", path);
        Ok(path.to_path_buf())
    }

    /// Fetch a `.wasm` module from `url`, cached as `<id>.wasm`.
    pub async fn fetch_module(&self, id: &str, url: &str) -> Result<PathBuf, LoadError> {
        check_id(id, url)?;
        let cache_path = self.cache_dir.join(format!("{}.wasm", id));

        if tokio::fs::try_exists(&cache_path).await? {
            debug!("Using cached module: {:?}", cache_path);
            return Ok(cache_path);
        }

        info!("Downloading module {} from: {}", id, url);
        let bytes = self.download(url).await?;
        if !bytes.starts_with(WASM_MAGIC) {
            return Err(LoadError::InvalidModule(format!(
                "{} is not a WebAssembly module",
                url
            )));
        }

        self.ensure_dirs().await?;
        let temp_path = self.temp_dir.join(format!("{}.wasm.tmp", id));
        tokio::fs::write(&temp_path, &bytes).await?;
        tokio::fs::rename(&temp_path, &cache_path).await?;

        info!("Module cached at: {:?}", cache_path);
        Ok(cache_path)
    }

    /// Fetch a `.tar.gz` archive from `url` and unpack it into `<id>/`.
    ///
    /// Returns the directory the archive was unpacked into.
    pub async fn fetch_archive(&self, id: &str, url: &str) -> Result<PathBuf, LoadError> {
        check_id(id, url)?;
        let cache_path = self.cache_dir.join(id);

        if tokio::fs::try_exists(&cache_path).await? {
            debug!("Using cached archive: {:?}", cache_path);
            return Ok(cache_path);
        }

        if !(url.ends_with(".tar.gz") || url.ends_with(".tgz")) {
            return Err(LoadError::Archive(format!("Unknown archive format: {}", url)));
        }

        info!("Downloading archive {} from: {}", id, url);
        let bytes = self.download(url).await?;

        self.ensure_dirs().await?;
        let staging = self.temp_dir.join(id);
        if tokio::fs::try_exists(&staging).await? {
            tokio::fs::remove_dir_all(&staging).await?;
        }

        let dest = staging.clone();
        tokio::task::spawn_blocking(move || unpack_tar_gz(&bytes, &dest))
            .await
            .map_err(|e| LoadError::Archive(format!("Extraction task failed: {}", e)))??;
        tokio::fs::rename(&staging, &cache_path).await?;

        info!("Archive unpacked at: {:?}", cache_path);
        Ok(cache_path)
    }

    /// Clear the module cache
    pub async fn clear_cache(&self) -> Result<(), LoadError> {
        if tokio::fs::try_exists(&self.cache_dir).await? {
            tokio::fs::remove_dir_all(&self.cache_dir).await?;
        }
        Ok(())
    }

    async fn ensure_dirs(&self) -> Result<(), LoadError> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let response = self.client.get(url).send().await.map_err(|e| LoadError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(LoadError::Http {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| LoadError::Fetch {
            url: url.to_string(),
            message: format!("Failed to read response: {}", e),
        })?;
        Ok(bytes.to_vec())
    }
}

/// Derive a cache id from the last path segment of `url`.
pub fn cache_id(url: &str) -> String {
    let name = url.rsplit('/').next().unwrap_or(url);
    let name = name
        .trim_end_matches(".tar.gz")
        .trim_end_matches(".tgz")
        .trim_end_matches(".wasm");
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// An id must name an entry inside the cache directory.
fn check_id(id: &str, url: &str) -> Result<(), LoadError> {
    if id.is_empty() || id.chars().all(|c| c == '.') {
        return Err(LoadError::InvalidModule(format!(
            "Cannot derive a cache name from {:?}",
            url
        )));
    }
    Ok(())
}

/// Extract a gzip-compressed tar archive into `dest`.
pub fn unpack_tar_gz(bytes: &[u8], dest: &Path) -> Result<(), LoadError> {
    std::fs::create_dir_all(dest)?;
    let gz = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(gz);

    archive
        .unpack(dest)
        .map_err(|e| LoadError::Archive(format!("Failed to extract tar.gz: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use rstest::rstest;
    use tempfile::tempdir;

    /// Nothing listens on the discard port locally, so any fetch fails fast.
    const UNREACHABLE: &str = "http://127.0.0.1:9/artefact";

    fn loader(dir: &Path) -> ModuleLoader {
        ModuleLoader::new(dir.to_path_buf(), &NetworkConfig::default()).unwrap()
    }

    fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[tokio::test]
    async fn test_cached_module_is_not_refetched() {
        let temp = tempdir().unwrap();
        let loader = loader(temp.path());
        let cached = temp.path().join("python.wasm");
        std::fs::write(&cached, b"\0asm\x01\0\0\0").unwrap();

        let path = loader
            .fetch_module("python", &format!("{}.wasm", UNREACHABLE))
            .await
            .unwrap();
        assert_eq!(path, cached);
    }

    #[tokio::test]
    async fn test_uncached_unreachable_module_is_fetch_error() {
        let temp = tempdir().unwrap();
        let loader = loader(temp.path());

        let err = loader
            .fetch_module("python", &format!("{}.wasm", UNREACHABLE))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Fetch { .. }), "unexpected error: {:?}", err);
        assert!(!temp.path().join("python.wasm").exists());
    }

    #[tokio::test]
    async fn test_cached_archive_is_not_refetched() {
        let temp = tempdir().unwrap();
        let loader = loader(temp.path());
        std::fs::create_dir_all(temp.path().join("wasi-sdk").join("bin")).unwrap();

        let path = loader
            .fetch_archive("wasi-sdk", &format!("{}.tar.gz", UNREACHABLE))
            .await
            .unwrap();
        assert_eq!(path, temp.path().join("wasi-sdk"));
    }

    #[tokio::test]
    async fn test_unknown_archive_format() {
        let temp = tempdir().unwrap();
        let loader = loader(temp.path());

        let err = loader
            .fetch_archive("sdk", "https://example.invalid/sdk.zip")
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Archive(_)));
    }

    #[tokio::test]
    async fn test_load_from_path_requires_wasm_file() {
        let temp = tempdir().unwrap();
        let loader = loader(temp.path());
        let module = temp.path().join("python.wasm");
        let other = temp.path().join("python.txt");
        std::fs::write(&module, b"\0asm").unwrap();
        std::fs::write(&other, b"").unwrap();

        assert_eq!(loader.load_from_path(&module).await.unwrap(), module);
        assert!(loader.load_from_path(&other).await.is_err());
        assert!(loader.load_from_path(&temp.path().join("missing.wasm")).await.is_err());
    }

    #[test]
    fn test_unpack_tar_gz() {
        let temp = tempdir().unwrap();
        let archive = tar_gz(&[("sdk/bin/clang", b"#!/bin/sh\n"), ("sdk/VERSION", b"24.0")]);

        unpack_tar_gz(&archive, temp.path()).unwrap();

        assert!(temp.path().join("sdk/bin/clang").is_file());
        assert_eq!(std::fs::read(temp.path().join("sdk/VERSION")).unwrap(), b"24.0");
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        let temp = tempdir().unwrap();
        let err = unpack_tar_gz(b"definitely not gzip", temp.path()).unwrap_err();
        assert!(matches!(err, LoadError::Archive(_)));
    }

    #[test]
    fn test_cache_id() {
        assert_eq!(
            cache_id("https://github.com/WebAssembly/wasi-sdk/releases/download/wasi-sdk-24/wasi-sdk-24.0-x86_64-linux.tar.gz"),
            "wasi-sdk-24.0-x86_64-linux"
        );
        assert_eq!(
            cache_id("https://example.com/dl/python%2F3.12/python-3.12.0.wasm"),
            "python-3.12.0"
        );
    }

    #[rstest]
    #[case::trailing_slash("https://example.invalid/downloads/")]
    #[case::dot_segment("https://example.invalid/downloads/..")]
    #[tokio::test]
    async fn test_unnamed_url_is_rejected(#[case] url: &str) {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path()).unwrap();
        let loader = loader(temp.path());

        let archive = loader.fetch_archive(&cache_id(url), url).await.unwrap_err();
        let module = loader.fetch_module(&cache_id(url), url).await.unwrap_err();

        assert!(matches!(archive, LoadError::InvalidModule(_)), "{:?}", archive);
        assert!(matches!(module, LoadError::InvalidModule(_)), "{:?}", module);
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let temp = tempdir().unwrap();
        let cache = temp.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join("x.wasm"), b"").unwrap();

        let loader = ModuleLoader::new(cache.clone(), &NetworkConfig::default()).unwrap();
        loader.clear_cache().await.unwrap();
        assert!(!cache.exists());
    }
}
