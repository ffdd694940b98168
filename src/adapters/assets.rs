//! Manifest assets read from (and written to) the working directory

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Directory of manifest assets
#[derive(Debug, Clone)]
pub struct AssetDir {
    root: PathBuf,
}

impl AssetDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read an asset as UTF-8 text
    pub async fn read(&self, name: &str) -> Result<String> {
        let path = self.root.join(name);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::AssetError(format!("Fetching asset {} failed: {}", name, e)))
    }

    /// Write an asset, creating the directory if needed
    pub async fn write(&self, name: &str, contents: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            Error::AssetError(format!(
                "Failed to create asset directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let path = self.root.join(name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| Error::AssetError(format!("Failed to write asset {}: {}", name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let assets = AssetDir::new(dir.path().join("nested"));

        assets.write("configmap.yaml", "kind: ConfigMap\n").await.unwrap();
        assert_eq!(assets.read("configmap.yaml").await.unwrap(), "kind: ConfigMap\n");
    }

    #[tokio::test]
    async fn missing_asset_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let assets = AssetDir::new(dir.path());

        let err = assets.read("node.yaml").await.unwrap_err();
        assert!(matches!(err, Error::AssetError(_)));
        assert!(err.to_string().contains("node.yaml"));
    }
}
