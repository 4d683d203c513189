use crate::domain::ports::ConfigStore;
use crate::utils::error::Result;
use std::path::{Path, PathBuf};

const SVG_CODE_FILE: &str = "svg_code.svg";

/// File-backed write-back slot for `svgCode`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn svg_code_path(&self) -> PathBuf {
        Path::new(&self.base_path).join(SVG_CODE_FILE)
    }
}

impl ConfigStore for LocalStorage {
    async fn read_svg_code(&self) -> Result<Option<String>> {
        let path = self.svg_code_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(svg) if svg.trim().is_empty() => Ok(None),
            Ok(svg) => Ok(Some(svg)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_svg_code(&self, svg: &str) -> Result<()> {
        let path = self.svg_code_path();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a sibling and rename so a crash never leaves a torn fallback.
        let tmp = path.with_extension("svg.tmp");
        tokio::fs::write(&tmp, svg).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!("Persisted {} bytes of svgCode to {}", svg.len(), path.display());
        Ok(())
    }
}
