//! Catalog sources: where a role's file list comes from.

use std::path::{Path, PathBuf};

use crate::ConfigError;

/// A file list given inline or read from a newline-delimited catalog file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    Inline(Vec<String>),
    File(PathBuf),
}

impl CatalogSource {
    /// Pick the source declared by a descriptor entry. Returns `None` when
    /// neither was given and an error message when both were.
    pub fn from_parts(
        files: Option<Vec<String>>,
        catalog: Option<PathBuf>,
    ) -> Result<Option<Self>, &'static str> {
        match (files, catalog) {
            (Some(_), Some(_)) => Err("give either files or catalog, not both"),
            (Some(files), None) => Ok(Some(Self::Inline(files))),
            (None, Some(path)) => Ok(Some(Self::File(path))),
            (None, None) => Ok(None),
        }
    }

    /// Materialise the list. Relative catalog paths resolve against `base_dir`.
    pub fn load(&self, base_dir: &Path) -> Result<Vec<String>, ConfigError> {
        match self {
            Self::Inline(files) => Ok(files.clone()),
            Self::File(path) => read_catalog(&base_dir.join(path)),
        }
    }
}

/// Read a catalog file: one name per line, blank lines and `#` comments skipped.
pub fn read_catalog(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let files: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect();
    tracing::debug!(path = %path.display(), files = files.len(), "read catalog");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mubeam.txt");
        std::fs::write(&path, "# MuBeamFlash\na.art\n\n  b.art  \n#c.art\n").unwrap();
        assert_eq!(read_catalog(&path).unwrap(), vec!["a.art", "b.art"]);

        let source = CatalogSource::File("mubeam.txt".into());
        assert_eq!(source.load(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn missing_catalog_file_is_read_error() {
        let source = CatalogSource::File("/nonexistent/catalog.txt".into());
        let err = source.load(Path::new("/")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn source_selection() {
        assert_eq!(CatalogSource::from_parts(None, None), Ok(None));
        assert!(CatalogSource::from_parts(Some(vec![]), Some("x".into())).is_err());
        assert_eq!(
            CatalogSource::from_parts(Some(vec!["a".into()]), None),
            Ok(Some(CatalogSource::Inline(vec!["a".into()])))
        );
    }
}
