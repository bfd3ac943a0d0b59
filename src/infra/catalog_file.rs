use crate::domain::{Catalog, Command, builtin_catalog};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadCatalogError {
    #[error("failed to read catalog {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse catalog {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("catalog {} contains no commands", .path.display())]
    Empty { path: PathBuf },

    #[error("catalog {} defines command '{name}' more than once", .path.display())]
    DuplicateName { path: PathBuf, name: String },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CatalogSource {
    Builtin,
    File(PathBuf),
}

impl CatalogSource {
    pub fn describe(&self) -> String {
        match self {
            Self::Builtin => "built-in".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }
}

/// Per-user catalog picked up when no path is given explicitly.
pub fn default_catalog_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nixai").join("tui-catalog.json"))
}

/// Loads the catalog from `explicit`, then from the per-user file if it
/// exists, then falls back to the built-in catalog.
pub fn resolve_catalog(
    explicit: Option<&Path>,
) -> Result<(Catalog, CatalogSource), LoadCatalogError> {
    resolve_catalog_from(explicit, default_catalog_path().as_deref())
}

fn resolve_catalog_from(
    explicit: Option<&Path>,
    fallback: Option<&Path>,
) -> Result<(Catalog, CatalogSource), LoadCatalogError> {
    if let Some(path) = explicit {
        let catalog = load_catalog_file(path)?;
        return Ok((catalog, CatalogSource::File(path.to_path_buf())));
    }

    if let Some(path) = fallback.filter(|path| path.is_file()) {
        let catalog = load_catalog_file(path)?;
        return Ok((catalog, CatalogSource::File(path.to_path_buf())));
    }

    Ok((builtin_catalog(), CatalogSource::Builtin))
}

pub fn load_catalog_file(path: &Path) -> Result<Catalog, LoadCatalogError> {
    let text = fs::read_to_string(path).map_err(|source| LoadCatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_catalog(path, &text)
}

fn parse_catalog(path: &Path, text: &str) -> Result<Catalog, LoadCatalogError> {
    let commands: Vec<Command> =
        serde_json::from_str(text).map_err(|source| LoadCatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let catalog = Catalog::new(commands);
    if catalog.is_empty() {
        return Err(LoadCatalogError::Empty {
            path: path.to_path_buf(),
        });
    }

    if let Some(name) = first_duplicate_name(&catalog) {
        return Err(LoadCatalogError::DuplicateName {
            path: path.to_path_buf(),
            name,
        });
    }

    Ok(catalog)
}

fn first_duplicate_name(catalog: &Catalog) -> Option<String> {
    let mut seen = BTreeSet::new();
    catalog
        .list()
        .iter()
        .find(|command| !seen.insert(command.name.as_str()))
        .map(|command| command.name.clone())
}
