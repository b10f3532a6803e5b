use crate::model::{AssignmentSet, Constraint, Employee, Shift};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Source des employés et créneaux (fichiers, service, base...).
pub trait DataProvider {
    fn employees(&self) -> anyhow::Result<Vec<Employee>>;
    fn shifts(&self) -> anyhow::Result<Vec<Shift>>;
}

/// Source des règles, déjà normalisées en `Constraint`.
pub trait RuleNormalizer {
    fn constraints(&self) -> anyhow::Result<Vec<Constraint>>;
}

/// Contenu d'un espace de travail : entrées du moteur et dernier planning retenu.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub shifts: Vec<Shift>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<AssignmentSet>,
}

/// Espace de travail stocké dans un fichier JSON.
pub struct JsonWorkspace {
    path: PathBuf,
}

impl JsonWorkspace {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fichier absent = espace vide.
    pub fn load(&self) -> anyhow::Result<Workspace> {
        if !self.path.exists() {
            return Ok(Workspace::default());
        }
        let data =
            fs::read(&self.path).with_context(|| format!("reading {}", self.path.display()))?;
        let workspace: Workspace = serde_json::from_slice(&data)
            .with_context(|| format!("parsing workspace {}", self.path.display()))?;
        Ok(workspace)
    }

    /// Sauvegarde atomique (fichier temporaire puis renommage).
    pub fn save(&self, workspace: &Workspace) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(workspace)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).with_context(|| "creating temp file")?;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).with_context(|| "atomic rename")?;
        Ok(())
    }
}

impl DataProvider for JsonWorkspace {
    fn employees(&self) -> anyhow::Result<Vec<Employee>> {
        Ok(self.load()?.employees)
    }

    fn shifts(&self) -> anyhow::Result<Vec<Shift>> {
        Ok(self.load()?.shifts)
    }
}

impl RuleNormalizer for JsonWorkspace {
    fn constraints(&self) -> anyhow::Result<Vec<Constraint>> {
        Ok(self.load()?.constraints)
    }
}
