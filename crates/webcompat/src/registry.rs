//! Filesystem probe registry.
//!
//! Probes live one per YAML file under a root directory. Loading parses
//! and validates every file up front; nothing here touches a browser.

use std::collections::HashSet;
use std::path::Path;

use crate::probe::{Probe, ProbeParseError};
use crate::result::{WebcompatError, WebcompatResult};

/// All probes found under one root, sorted by id.
#[derive(Debug, Clone, Default)]
pub struct ProbeRegistry {
    probes: Vec<Probe>,
}

impl ProbeRegistry {
    /// Load every `.yaml`/`.yml` file under `root`, recursively.
    ///
    /// Files are visited in path order so repeated loads of the same
    /// tree produce the same registry. Non-YAML and dot files are
    /// ignored. Any unparseable file fails the whole load; a registry
    /// with silently missing probes would report misleading verdicts.
    pub fn load(root: &Path) -> WebcompatResult<Self> {
        let mut probes = Vec::new();
        collect_dir(root, &mut probes)?;
        tracing::debug!(root = %root.display(), count = probes.len(), "probe registry loaded");
        Self::from_probes(probes)
    }

    /// Build a registry from already-parsed probes, enforcing unique
    /// ids and sorted order.
    pub fn from_probes(mut probes: Vec<Probe>) -> WebcompatResult<Self> {
        let mut seen = HashSet::new();
        for probe in &probes {
            if !seen.insert(probe.metadata.id.clone()) {
                return Err(ProbeParseError::DuplicateId {
                    id: probe.metadata.id.clone(),
                    path: "in-memory".to_string(),
                }
                .into());
            }
        }
        probes.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
        Ok(Self { probes })
    }

    /// All probes, sorted by id.
    #[must_use]
    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    /// Number of probes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Look up one probe by exact id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Probe> {
        self.probes.iter().find(|p| p.metadata.id == id)
    }

    /// Probes whose id matches `pattern`.
    ///
    /// The pattern is tried as a regular expression first; if it does
    /// not compile it is used as a plain substring.
    pub fn matching(&self, pattern: &str) -> Vec<Probe> {
        match regex::Regex::new(pattern) {
            Ok(re) => self
                .probes
                .iter()
                .filter(|p| re.is_match(&p.metadata.id))
                .cloned()
                .collect(),
            Err(_) => self
                .probes
                .iter()
                .filter(|p| p.metadata.id.contains(pattern))
                .cloned()
                .collect(),
        }
    }
}

fn collect_dir(dir: &Path, out: &mut Vec<Probe>) -> WebcompatResult<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|e| e.path())
        .collect();
    entries.sort();

    for path in entries {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_dir(&path, out)?;
            continue;
        }
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        if !is_yaml {
            continue;
        }
        let raw = std::fs::read_to_string(&path)?;
        let probe = Probe::from_yaml(&raw)
            .map_err(|e| e.in_file(path.display().to_string()))
            .map_err(WebcompatError::from)?;
        if let Some(earlier) = out.iter().find(|p| p.metadata.id == probe.metadata.id) {
            return Err(ProbeParseError::DuplicateId {
                id: earlier.metadata.id.clone(),
                path: path.display().to_string(),
            }
            .into());
        }
        tracing::trace!(path = %path.display(), id = %probe.metadata.id, "loaded probe");
        out.push(probe);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_probe(dir: &Path, file: &str, id: &str) {
        let yaml = format!(
            "id: {id}\nurl: https://example.com/\ndisabled:\n  - type: navigate\n"
        );
        fs::write(dir.join(file), yaml).unwrap();
    }

    #[test]
    fn test_load_sorts_by_id() {
        let dir = TempDir::new().unwrap();
        write_probe(dir.path(), "b.yaml", "2_second");
        write_probe(dir.path(), "a.yaml", "1_first");
        write_probe(dir.path(), "c.yml", "3_third");

        let registry = ProbeRegistry::load(dir.path()).unwrap();
        let ids: Vec<_> = registry
            .probes()
            .iter()
            .map(|p| p.metadata.id.as_str())
            .collect();
        assert_eq!(ids, vec!["1_first", "2_second", "3_third"]);
    }

    #[test]
    fn test_load_recurses_and_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("mobile")).unwrap();
        write_probe(&dir.path().join("mobile"), "deep.yaml", "deep_probe");
        fs::write(dir.path().join("README.md"), "not a probe").unwrap();
        fs::write(dir.path().join(".hidden.yaml"), "junk: [").unwrap();

        let registry = ProbeRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("deep_probe").is_some());
    }

    #[test]
    fn test_duplicate_id_across_files_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_probe(dir.path(), "a.yaml", "same_id");
        write_probe(dir.path(), "b.yaml", "same_id");

        let err = ProbeRegistry::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate probe id `same_id`"));
        assert!(err.to_string().contains("b.yaml"));
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.yaml"), "id: [unclosed").unwrap();

        let err = ProbeRegistry::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn test_matching_regex_then_substring() {
        let dir = TempDir::new().unwrap();
        write_probe(dir.path(), "a.yaml", "1448747_mobilesuica");
        write_probe(dir.path(), "b.yaml", "1909448_honeywell");

        let registry = ProbeRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.matching("^14487").len(), 1);
        assert_eq!(registry.matching("honeywell").len(), 1);
        assert_eq!(registry.matching(".*").len(), 2);
        // Invalid regex degrades to substring matching.
        assert_eq!(registry.matching("mobilesuica[").len(), 0);
        assert_eq!(registry.matching("suica").len(), 1);
    }

    #[test]
    fn test_in_memory_duplicate_rejected() {
        let probe = Probe::builder("dup", "https://example.com/")
            .disabled(vec![])
            .build();
        // An empty body list is still a body.
        let probe = probe.unwrap();
        let err = ProbeRegistry::from_probes(vec![probe.clone(), probe]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
