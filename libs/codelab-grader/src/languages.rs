// Language table management: internal language names → executor runtime ids
use anyhow::{bail, Context, Result};
use codelab_common::types::{Language, RuntimeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Short names learners and lesson authors use for the canonical ids
const ALIASES: &[(&str, &str)] = &[
    ("py", "python"),
    ("python3", "python"),
    ("js", "javascript"),
    ("node", "javascript"),
    ("nodejs", "javascript"),
    ("c++", "cpp"),
    ("cplusplus", "cpp"),
    ("c#", "csharp"),
    ("cs", "csharp"),
    ("golang", "go"),
    ("rs", "rust"),
    ("ts", "typescript"),
    ("rb", "ruby"),
    ("kt", "kotlin"),
];

/// Lower-case a language name and resolve aliases to the canonical id
pub fn normalize(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(lowered)
}

/// On-disk shape of `config/languages.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageTable {
    pub languages: Vec<Language>,
}

impl LanguageTable {
    /// Load the language table from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Language config file not found: {}", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json_content =
            serde_json::to_string_pretty(self).context("Failed to serialize language table")?;

        fs::write(path, json_content)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Executor runtimes available out of the box
    pub fn builtin() -> Self {
        let entry = |id: &str, display_name: &str, runtime_id: RuntimeId, ext: &str| Language {
            id: id.to_string(),
            display_name: display_name.to_string(),
            runtime_id,
            file_extension: ext.to_string(),
            is_active: true,
        };

        Self {
            languages: vec![
                entry("python", "Python (3.8.1)", 71, ".py"),
                entry("javascript", "JavaScript (Node.js 12.14.0)", 63, ".js"),
                entry("java", "Java (OpenJDK 13.0.1)", 62, ".java"),
                entry("c", "C (GCC 9.2.0)", 50, ".c"),
                entry("cpp", "C++ (GCC 9.2.0)", 54, ".cpp"),
                entry("csharp", "C# (Mono 6.6.0.161)", 51, ".cs"),
                entry("go", "Go (1.13.5)", 60, ".go"),
                entry("rust", "Rust (1.40.0)", 73, ".rs"),
                entry("ruby", "Ruby (2.7.0)", 72, ".rb"),
                entry("php", "PHP (7.4.1)", 68, ".php"),
                entry("typescript", "TypeScript (3.7.4)", 74, ".ts"),
                entry("kotlin", "Kotlin (1.3.70)", 78, ".kt"),
            ],
        }
    }

    /// Add a language, rejecting blanks and duplicates
    pub fn add(&mut self, mut language: Language) -> Result<()> {
        language.id = normalize(&language.id);

        if language.id.is_empty() || language.display_name.trim().is_empty() {
            bail!("Language id and display name cannot be empty");
        }
        if language.file_extension.trim().is_empty() {
            bail!("File extension cannot be empty");
        }
        if !language.file_extension.starts_with('.') {
            language.file_extension = format!(".{}", language.file_extension);
        }
        if self.languages.iter().any(|l| l.id == language.id) {
            bail!("Language '{}' already exists in config", language.id);
        }

        self.languages.push(language);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<Language> {
        let id = normalize(id);
        let index = self
            .languages
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| anyhow::anyhow!("Language '{}' not found in config", id))?;
        Ok(self.languages.remove(index))
    }
}

/// Read-only lookup from language name to executor runtime id.
///
/// Misses never fail the pipeline: they log and degrade to the default runtime.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    languages: HashMap<String, Language>,
    default_runtime_id: RuntimeId,
}

impl LanguageRegistry {
    pub fn new(table: LanguageTable, default_runtime_id: RuntimeId) -> Self {
        let languages = table
            .languages
            .into_iter()
            .map(|lang| (normalize(&lang.id), lang))
            .collect();

        Self {
            languages,
            default_runtime_id,
        }
    }

    pub fn builtin(default_runtime_id: RuntimeId) -> Self {
        Self::new(LanguageTable::builtin(), default_runtime_id)
    }

    /// Load from `path`, or fall back to the built-in table when the file is absent.
    /// A file that exists but cannot be parsed is an error.
    pub fn load_or_builtin(path: &Path, default_runtime_id: RuntimeId) -> Result<Self> {
        if !path.exists() {
            info!(
                path = %path.display(),
                "Language config not found, using built-in language table"
            );
            return Ok(Self::builtin(default_runtime_id));
        }

        let table = LanguageTable::load(path)?;
        info!(
            path = %path.display(),
            languages = table.languages.len(),
            "Loaded language table"
        );
        Ok(Self::new(table, default_runtime_id))
    }

    /// Resolve a language name to the executor runtime id.
    /// Unknown or inactive languages resolve to the configured default.
    pub fn resolve_runtime_id(&self, language_name: &str) -> RuntimeId {
        let key = normalize(language_name);

        match self.languages.get(&key) {
            Some(lang) if lang.is_active => {
                debug!(language = %key, runtime_id = lang.runtime_id, "Resolved runtime");
                lang.runtime_id
            }
            Some(_) => {
                warn!(
                    language = %key,
                    default_runtime_id = self.default_runtime_id,
                    "Language is inactive, falling back to default runtime"
                );
                self.default_runtime_id
            }
            None => {
                warn!(
                    language = %key,
                    default_runtime_id = self.default_runtime_id,
                    "Unknown language, falling back to default runtime"
                );
                self.default_runtime_id
            }
        }
    }

    pub fn get(&self, language_name: &str) -> Option<&Language> {
        self.languages.get(&normalize(language_name))
    }

    pub fn default_runtime_id(&self) -> RuntimeId {
        self.default_runtime_id
    }

    /// Active languages, sorted by id
    pub fn active_languages(&self) -> Vec<&Language> {
        let mut active: Vec<&Language> = self.languages.values().filter(|l| l.is_active).collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }
}
