//! ChatVault configuration management

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main ChatVault configuration
///
/// Built once at process start and shared read-only. Changing any value
/// requires restarting the warm process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatVaultConfig {
    /// Warm process server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Fast trigger filter keyword tables
    #[serde(default)]
    pub triggers: TriggerConfig,

    /// Local model collaborator configuration
    #[serde(default)]
    pub models: ModelsConfig,

    /// Remote chat service configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Local store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Overrides for user-facing message strings
    #[serde(default)]
    pub messages: HashMap<String, String>,
}

impl ChatVaultConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Load from `path` if given, otherwise from the default location if it
    /// exists, otherwise fall back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = default_base_dir().join("config.toml");
                if default_path.exists() {
                    Self::from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Warm process server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to (loopback only in practice)
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Seconds without a request before the process exits
    pub idle_timeout_secs: u64,

    /// Accept-loop poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// How often the idle monitor checks, in milliseconds
    pub idle_check_interval_ms: u64,

    /// Delay between acknowledging `shutdown` and stopping, in milliseconds
    pub shutdown_grace_ms: u64,

    /// Maximum request payload size in bytes
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5555,
            idle_timeout_secs: 600,
            poll_interval_ms: 1000,
            idle_check_interval_ms: 10_000,
            shutdown_grace_ms: 500,
            max_request_bytes: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding and connecting
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Trigger keyword tables, keyed by language code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Patterns per language. Literal tokens, multi-word phrases and
    /// wildcard slots (`my {x} is`) are all accepted.
    pub keywords: BTreeMap<String, Vec<String>>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            keywords: default_trigger_keywords(),
        }
    }
}

/// Built-in trigger table, used when configuration supplies none
pub fn default_trigger_keywords() -> BTreeMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 8] = [
        (
            "en",
            &[
                "db", "database", "locally", "save", "store", "remember", "note", "keep",
                "get", "retrieve", "fetch", "show", "list", "display", "forget", "delete",
                "remove", "clear", "update", "change", "stored", "saved", "my data",
                "my {x} is", "what is my", "what's my",
            ],
        ),
        (
            "de",
            &[
                "db", "datenbank", "lokal", "speicher", "speichere", "speichern", "merke",
                "merk", "notiere", "hole", "hol", "zeig", "zeige", "liste", "vergiss",
                "lösche", "löschen", "entferne", "ändere", "aktualisiere", "gespeichert",
                "meine daten", "mein {x} ist", "meine {x} ist", "wie ist meine", "wie ist mein",
            ],
        ),
        (
            "es",
            &[
                "base de datos", "guarda", "guardar", "recuerda", "anota", "muestra",
                "muéstrame", "dame", "lista", "olvida", "elimina", "borra", "actualiza",
                "cambia", "guardados", "mis datos", "mi {x} es",
            ],
        ),
        (
            "fr",
            &[
                "base de données", "sauvegarde", "enregistre", "souviens", "note",
                "affiche", "montre", "liste", "oublie", "supprime", "efface", "modifie",
                "mes données", "mon {x} est",
            ],
        ),
        (
            "it",
            &[
                "salva", "ricorda", "annota", "mostra", "mostrami", "elenca", "dimentica",
                "elimina", "cancella", "aggiorna", "miei dati", "il mio {x} è",
            ],
        ),
        (
            "pt",
            &[
                "salvar", "salva", "lembra", "lembrar", "anotar", "mostrar", "mostra",
                "listar", "esquecer", "esquece", "apagar", "apaga", "atualizar",
                "meus dados", "meu {x} é",
            ],
        ),
        (
            "ja",
            &["データベース", "保存", "覚えて", "取得", "忘れて", "削除", "リスト", "更新"],
        ),
        (
            "zh",
            &["数据库", "保存", "记住", "显示", "忘记", "删除", "列表", "更新"],
        ),
    ];

    table
        .iter()
        .map(|(lang, words)| {
            (
                lang.to_string(),
                words.iter().map(|w| w.to_string()).collect(),
            )
        })
        .collect()
}

/// How the local model runner is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelBackend {
    /// `ollama run <model> <prompt>` subprocess (default)
    #[default]
    Cli,
    /// `POST {base_url}/api/generate`
    Http,
}

/// Local model collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Transport to the model runner
    pub backend: ModelBackend,

    /// Runner executable for the CLI backend
    pub runner_command: String,

    /// Base URL for the HTTP backend
    pub base_url: String,

    /// Model used for intent classification
    pub classifier_model: String,

    /// Model used for per-action data extraction
    pub extractor_model: String,

    /// Timeout for a single model call, in seconds
    pub timeout_secs: u64,

    /// Skip the model entirely and use deterministic rules only
    pub rules_only: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::Cli,
            runner_command: "ollama".to_string(),
            base_url: "http://127.0.0.1:11434".to_string(),
            classifier_model: "phi3".to_string(),
            extractor_model: "llama3.2:3b".to_string(),
            timeout_secs: 15,
            rules_only: false,
        }
    }
}

/// Remote chat service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Chat completion endpoint
    pub api_url: String,

    /// Model requested from the remote service
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Number of user/assistant exchanges sent as context
    pub context_window: usize,

    /// Sampling temperature
    pub temperature: f32,

    /// Completion token cap
    pub max_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            context_window: 20,
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

impl ChatConfig {
    /// Resolve the API key from the environment.
    ///
    /// Tries the configured name, then its UPPER_CASE form.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .or_else(|_| std::env::var(self.api_key_env.to_uppercase()))
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

/// Local store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for ChatVault state
    pub base_dir: PathBuf,

    /// SQLite database file
    pub db_path: PathBuf,

    /// Environment variable holding the SQLCipher key
    /// (only honoured with the `encryption` feature)
    pub encryption_key_env: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = default_base_dir();
        Self {
            db_path: base.join("memory.db"),
            base_dir: base,
            encryption_key_env: None,
        }
    }
}

/// Default base directory (~/.chatvault)
pub fn default_base_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatvault")
}
