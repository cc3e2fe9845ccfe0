use crate::error::Result;
use crate::evolution::ScorePolicy;
use serde_yaml::Value;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Name of the per-project data directory
pub const DATA_DIR: &str = ".moneta";

/// Backing file holding every memory
pub const MEMORY_FILE: &str = "memories.json";

const CONFIG_FILE: &str = "_config.yaml";

/// Similarity method information
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// Similarity methods the engine knows how to run
pub static SIMILARITY_METHODS: &[MethodInfo] = &[
    MethodInfo {
        name: "tfidf",
        description: "Default. Term-frequency x inverse-document-frequency cosine",
    },
    MethodInfo {
        name: "lite",
        description: "Character trigram hashing, no corpus statistics",
    },
    MethodInfo {
        name: "server",
        description: "Dense vectors from the external embedding daemon",
    },
];

pub const DEFAULT_METHOD: &str = "tfidf";

/// Relevance floor used when injecting memories into a prompt
pub const DEFAULT_MIN_RELEVANCE: f64 = 0.2;

/// Number of memories injected into a prompt
pub const DEFAULT_TOP_K: usize = 5;

/// Similarity a pair needs to be drawn as a network edge
pub const DEFAULT_NETWORK_THRESHOLD: f64 = 0.35;

pub const DEFAULT_EMBEDDING_SOCKET: &str = "/tmp/moneta-embedder.sock";

/// Configuration manager for a .moneta directory
pub struct MonetaConfig {
    data_path: PathBuf,
    config_file: PathBuf,
    config: HashMap<String, Value>,
}

impl MonetaConfig {
    pub fn new(data_path: PathBuf) -> Self {
        let config_file = data_path.join(CONFIG_FILE);
        let mut instance = Self {
            data_path,
            config_file,
            config: HashMap::new(),
        };
        instance.load();
        instance
    }

    fn load(&mut self) {
        if !self.config_file.exists() {
            return;
        }

        let parsed = fs::read_to_string(&self.config_file)
            .map_err(crate::error::MemoryError::from)
            .and_then(|content| {
                serde_yaml::from_str::<HashMap<String, Value>>(&content).map_err(Into::into)
            });

        match parsed {
            Ok(config) => self.config = config,
            Err(e) => warn!(path = %self.config_file.display(), error = %e, "ignoring unreadable config"),
        }
    }

    fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_path)?;
        let content = serde_yaml::to_string(&self.config)?;
        fs::write(&self.config_file, content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.config
            .insert(key.to_string(), Value::String(value.to_string()));
        self.save()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.config.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn get_f64(&self, key: &str) -> Option<f64> {
        let raw = self.get(key)?;
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v),
            _ => {
                warn!(key, value = %raw, "ignoring non-numeric config value");
                None
            }
        }
    }

    pub fn similarity_method(&self) -> String {
        self.get("similarity_method")
            .unwrap_or_else(|| DEFAULT_METHOD.to_string())
    }

    pub fn set_similarity_method(&mut self, value: &str) -> Result<()> {
        self.set("similarity_method", value)
    }

    pub fn min_relevance(&self) -> f64 {
        self.get_f64("min_relevance")
            .unwrap_or(DEFAULT_MIN_RELEVANCE)
    }

    pub fn network_threshold(&self) -> f64 {
        self.get_f64("network_threshold")
            .unwrap_or(DEFAULT_NETWORK_THRESHOLD)
    }

    pub fn embedding_socket(&self) -> PathBuf {
        self.get("embedding_socket")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EMBEDDING_SOCKET))
    }

    /// Score evolution constants, with any configured overrides applied
    pub fn score_policy(&self) -> ScorePolicy {
        let mut policy = ScorePolicy::default();
        if let Some(hours) = self.get_f64("half_life_hours").filter(|h| *h > 0.0) {
            match Duration::try_from_secs_f64(hours * 3600.0) {
                Ok(half_life) if !half_life.is_zero() => policy.half_life = half_life,
                _ => warn!(hours, "half_life_hours out of range, using default"),
            }
        }
        if let Some(bonus) = self.get_f64("retrieval_bonus").filter(|b| *b >= 0.0) {
            policy.retrieval_bonus = bonus;
        }
        if let Some(bonus) = self.get_f64("connection_bonus").filter(|b| *b >= 0.0) {
            policy.connection_bonus = bonus;
        }
        policy
    }
}

/// Find the .moneta directory, searching upward from current directory
pub fn find_moneta_path() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let data = current.join(DATA_DIR);
        if data.is_dir() {
            return Some(data);
        }

        if !current.pop() {
            break;
        }
    }

    // Check MONETA_PATH environment variable
    if let Ok(path) = std::env::var("MONETA_PATH") {
        let data = PathBuf::from(path);
        if data.is_dir() {
            return Some(data);
        }
    }

    let home = dirs::home_dir()?.join(DATA_DIR);
    home.is_dir().then_some(home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonetaConfig::new(dir.path().to_path_buf());

        assert_eq!(config.similarity_method(), DEFAULT_METHOD);
        assert_eq!(config.min_relevance(), DEFAULT_MIN_RELEVANCE);
        assert_eq!(config.network_threshold(), DEFAULT_NETWORK_THRESHOLD);
    }

    #[test]
    fn test_set_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MonetaConfig::new(dir.path().to_path_buf());
        config.set_similarity_method("lite").unwrap();
        config.set("half_life_hours", "12").unwrap();

        let reloaded = MonetaConfig::new(dir.path().to_path_buf());
        assert_eq!(reloaded.similarity_method(), "lite");
        assert_eq!(
            reloaded.score_policy().half_life,
            Duration::from_secs(12 * 3600)
        );
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MonetaConfig::new(dir.path().to_path_buf());
        config.set("min_relevance", "lots").unwrap();
        config.set("half_life_hours", "-3").unwrap();

        assert_eq!(config.min_relevance(), DEFAULT_MIN_RELEVANCE);
        assert_eq!(config.score_policy().half_life, ScorePolicy::default().half_life);

        config.set("half_life_hours", "1e20").unwrap();
        assert_eq!(config.score_policy().half_life, ScorePolicy::default().half_life);

        config.set("half_life_hours", "1e-300").unwrap();
        assert_eq!(config.score_policy().half_life, ScorePolicy::default().half_life);
    }
}
