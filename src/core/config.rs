use std::env;
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub model: String,
    pub api_base_url: String,
    pub storage_path: PathBuf,
    pub system_message: Option<String>,
    /// Used when no key has been stored yet.
    pub fallback_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model = var("PARLEY_MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_base_url =
            var("PARLEY_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let storage_path = PathBuf::from(var("PARLEY_STORAGE_PATH").unwrap_or("./".to_string()));
        let system_message = var("PARLEY_SYSTEM_MESSAGE");
        let fallback_api_key = var("OPENAI_API_KEY");

        Self {
            model,
            api_base_url,
            storage_path,
            system_message,
            fallback_api_key,
        }
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.storage_path.join("credentials.json")
    }
}
