use anyhow::{Result, bail};

use crate::core::{AppConfig, CredentialStore};

pub fn run(config: &AppConfig, api_key: &str) -> Result<()> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        bail!("API key can't be empty");
    }

    let store = CredentialStore::new(&config.credentials_path());
    store.save(api_key)?;
    println!("API key saved to {}", store.path().display());

    Ok(())
}
