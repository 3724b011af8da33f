pub mod config;
pub mod credentials;
pub mod logging;

pub use config::AppConfig;
pub use credentials::CredentialStore;
