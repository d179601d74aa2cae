use rocket::figment::{Figment, providers::{Env, Format, Toml}};
use rocket::Config as RocketConfig;
use std::env;

pub struct Config;

impl Config {
    fn figment() -> Figment {
        // Get the current profile
        let profile = env::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());

        Figment::from(RocketConfig::default())
            .merge(Toml::file("Rocket.toml").nested())
            .select(&profile)
            .merge(Env::prefixed("ROCKET_").split("__"))
    }

    /// No fallback: tokens are only issued or accepted with a configured secret.
    pub fn jwt_secret() -> Option<String> {
        Self::figment()
            .extract_inner::<String>("jwt_secret")
            .ok()
            .filter(|secret| !secret.is_empty())
    }

    pub fn jwt_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_expiry")
            .unwrap_or(86400)
    }

    pub fn mongodb_uri() -> String {
        Self::figment()
            .extract_inner("mongodb_uri")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
    }

    pub fn database_name() -> String {
        Self::figment()
            .extract_inner("database_name")
            .unwrap_or_else(|_| "slexplora".to_string())
    }

    pub fn frontend_url() -> String {
        Self::figment()
            .extract_inner("frontend_url")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
    }

    pub fn currency() -> String {
        Self::figment()
            .extract_inner("currency")
            .unwrap_or_else(|_| "usd".to_string())
    }

    pub fn is_development() -> bool {
        let profile = env::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());
        profile == "development"
    }

    /// Manual payment completion, never available outside development.
    pub fn allow_manual_completion() -> bool {
        Self::is_development()
            && Self::figment()
                .extract_inner("allow_manual_completion")
                .unwrap_or(false)
    }

    pub fn stripe_secret_key() -> Option<String> {
        Self::figment()
            .extract_inner::<String>("stripe_secret_key")
            .ok()
            .filter(|key| !key.is_empty())
    }

    pub fn stripe_webhook_secret() -> Option<String> {
        Self::figment()
            .extract_inner::<String>("stripe_webhook_secret")
            .ok()
            .filter(|secret| !secret.is_empty())
    }

    pub fn is_stripe_enabled() -> bool {
        Self::stripe_secret_key().is_some()
    }
}
