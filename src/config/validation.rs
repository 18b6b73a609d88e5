//! Startup validation for required settings.

use super::{Config, ConfigError};

/// Check that everything the services need to come up is present. Missing
/// crypto keys are unrecoverable: the protocol cannot be spoken without them.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let mut problems = Vec::new();

    if config.auth_keys.is_none() {
        problems.push("Key.Auth.N / Key.Auth.K not configured");
    }
    if config.game_keys.is_none() {
        problems.push("Key.Game.N / Key.Game.K not configured");
    }
    if config.gate_keys.is_none() {
        problems.push("Key.Gate.N / Key.Gate.K not configured");
    }
    if config.lobby_port == 0 {
        problems.push("Lobby.Port must be nonzero");
    }
    if config.status_port == 0 {
        problems.push("Status.Port must be nonzero");
    }
    if config.db.password.is_empty() {
        problems.push("Db.Password not configured");
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::crypt::CryptKeys;

    fn keys() -> Option<CryptKeys> {
        Some(CryptKeys {
            n: [1; 64],
            k: [2; 64],
        })
    }

    #[test]
    fn default_config_is_missing_keys() {
        let err = validate(&Config::default()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Key.Auth"));
        assert!(message.contains("Key.Gate"));
    }

    #[test]
    fn complete_config_passes() {
        let mut config = Config::default();
        config.auth_keys = keys();
        config.game_keys = keys();
        config.gate_keys = keys();
        config.db.password = "hunter2".to_string();
        assert!(validate(&config).is_ok());
    }
}
