//! `key=value` settings file parsing.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

use super::Config;
use crate::net::crypt::CryptKeys;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {0}: {1}")]
    Io(String, std::io::Error),

    #[error("line {0}: {1}")]
    BadValue(usize, String),

    #[error("{0}")]
    Invalid(String),
}

fn decode_key_blob(line: usize, value: &str, expect: usize) -> Result<Vec<u8>, ConfigError> {
    let blob = BASE64
        .decode(value)
        .map_err(|e| ConfigError::BadValue(line, format!("bad base64 key material: {e}")))?;
    if blob.len() != expect {
        return Err(ConfigError::BadValue(
            line,
            format!("key material must be {expect} bytes, got {}", blob.len()),
        ));
    }
    Ok(blob)
}

fn keys_mut<'a>(config: &'a mut Config, service: &str) -> &'a mut Option<CryptKeys> {
    match service {
        "Auth" => &mut config.auth_keys,
        "Game" => &mut config.game_keys,
        _ => &mut config.gate_keys,
    }
}

fn set_key_half(
    config: &mut Config,
    line: usize,
    service: &str,
    half: &str,
    value: &str,
) -> Result<(), ConfigError> {
    let blob = decode_key_blob(line, value, 64)?;
    let keys = keys_mut(config, service);
    let entry = keys.get_or_insert_with(|| CryptKeys {
        n: [0; 64],
        k: [0; 64],
    });
    let target = if half == "N" {
        &mut entry.n
    } else {
        &mut entry.k
    };
    target.copy_from_slice(&blob);
    Ok(())
}

fn parse_number<T: std::str::FromStr>(line: usize, key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::BadValue(line, format!("bad numeric value for {key}: {value}")))
}

fn parse_bool(line: usize, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::BadValue(
            line,
            format!("bad boolean value for {key}: {value}"),
        )),
    }
}

/// Parse settings text into a config, starting from defaults. Unknown keys
/// warn and are skipped.
pub fn parse(contents: &str) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    for (lineno, raw) in contents.lines().enumerate() {
        let lineno = lineno + 1;
        let stripped = raw.split('#').next().unwrap_or("").trim();
        if stripped.is_empty() {
            continue;
        }
        let Some((key, value)) = stripped.split_once('=') else {
            tracing::warn!(line = lineno, "Invalid config line: {stripped}");
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "Key.Auth.N" => set_key_half(&mut config, lineno, "Auth", "N", value)?,
            "Key.Auth.K" => set_key_half(&mut config, lineno, "Auth", "K", value)?,
            "Key.Game.N" => set_key_half(&mut config, lineno, "Game", "N", value)?,
            "Key.Game.K" => set_key_half(&mut config, lineno, "Game", "K", value)?,
            "Key.Gate.N" => set_key_half(&mut config, lineno, "Gate", "N", value)?,
            "Key.Gate.K" => set_key_half(&mut config, lineno, "Gate", "K", value)?,
            "Key.Wdys" => {
                let blob = decode_key_blob(lineno, value, 16)?;
                config.wdys_key.copy_from_slice(&blob);
            }
            "Lobby.Addr" => config.lobby_addr = value.to_string(),
            "Lobby.Port" => config.lobby_port = parse_number(lineno, key, value)?,
            "Status.Addr" => config.status_addr = value.to_string(),
            "Status.Port" => config.status_port = parse_number(lineno, key, value)?,
            "File.Host" => config.file_server_addr = value.to_string(),
            "Auth.Host" => config.auth_server_addr = value.to_string(),
            "Game.Host" => config.game_server_addr = value.to_string(),
            "Gate.Host" => config.gate_server_addr = value.to_string(),
            "Db.Host" => config.db.host = value.to_string(),
            "Db.Port" => config.db.port = parse_number(lineno, key, value)?,
            "Db.Username" => config.db.username = value.to_string(),
            "Db.Password" => config.db.password = value.to_string(),
            "Db.Database" => config.db.database = value.to_string(),
            "File.Root" => config.file_root = value.to_string(),
            "Age.Path" => config.age_path = value.to_string(),
            "Sdl.Path" => config.sdl_path = value.to_string(),
            "Welcome.Msg" => config.welcome_msg = value.to_string(),
            "Client.BuildId" => config.build_id = parse_number(lineno, key, value)?,
            "Login.Restricted" => config.restrict_logins = parse_bool(lineno, key, value)?,
            unknown => {
                tracing::warn!(line = lineno, "Unrecognized config parameter: {unknown}");
            }
        }
    }

    Ok(config)
}

/// Load a settings file from disk.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
    parse(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> String {
        BASE64.encode([7u8; 64])
    }

    #[test]
    fn parses_known_keys_and_skips_unknown() {
        let contents = format!(
            "# shard settings\n\
             Lobby.Port = 14618\n\
             Db.Host = db.example.net   # inline comment\n\
             Key.Auth.N = {key}\n\
             Key.Auth.K = {key}\n\
             Some.Mystery = 42\n\
             Login.Restricted = true\n",
            key = sample_key()
        );
        let config = parse(&contents).unwrap();
        assert_eq!(config.lobby_port, 14618);
        assert_eq!(config.db.host, "db.example.net");
        assert!(config.restrict_logins);
        let keys = config.auth_keys.expect("auth keys");
        assert_eq!(keys.n, [7u8; 64]);
        assert_eq!(keys.k, [7u8; 64]);
        assert!(config.game_keys.is_none());
    }

    #[test]
    fn rejects_short_key_material() {
        let contents = format!("Key.Gate.N = {}", BASE64.encode([1u8; 8]));
        assert!(matches!(
            parse(&contents),
            Err(ConfigError::BadValue(1, _))
        ));
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(parse("Lobby.Port = lots").is_err());
        assert!(parse("Login.Restricted = maybe").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.ini");
        std::fs::write(&path, "Welcome.Msg = Shorah\n").unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.welcome_msg, "Shorah");
    }
}
