//! `.age` descriptor loading.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

use crate::sdl::parser::ENCRYPTION_MAGICS;

/// Static parameters of an age, read from its `.age` file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeInfo {
    pub start_time: u32,
    pub day_length: f64,
    pub max_capacity: u32,
    pub linger_time: u32,
    pub seq_prefix: i32,
}

impl Default for AgeInfo {
    fn default() -> Self {
        Self {
            start_time: 0,
            day_length: 24.0,
            max_capacity: 0,
            linger_time: 180,
            seq_prefix: -1,
        }
    }
}

#[derive(Debug, Error)]
pub enum AgeError {
    #[error("cannot read {0}: {1}")]
    Io(String, std::io::Error),

    #[error("{0} is encrypted; decrypt .age files before starting the server")]
    Encrypted(String),
}

/// Parse one `.age` source. Unknown keys are logged and skipped.
pub fn parse(contents: &str, source: &str) -> AgeInfo {
    let mut age = AgeInfo::default();
    for raw in contents.lines() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            tracing::warn!(file = source, "Invalid AGE line: {line}");
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        let parsed = match key {
            "StartDateTime" => value.parse().map(|v| age.start_time = v).is_ok(),
            "DayLength" => value.parse().map(|v| age.day_length = v).is_ok(),
            "MaxCapacity" => value.parse().map(|v| age.max_capacity = v).is_ok(),
            "LingerTime" => value.parse().map(|v| age.linger_time = v).is_ok(),
            "SequencePrefix" => value.parse().map(|v| age.seq_prefix = v).is_ok(),
            "ReleaseVersion" | "Page" => true, // Ignored
            _ => {
                tracing::warn!(file = source, "Invalid AGE line: {line}");
                true
            }
        };
        if !parsed {
            tracing::warn!(file = source, "Invalid AGE value: {line}");
        }
    }
    age
}

/// Load every `.age` descriptor in a directory, keyed by age filename. Ages
/// with a negative sequence prefix are not joinable and get skipped.
pub fn load_ages(age_path: &Path) -> Result<HashMap<String, AgeInfo>, AgeError> {
    let mut ages = HashMap::new();
    let entries = std::fs::read_dir(age_path)
        .map_err(|e| AgeError::Io(age_path.display().to_string(), e))?;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "age") {
            continue;
        }
        let contents =
            std::fs::read(&path).map_err(|e| AgeError::Io(path.display().to_string(), e))?;
        if ENCRYPTION_MAGICS
            .iter()
            .any(|magic| contents.starts_with(*magic))
        {
            return Err(AgeError::Encrypted(path.display().to_string()));
        }

        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let age = parse(
            &String::from_utf8_lossy(&contents),
            &path.display().to_string(),
        );
        if age.seq_prefix >= 0 {
            ages.insert(name.to_string(), age);
        }
    }

    if ages.is_empty() {
        tracing::warn!(path = %age_path.display(), "No age descriptors found");
    } else {
        tracing::info!(count = ages.len(), "Loaded age descriptors");
    }
    Ok(ages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognized_keys() {
        let age = parse(
            "StartDateTime=919296000\n\
             DayLength=30.5\n\
             MaxCapacity=150\n\
             LingerTime=180\n\
             SequencePrefix=1\n\
             ReleaseVersion=0\n\
             Page=Teledahn,0\n\
             Bogus=1\n",
            "Teledahn.age",
        );
        assert_eq!(age.start_time, 919_296_000);
        assert_eq!(age.day_length, 30.5);
        assert_eq!(age.max_capacity, 150);
        assert_eq!(age.seq_prefix, 1);
    }

    #[test]
    fn load_skips_negative_prefixes_and_rejects_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Teledahn.age"),
            "SequencePrefix=1\nDayLength=24\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("GlobalAvatars.age"),
            "SequencePrefix=-2\n",
        )
        .unwrap();
        let ages = load_ages(dir.path()).unwrap();
        assert!(ages.contains_key("Teledahn"));
        assert!(!ages.contains_key("GlobalAvatars"));

        std::fs::write(dir.path().join("Secret.age"), b"notthedroids!!").unwrap();
        assert!(matches!(
            load_ages(dir.path()),
            Err(AgeError::Encrypted(_))
        ));
    }
}
