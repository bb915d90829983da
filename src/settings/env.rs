//! Environment source: an optional dotenv file overlaid by the process
//! environment.

use std::io;
use std::path::Path;

use ahash::AHashMap;

use super::ConfigError;

/// Case-insensitive view of configuration variables.
///
/// Process variables win over entries from the env file. A missing file is
/// not an error; an unreadable or malformed one is.
///
/// # Examples
///
/// ```rust
/// use scopewire::settings::EnvSource;
///
/// let source = EnvSource::from_pairs([("DB__NAME", "app"), ("debug", "yes")]);
/// assert_eq!(source.get("db__name"), Some("app"));
/// assert_eq!(source.get("DEBUG"), Some("yes"));
/// assert_eq!(source.get("missing"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    vars: AHashMap<String, String>,
}

impl EnvSource {
    /// Reads `path` (if it exists), then layers the process environment on top.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut source = Self::from_file(path)?;
        source.extend(std::env::vars());
        Ok(source)
    }

    /// Reads only the dotenv file, ignoring the process environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut source = Self::default();
        #[allow(deprecated)]
        let entries = match dotenv::from_path_iter(path) {
            Ok(iter) => iter,
            Err(dotenv::Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "env file not found, skipping");
                return Ok(source);
            }
            Err(err) => {
                return Err(ConfigError::EnvFile {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        };

        for entry in entries {
            let (key, value) = entry.map_err(|err| ConfigError::EnvFile {
                path: path.to_path_buf(),
                source: err,
            })?;
            source.insert(key, value);
        }
        Ok(source)
    }

    /// Only the process environment.
    pub fn from_process() -> Self {
        let mut source = Self::default();
        source.extend(std::env::vars());
        source
    }

    /// Builds a source from literal pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut source = Self::default();
        source.extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        source
    }

    /// Sets one variable, replacing any previous value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key.into(), value.into());
        self
    }

    /// Looks a variable up, ignoring case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    fn insert(&mut self, key: String, value: String) {
        self.vars.insert(key.to_ascii_lowercase(), value);
    }

    fn extend(&mut self, pairs: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in pairs {
            self.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = EnvSource::from_file(dir.path().join(".env.absent")).unwrap();
        assert_eq!(source.get("anything"), None);
    }

    #[test]
    fn test_file_entries_are_case_folded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "DB__NAME=from_file").unwrap();
        writeln!(file, "Allow_Origins=http://a.test").unwrap();

        let source = EnvSource::from_file(file.path()).unwrap();
        assert_eq!(source.get("db__name"), Some("from_file"));
        assert_eq!(source.get("ALLOW_ORIGINS"), Some("http://a.test"));
    }

    #[test]
    fn test_quoting_follows_dotenv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "QUOTED='[\"*\"]'").unwrap();
        writeln!(file, "BARE=[\"*\"]").unwrap();

        let source = EnvSource::from_file(file.path()).unwrap();
        assert_eq!(source.get("quoted"), Some(r#"["*"]"#));
        assert_eq!(source.get("bare"), Some("[*]"));
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EnvSource::from_file(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::EnvFile { .. }));
    }

    #[test]
    fn test_later_values_win() {
        let source = EnvSource::from_pairs([("DEBUG", "false")]).with("debug", "true");
        assert_eq!(source.get("Debug"), Some("true"));
    }
}
