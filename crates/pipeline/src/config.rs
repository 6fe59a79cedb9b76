//! The read-only project configuration store.
//!
//! The configuration document maps a project identifier to the command that
//! should run when that project's webhook fires:
//!
//! ```yaml
//! proj-a:
//!   command: ./deploy.sh --env production   # string or list of strings
//!   secret: s3cr3t                          # shared webhook token
//!   background: false                       # default: true
//!   timeout_secs: 300                       # optional, foreground only
//! ```
//!
//! The store is built once at startup and never mutated, so it can be shared
//! between request tasks behind an `Arc` without locking.
//!
//! Project keys and secrets are text. Unquoted numbers are accepted and read
//! in their YAML form (`2024:` is project `"2024"`); quote values whose exact
//! spelling matters, such as secrets with leading zeros.
//!
//! Entries missing `command` or `secret` still load. They are kept as
//! [`ConfigEntry::Incomplete`] so the operator can be told about them, and
//! every lookup of such a project fails with [`LookupError::Incomplete`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_yaml::Value as YamlValue;

use crate::{CommandLine, ConfigError, ExecutionMode, LookupError, ProjectId, SecretToken};

/// Key of the command field in the configuration document.
pub const COMMAND_KEY: &str = "command";
/// Key of the secret field in the configuration document.
pub const SECRET_KEY: &str = "secret";

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A complete, dispatchable project configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEntry {
    command: CommandLine,
    secret: SecretToken,
    mode: ExecutionMode,
    timeout: Option<Duration>,
}

impl ProjectEntry {
    /// Creates an entry from its parts.
    pub fn new(
        command: CommandLine,
        secret: SecretToken,
        mode: ExecutionMode,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            command,
            secret,
            mode,
            timeout,
        }
    }

    /// The command to launch.
    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    /// The token a request must present.
    pub fn secret(&self) -> &SecretToken {
        &self.secret
    }

    /// Whether the receiver waits for the command.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Per-project limit on a foreground run, overriding the deployment default.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

// ---------------------------------------------------------------------------

/// One project's slot in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEntry {
    /// All required fields are present.
    Complete(ProjectEntry),
    /// A required field is absent; the project can never be dispatched.
    Incomplete {
        /// The first missing field (`command` before `secret`).
        missing: &'static str,
    },
}

/// Outcome of checking a raw entry field for presence.
enum Field<T> {
    Found(T),
    Missing(&'static str),
}

#[derive(Debug, Default, Deserialize)]
struct RawProjectEntry {
    #[serde(default)]
    command: Option<RawCommand>,
    #[serde(default, alias = "secret_token", alias = "secretToken")]
    secret: Option<RawScalar>,
    #[serde(default)]
    background: Option<bool>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCommand {
    Line(String),
    Argv(Vec<String>),
}

/// A YAML scalar read as text, so that unquoted numbers keep working.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Text(String),
    Number(serde_yaml::Number),
}

impl RawScalar {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}

impl RawProjectEntry {
    fn command(&self, project: &ProjectId) -> Result<Field<CommandLine>, ConfigError> {
        let parsed = match &self.command {
            None => None,
            Some(RawCommand::Argv(argv)) => CommandLine::from_argv(argv.clone()),
            Some(RawCommand::Line(line)) => {
                CommandLine::parse(line).map_err(|e| ConfigError::InvalidCommand {
                    project: project.clone(),
                    reason: e.to_string(),
                })?
            }
        };
        Ok(match parsed {
            Some(command) => Field::Found(command),
            None => Field::Missing(COMMAND_KEY),
        })
    }

    fn secret(&mut self) -> Field<SecretToken> {
        match self
            .secret
            .take()
            .map(RawScalar::into_string)
            .and_then(SecretToken::new)
        {
            Some(secret) => Field::Found(secret),
            None => Field::Missing(SECRET_KEY),
        }
    }

    fn into_entry(mut self, project: &ProjectId) -> Result<ConfigEntry, ConfigError> {
        let command = match self.command(project)? {
            Field::Found(command) => command,
            Field::Missing(missing) => return Ok(ConfigEntry::Incomplete { missing }),
        };
        let secret = match self.secret() {
            Field::Found(secret) => secret,
            Field::Missing(missing) => return Ok(ConfigEntry::Incomplete { missing }),
        };
        let mode = ExecutionMode::from_background_flag(self.background.unwrap_or(true));
        let timeout = self
            .timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        Ok(ConfigEntry::Complete(ProjectEntry::new(
            command, secret, mode, timeout,
        )))
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Immutable mapping of project identifier to configuration entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigStore {
    entries: BTreeMap<ProjectId, ConfigEntry>,
}

impl ConfigStore {
    /// Parses a YAML (or JSON) configuration document.
    ///
    /// A document that is empty or `null` yields an empty store. Entries
    /// missing required fields load as [`ConfigEntry::Incomplete`]; any other
    /// shape problem fails the whole load.
    pub fn from_yaml_str(document: &str) -> Result<Self, ConfigError> {
        if document.trim().is_empty() {
            return Ok(Self::default());
        }
        let root: YamlValue = serde_yaml::from_str(document)?;
        let mapping = match root {
            YamlValue::Null => return Ok(Self::default()),
            YamlValue::Mapping(mapping) => mapping,
            _ => return Err(ConfigError::NotAMapping),
        };

        let mut entries = BTreeMap::new();
        for (key, value) in mapping {
            let project = match &key {
                YamlValue::String(s) => ProjectId::new(s.clone()),
                YamlValue::Number(n) => ProjectId::new(n.to_string()),
                _ => None,
            }
            .ok_or_else(|| ConfigError::InvalidProjectKey {
                key: format!("{key:?}"),
            })?;

            let raw = match value {
                YamlValue::Null => RawProjectEntry::default(),
                other => serde_yaml::from_value::<RawProjectEntry>(other).map_err(|e| {
                    ConfigError::InvalidEntry {
                        project: project.clone(),
                        reason: e.to_string(),
                    }
                })?,
            };
            let entry = raw.into_entry(&project)?;
            entries.insert(project, entry);
        }
        Ok(Self { entries })
    }

    /// Resolves a project to a dispatchable entry.
    ///
    /// Pure read: repeated lookups of the same project return the same entry.
    pub fn lookup(&self, project: &ProjectId) -> Result<&ProjectEntry, LookupError> {
        match self.entries.get(project) {
            Some(ConfigEntry::Complete(entry)) => Ok(entry),
            Some(ConfigEntry::Incomplete { missing }) => Err(LookupError::Incomplete {
                project: project.clone(),
                field: missing,
            }),
            None => Err(LookupError::NotConfigured {
                project: project.clone(),
            }),
        }
    }

    /// Iterates over every entry, complete or not, in project order.
    pub fn entries(&self) -> impl Iterator<Item = (&ProjectId, &ConfigEntry)> {
        self.entries.iter()
    }

    /// Number of configured projects, including incomplete ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no projects are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that can be dispatched.
    pub fn complete_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, ConfigEntry::Complete(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn project(id: &str) -> ProjectId {
        ProjectId::new(id).unwrap()
    }

    const SAMPLE: &str = r#"
proj-a:
  command: echo hi
  secret: s3cr3t
  background: false
proj-b:
  command: ["/usr/local/bin/deploy", "--env", "prod"]
  secretToken: other
  timeout_secs: 30
no-command:
  secret: x
no-secret:
  command: /bin/true
empty:
"#;

    #[test]
    fn loads_complete_entries() {
        let store = ConfigStore::from_yaml_str(SAMPLE).unwrap();
        let a = store.lookup(&project("proj-a")).unwrap();
        assert_eq!(a.command().argv(), ["echo", "hi"]);
        assert_eq!(a.mode(), ExecutionMode::Foreground);
        assert_eq!(a.timeout(), None);

        let b = store.lookup(&project("proj-b")).unwrap();
        assert_eq!(b.command().program(), "/usr/local/bin/deploy");
        assert_eq!(b.mode(), ExecutionMode::Background);
        assert_eq!(b.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(b.secret(), &SecretToken::new("other").unwrap());
    }

    #[test]
    fn incomplete_entries_are_kept_but_not_dispatchable() {
        let store = ConfigStore::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(store.len(), 5);
        assert_eq!(store.complete_count(), 2);
        assert_eq!(
            store.lookup(&project("no-command")),
            Err(LookupError::Incomplete {
                project: project("no-command"),
                field: COMMAND_KEY,
            })
        );
        assert_eq!(
            store.lookup(&project("empty")),
            Err(LookupError::Incomplete {
                project: project("empty"),
                field: COMMAND_KEY,
            })
        );
    }

    #[test]
    fn non_string_command_scalar_is_rejected() {
        // `command: true` is a YAML boolean, not a string.
        let err = ConfigStore::from_yaml_str("p:\n  command: true\n  secret: x\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEntry { .. }));
    }

    #[test]
    fn missing_secret_is_incomplete() {
        let store = ConfigStore::from_yaml_str("p:\n  command: deploy\n  secret: ''\n").unwrap();
        assert_eq!(
            store.lookup(&project("p")),
            Err(LookupError::Incomplete {
                project: project("p"),
                field: SECRET_KEY,
            })
        );
    }

    #[test]
    fn unknown_project_is_not_configured() {
        let store = ConfigStore::from_yaml_str("p:\n  command: deploy\n  secret: x\n").unwrap();
        assert_eq!(
            store.lookup(&project("q")),
            Err(LookupError::NotConfigured { project: project("q") })
        );
    }

    #[test]
    fn lookups_are_idempotent() {
        let store = ConfigStore::from_yaml_str(SAMPLE).unwrap();
        let before = store.clone();
        let first = store.lookup(&project("proj-a")).unwrap().clone();
        let second = store.lookup(&project("proj-a")).unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(store, before);
    }

    #[test]
    fn json_documents_are_accepted() {
        let store = ConfigStore::from_yaml_str(
            r#"{"proj-a": {"command": "echo hi", "secret_token": "s3cr3t", "background": false}}"#,
        )
        .unwrap();
        assert!(store.lookup(&project("proj-a")).is_ok());
    }

    #[test]
    fn empty_document_is_empty_store() {
        assert!(ConfigStore::from_yaml_str("").unwrap().is_empty());
    }

    #[test]
    fn numeric_keys_and_secrets_are_read_as_text() {
        let store =
            ConfigStore::from_yaml_str("2024:\n  command: deploy\n  secret: 123456\n").unwrap();
        let entry = store.lookup(&project("2024")).unwrap();
        assert_eq!(entry.secret(), &SecretToken::new("123456").unwrap());
    }

    #[test]
    fn boolean_project_key_is_rejected() {
        assert!(matches!(
            ConfigStore::from_yaml_str("true:\n  command: deploy\n  secret: x\n"),
            Err(ConfigError::InvalidProjectKey { .. })
        ));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(matches!(
            ConfigStore::from_yaml_str("- a\n- b\n"),
            Err(ConfigError::NotAMapping)
        ));
        assert!(matches!(
            ConfigStore::from_yaml_str("p:\n  command: deploy\n  secret: x\n  background: maybe\n"),
            Err(ConfigError::InvalidEntry { .. })
        ));
        assert!(matches!(
            ConfigStore::from_yaml_str("p:\n  command: \"deploy 'oops\"\n  secret: x\n"),
            Err(ConfigError::InvalidCommand { .. })
        ));
        assert!(matches!(
            ConfigStore::from_yaml_str("p: {command: deploy, secret: x}\n\"\": {}\n"),
            Err(ConfigError::InvalidProjectKey { .. })
        ));
        assert!(matches!(
            ConfigStore::from_yaml_str("{ not yaml"),
            Err(ConfigError::Syntax(_))
        ));
    }
}
