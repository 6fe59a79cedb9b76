//! Shared value types for the dispatch domain.
//!
//! Unlike the identifiers in [`crate::identifiers`], these types carry
//! invariants (a command line always names a program, a project path always
//! has at least one segment) and participate in parsing and dispatch.

// ---------------------------------------------------------------------------
// Command types
// ---------------------------------------------------------------------------

/// The argument vector of a configured command.
///
/// Always holds at least one element, the program to execute. Commands are
/// executed directly, never through a shell; a string command from the
/// configuration document is split with POSIX shell-word rules at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    /// Creates a [`CommandLine`] from an argument vector.
    ///
    /// Returns `None` if the vector is empty or the program is an empty string.
    #[must_use]
    pub fn from_argv(argv: Vec<String>) -> Option<Self> {
        match argv.first() {
            Some(program) if !program.is_empty() => Some(Self(argv)),
            _ => None,
        }
    }

    /// Splits a shell-style command line into a [`CommandLine`].
    ///
    /// Quotes and backslash escapes follow POSIX shell rules. Returns
    /// `Ok(None)` when the line contains no words.
    pub fn parse(line: &str) -> Result<Option<Self>, shell_words::ParseError> {
        Ok(Self::from_argv(shell_words::split(line)?))
    }

    /// Returns the program to execute (the first element).
    pub fn program(&self) -> &str {
        &self.0[0]
    }

    /// Returns the arguments following the program.
    pub fn args(&self) -> &[String] {
        &self.0[1..]
    }

    /// Returns the full argument vector.
    pub fn argv(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", shell_words::join(&self.0))
    }
}

// ---------------------------------------------------------------------------

/// Whether the receiver waits for a launched command before responding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionMode {
    /// Respond once the command has been spawned; never wait for it.
    #[default]
    Background,
    /// Respond only after the command has exited.
    Foreground,
}

impl ExecutionMode {
    /// Maps the configuration document's `background` flag to a mode.
    pub fn from_background_flag(background: bool) -> Self {
        if background {
            Self::Background
        } else {
            Self::Foreground
        }
    }

    /// Returns the mode as a lowercase label for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Foreground => "foreground",
        }
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// A shared-secret token.
///
/// Used both for the configured per-project secret and the token presented by
/// a request. `Debug` output is redacted so neither ever reaches a log line.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    /// Wraps a token string, returning `None` if it is empty.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty() {
            None
        } else {
            Some(Self(v))
        }
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretToken(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Deployment conventions
// ---------------------------------------------------------------------------

/// A dotted path of object keys into a JSON payload (e.g. `project.name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPath(Vec<String>);

impl ProjectPath {
    /// Parses a dot-separated key path.
    ///
    /// Returns `None` if the path is empty or contains an empty segment.
    #[must_use]
    pub fn parse(dotted: &str) -> Option<Self> {
        let segments: Vec<String> = dotted.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            None
        } else {
            Some(Self(segments))
        }
    }

    /// Returns the individual key segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

// ---------------------------------------------------------------------------

/// Where a hosting service puts the authentication token and the project
/// identifier.
///
/// Services disagree on both points, so the convention is chosen per
/// deployment. The token is looked up in the header first and in the top-level
/// payload field second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookConvention {
    token_header: Option<String>,
    token_field: Option<String>,
    project_path: ProjectPath,
}

impl HookConvention {
    /// Creates a convention from its parts. Header names are matched
    /// case-insensitively.
    pub fn new(
        token_header: Option<String>,
        token_field: Option<String>,
        project_path: ProjectPath,
    ) -> Self {
        Self {
            token_header: token_header.map(|h| h.to_ascii_lowercase()),
            token_field,
            project_path,
        }
    }

    /// GitLab: token in `X-Gitlab-Token`, project at `project.name`.
    pub fn gitlab() -> Self {
        Self::new(
            Some("X-Gitlab-Token".to_string()),
            Some("secret".to_string()),
            ProjectPath(vec!["project".to_string(), "name".to_string()]),
        )
    }

    /// Gitea: token in the payload's `secret` field, project at
    /// `repository.html_url`.
    pub fn gitea() -> Self {
        Self::new(
            None,
            Some("secret".to_string()),
            ProjectPath(vec!["repository".to_string(), "html_url".to_string()]),
        )
    }

    /// Returns the lowercased token header name, if header lookup is enabled.
    pub fn token_header(&self) -> Option<&str> {
        self.token_header.as_deref()
    }

    /// Returns the top-level payload key holding the token, if enabled.
    pub fn token_field(&self) -> Option<&str> {
        self.token_field.as_deref()
    }

    /// Returns the path to the project identifier.
    pub fn project_path(&self) -> &ProjectPath {
        &self.project_path
    }
}

impl Default for HookConvention {
    fn default() -> Self {
        Self::gitlab()
    }
}
