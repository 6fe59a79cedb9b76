//! Inbound request parsing.
//!
//! The transport hands over a header set and the body bytes it read. The
//! [`RequestParser`] checks the body against `Content-Length`, decodes it as
//! JSON, and pulls out the token and the project identifier according to the
//! deployment's [`HookConvention`].

use std::collections::HashMap;

use serde_json::Value;

use crate::{HookConvention, ParseError, ProjectId, ProjectPath, SecretToken};

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// Case-insensitive request header set (keys are stored lowercased).
///
/// When a header repeats, the first value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders(HashMap<String, String>);

impl RequestHeaders {
    /// Creates an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header unless one with the same name is already present.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| value.into());
    }

    /// Returns the value of a header, matching the name case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for RequestHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}

// ---------------------------------------------------------------------------
// Parsed request
// ---------------------------------------------------------------------------

/// A webhook delivery after parsing, ready for lookup and authentication.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    token: Option<SecretToken>,
    raw_payload: Vec<u8>,
    payload: Option<Value>,
    project: ProjectId,
}

impl InboundRequest {
    /// The token presented by the request, if any.
    pub fn token(&self) -> Option<&SecretToken> {
        self.token.as_ref()
    }

    /// The body exactly as received.
    pub fn raw_payload(&self) -> &[u8] {
        &self.raw_payload
    }

    /// The decoded body; `None` when the body was empty.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// The project the delivery is for.
    pub fn project(&self) -> &ProjectId {
        &self.project
    }
}

// ---------------------------------------------------------------------------
// Field lookup
// ---------------------------------------------------------------------------

/// Result of walking a key path through a JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLookup<'a> {
    /// Every segment was present; holds the value at the end of the path.
    Found(&'a Value),
    /// The named segment was absent (or its parent was not an object).
    Missing(&'a str),
}

/// Walks `path` through `root`, reporting the first missing segment.
pub fn lookup_path<'a>(root: Option<&'a Value>, path: &'a ProjectPath) -> FieldLookup<'a> {
    let mut current = root;
    for segment in path.segments() {
        match current.and_then(|v| v.get(segment.as_str())) {
            Some(next) => current = Some(next),
            None => return FieldLookup::Missing(segment),
        }
    }
    match current {
        Some(value) => FieldLookup::Found(value),
        None => FieldLookup::Missing(path.segments().first().map_or("", String::as_str)),
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Turns a raw request into an [`InboundRequest`] under a fixed convention.
#[derive(Debug, Clone, Default)]
pub struct RequestParser {
    convention: HookConvention,
}

impl RequestParser {
    /// Creates a parser for the given convention.
    pub fn new(convention: HookConvention) -> Self {
        Self { convention }
    }

    /// Parses one request.
    ///
    /// A missing token is not an error here: the request is returned without
    /// one and fails authentication later, after the project is resolved.
    pub fn parse(
        &self,
        headers: &RequestHeaders,
        body: Vec<u8>,
    ) -> Result<InboundRequest, ParseError> {
        let declared = content_length(headers)?;
        if declared != body.len() {
            return Err(ParseError::LengthMismatch {
                declared,
                actual: body.len(),
            });
        }

        let payload = if body.is_empty() {
            None
        } else {
            Some(serde_json::from_slice::<Value>(&body)?)
        };

        let token = self.token(headers, payload.as_ref());
        let project = self.project(payload.as_ref())?;

        Ok(InboundRequest {
            token,
            raw_payload: body,
            payload,
            project,
        })
    }

    /// Header first, then the payload field.
    fn token(&self, headers: &RequestHeaders, payload: Option<&Value>) -> Option<SecretToken> {
        let from_header = self
            .convention
            .token_header()
            .and_then(|name| headers.get(name))
            .map(str::trim)
            .and_then(SecretToken::new);
        if from_header.is_some() {
            return from_header;
        }
        self.convention
            .token_field()
            .and_then(|field| payload?.get(field))
            .and_then(Value::as_str)
            .and_then(SecretToken::new)
    }

    fn project(&self, payload: Option<&Value>) -> Result<ProjectId, ParseError> {
        let path = self.convention.project_path();
        match lookup_path(payload, path) {
            FieldLookup::Found(value) => value
                .as_str()
                .and_then(ProjectId::new)
                .ok_or_else(|| ParseError::InvalidProjectValue {
                    path: path.to_string(),
                }),
            FieldLookup::Missing(segment) => Err(ParseError::MissingProjectField {
                path: path.to_string(),
                segment: segment.to_string(),
            }),
        }
    }
}

fn content_length(headers: &RequestHeaders) -> Result<usize, ParseError> {
    let raw = headers
        .get("content-length")
        .ok_or(ParseError::MissingContentLength)?;
    raw.trim()
        .parse::<usize>()
        .map_err(|_| ParseError::InvalidContentLength {
            value: raw.to_string(),
        })
}
