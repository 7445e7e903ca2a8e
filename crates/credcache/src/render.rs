//! Output rendering for a single credential set

use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::error::{Result, VaultError};
use crate::profile;
use crate::vault::{Credentials, OutputKey};

const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";

/// Requested output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `-e KEY=value` flags for `docker run`
    Docker,
    /// Chained shell export statements
    Env,
    /// Merge into the shared credentials file
    Creds,
    /// `KEY=value` lines for IDE run configurations
    Idea,
    /// Pretty-printed JSON
    Json,
}

impl OutputFormat {
    /// Parse a format name. Unknown names fall back to JSON rather than
    /// failing.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "docker" => Self::Docker,
            "env" => Self::Env,
            "creds" => Self::Creds,
            "idea" => Self::Idea,
            "json" => Self::Json,
            other => {
                debug!(format = other, "unrecognized output format, using json");
                Self::Json
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Env => "env",
            Self::Creds => "creds",
            Self::Idea => "idea",
            Self::Json => "json",
        }
    }
}

/// Shell flavor for `env` output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Posix,
    Cmd,
}

impl Shell {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Cmd
        } else {
            Self::Posix
        }
    }

    fn export(&self) -> &'static str {
        match self {
            Self::Posix => "export",
            Self::Cmd => "SET",
        }
    }
}

/// Render `creds` in `format`. Only the three credential fields ever reach
/// the output. `Creds` merges into `credentials_file` and returns a
/// confirmation message.
pub fn render(
    format: OutputFormat,
    creds: &Credentials,
    profile: Option<&str>,
    force: bool,
    credentials_file: &Path,
) -> Result<String> {
    let key = creds.output_key();
    debug!(format = format.as_str(), "rendering credentials");

    match format {
        OutputFormat::Docker => Ok(docker(&key)),
        OutputFormat::Env => Ok(env(&key, Shell::current())),
        OutputFormat::Idea => Ok(idea(&key)),
        OutputFormat::Json => json(&key),
        OutputFormat::Creds => {
            profile::merge(credentials_file, &key, profile, force)?;
            let mut msg = String::from("Your AWS credentials file has been updated");
            if let Some(name) = profile {
                msg.push_str(" with the named profile: ");
                msg.push_str(name);
            }
            Ok(msg)
        }
    }
}

pub fn docker(key: &OutputKey) -> String {
    format!(
        " -e {ACCESS_KEY_VAR}={} -e {SECRET_KEY_VAR}={} -e {SESSION_TOKEN_VAR}={}",
        key.access_key, key.secret_key, key.session_token
    )
}

pub fn env(key: &OutputKey, shell: Shell) -> String {
    let cmd = shell.export();
    format!(
        "{cmd} {ACCESS_KEY_VAR}={} && {cmd} {SECRET_KEY_VAR}={} && {cmd} {SESSION_TOKEN_VAR}={}",
        key.access_key, key.secret_key, key.session_token
    )
}

pub fn idea(key: &OutputKey) -> String {
    [
        format!("{ACCESS_KEY_VAR}={}", key.access_key),
        format!("{SECRET_KEY_VAR}={}", key.secret_key),
        format!("{SESSION_TOKEN_VAR}={}", key.session_token),
    ]
    .join("\n")
}

/// Four-space indented JSON of the output key
pub fn json(key: &OutputKey) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    key.serialize(&mut ser).map_err(VaultError::Render)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
