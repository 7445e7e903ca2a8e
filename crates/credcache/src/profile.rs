//! Shared credentials file merger
//!
//! Edits the INI-style credentials file other cloud tooling reads
//! (`~/.aws/credentials`). Only the target profile's three credential keys
//! are touched; other sections, other keys, comments and blank lines
//! survive a rewrite unchanged.

use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{Result, VaultError};
use crate::vault::OutputKey;

pub const DEFAULT_PROFILE: &str = "default";

pub const ACCESS_KEY_ID: &str = "aws_access_key_id";
pub const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
pub const SESSION_TOKEN: &str = "aws_session_token";

#[derive(Debug, Clone)]
enum Line {
    /// Comment, blank or anything unparseable, kept verbatim
    Raw(String),
    Entry {
        key: String,
        value: String,
        raw: String,
    },
}

impl Line {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('#') || trimmed.starts_with(';') {
            return Line::Raw(raw.to_string());
        }
        match raw.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Line::Entry {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
                raw: raw.to_string(),
            },
            _ => Line::Raw(raw.to_string()),
        }
    }

    fn entry(key: &str, value: &str) -> Self {
        Line::Entry {
            key: key.to_string(),
            value: value.to_string(),
            raw: format!("{key} = {value}"),
        }
    }

    fn raw(&self) -> &str {
        match self {
            Line::Raw(raw) | Line::Entry { raw, .. } => raw,
        }
    }
}

#[derive(Debug, Clone)]
struct Section {
    name: String,
    header: String,
    lines: Vec<Line>,
}

/// A parsed credentials file
#[derive(Debug, Clone, Default)]
pub struct CredentialsFile {
    preamble: Vec<Line>,
    sections: Vec<Section>,
}

/// `[name]` up to the last `]`; anything after it (usually an inline
/// comment) is ignored, matching how the AWS tooling reads headers.
fn section_name(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix('[')?;
    let end = rest.rfind(']')?;
    let name = rest[..end].trim();
    (!name.is_empty()).then_some(name)
}

impl CredentialsFile {
    pub fn parse(text: &str) -> Self {
        let mut file = Self::default();

        for raw in text.lines() {
            if let Some(name) = section_name(raw) {
                file.sections.push(Section {
                    name: name.to_string(),
                    header: raw.to_string(),
                    lines: Vec::new(),
                });
                continue;
            }

            let line = Line::parse(raw);
            match file.sections.last_mut() {
                Some(section) => section.lines.push(line),
                None => file.preamble.push(line),
            }
        }

        file
    }

    /// Read the file at `path`; a missing file is an empty one
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(VaultError::CredentialsFile {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn has_profile(&self, profile: &str) -> bool {
        self.sections.iter().any(|s| s.name == profile)
    }

    pub fn get(&self, profile: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == profile)?
            .lines
            .iter()
            .find_map(|line| match line {
                Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
                _ => None,
            })
    }

    /// Set `key` in `profile`, creating the section if needed. New keys go
    /// after the section's last entry so trailing blank lines stay put.
    pub fn set(&mut self, profile: &str, key: &str, value: &str) {
        let index = match self.sections.iter().position(|s| s.name == profile) {
            Some(index) => index,
            None => self.push_section(profile),
        };
        let section = &mut self.sections[index];

        let existing = section
            .lines
            .iter_mut()
            .find(|line| matches!(line, Line::Entry { key: k, .. } if k == key));
        if let Some(line) = existing {
            *line = Line::entry(key, value);
            return;
        }

        let at = section
            .lines
            .iter()
            .rposition(|line| matches!(line, Line::Entry { .. }))
            .map_or(0, |i| i + 1);
        section.lines.insert(at, Line::entry(key, value));
    }

    fn push_section(&mut self, profile: &str) -> usize {
        let last_line = match self.sections.last() {
            Some(section) => section.lines.last().map(Line::raw).or(Some(section.header.as_str())),
            None => self.preamble.last().map(Line::raw),
        };
        if let Some(last) = last_line {
            if !last.trim().is_empty() {
                let blank = Line::Raw(String::new());
                match self.sections.last_mut() {
                    Some(section) => section.lines.push(blank),
                    None => self.preamble.push(blank),
                }
            }
        }

        self.sections.push(Section {
            name: profile.to_string(),
            header: format!("[{profile}]"),
            lines: Vec::new(),
        });
        self.sections.len() - 1
    }
}

impl fmt::Display for CredentialsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = String::new();
        for line in &self.preamble {
            text.push_str(line.raw());
            text.push('\n');
        }
        for section in &self.sections {
            text.push_str(&section.header);
            text.push('\n');
            for line in &section.lines {
                text.push_str(line.raw());
                text.push('\n');
            }
        }
        f.write_str(&text)
    }
}

/// Append a newline unless `text` is empty or already ends with one.
/// Tools that append to the credentials file assume the last line is
/// terminated.
pub fn ensure_trailing_newline(text: &mut String) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
}

/// Write `key` into `profile` (default: `default`) of the credentials file
/// at `path`. An existing profile is only replaced when `force` is set;
/// otherwise the file is left untouched and `ProfileExists` is returned.
pub fn merge(path: &Path, key: &OutputKey, profile: Option<&str>, force: bool) -> Result<()> {
    let profile = profile.unwrap_or(DEFAULT_PROFILE);
    let mut file = CredentialsFile::load(path)?;

    if file.has_profile(profile) && !force {
        return Err(VaultError::ProfileExists(profile.to_string()));
    }

    file.set(profile, ACCESS_KEY_ID, &key.access_key);
    file.set(profile, SECRET_ACCESS_KEY, &key.secret_key);
    file.set(profile, SESSION_TOKEN, &key.session_token);

    let io_err = |source: std::io::Error| VaultError::CredentialsFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let mut text = file.to_string();
    ensure_trailing_newline(&mut text);

    // Rename over the original so a failed write never truncates it
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, text).map_err(io_err)?;
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(&tmp_path, meta.permissions()).map_err(io_err)?;
    }
    fs::rename(&tmp_path, path).map_err(io_err)?;

    debug!(path = %path.display(), profile, "updated credentials file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(n: u32) -> OutputKey {
        OutputKey {
            access_key: format!("AKIA{n}"),
            secret_key: format!("SECRET{n}"),
            session_token: format!("TOK{n}"),
        }
    }

    #[test]
    fn test_parse_sections_and_entries() {
        let file = CredentialsFile::parse(
            "# managed by hand\n[default]\naws_access_key_id=AK\nregion = us-east-1\n\n[ work ]\naws_access_key_id = W\n",
        );
        assert!(file.has_profile("default"));
        assert!(file.has_profile("work"));
        assert_eq!(file.get("default", "aws_access_key_id"), Some("AK"));
        assert_eq!(file.get("default", "region"), Some("us-east-1"));
        assert_eq!(file.get("work", "aws_access_key_id"), Some("W"));
    }

    #[test]
    fn test_round_trip_preserves_text() {
        let text = "; comment\n[default]\naws_access_key_id=AK\n\n[other]\nfoo = bar\n";
        assert_eq!(CredentialsFile::parse(text).to_string(), text);
    }

    #[test]
    fn test_merge_into_missing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".aws").join("credentials");

        merge(&path, &key(1), None, false).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "[default]\naws_access_key_id = AKIA1\naws_secret_access_key = SECRET1\naws_session_token = TOK1\n"
        );
    }

    #[test]
    fn test_merge_existing_profile_without_force_leaves_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials");
        let original = "[default]\naws_access_key_id=OLD";
        fs::write(&path, original).unwrap();

        let err = merge(&path, &key(2), None, false).unwrap_err();
        assert!(matches!(err, VaultError::ProfileExists(ref p) if p == "default"));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_merge_force_replaces_credentials_keeps_rest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials");
        fs::write(
            &path,
            "[work]\naws_access_key_id = OLD\nregion = eu-west-1\n\n[personal]\naws_access_key_id = MINE",
        )
        .unwrap();

        merge(&path, &key(3), Some("work"), true).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let file = CredentialsFile::parse(&text);
        assert_eq!(file.get("work", ACCESS_KEY_ID), Some("AKIA3"));
        assert_eq!(file.get("work", SECRET_ACCESS_KEY), Some("SECRET3"));
        assert_eq!(file.get("work", SESSION_TOKEN), Some("TOK3"));
        assert_eq!(file.get("work", "region"), Some("eu-west-1"));
        assert_eq!(file.get("personal", ACCESS_KEY_ID), Some("MINE"));
        assert!(text.ends_with('\n'));
        assert!(text.contains("region = eu-west-1\naws_secret_access_key = SECRET3\n"));
    }

    #[test]
    fn test_merge_new_profile_appends_section() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials");
        fs::write(&path, "[default]\naws_access_key_id = D").unwrap();

        merge(&path, &key(4), Some("ci"), false).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[default]\naws_access_key_id = D\n\n[ci]\n"));
        assert_eq!(text.as_bytes().last(), Some(&b'\n'));
    }

    #[test]
    fn test_header_with_inline_comment_is_a_section() {
        let file = CredentialsFile::parse("[default] # work account\naws_access_key_id = OLD\n[ci];note\n");
        assert!(file.has_profile("default"));
        assert!(file.has_profile("ci"));
        assert_eq!(file.get("default", ACCESS_KEY_ID), Some("OLD"));
        assert!(!CredentialsFile::parse("[]\n").has_profile(""));
    }

    #[test]
    fn test_merge_commented_header_without_force_leaves_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials");
        let original = "[default] # work account\naws_access_key_id = OLD\n";
        fs::write(&path, original).unwrap();

        let err = merge(&path, &key(5), None, false).unwrap_err();
        assert!(matches!(err, VaultError::ProfileExists(ref p) if p == "default"));
        assert_eq!(fs::read(&path).unwrap(), original.as_bytes());

        merge(&path, &key(5), None, true).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("[default]").count(), 1);
        assert!(text.starts_with("[default] # work account\naws_access_key_id = AKIA5\n"));
    }

    #[test]
    fn test_failed_write_keeps_original_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials");
        let original = "[other]\naws_access_key_id = KEEP\n";
        fs::write(&path, original).unwrap();
        // A directory in the temp file's place makes the write fail.
        fs::create_dir(path.with_extension("tmp")).unwrap();

        let err = merge(&path, &key(6), None, false).unwrap_err();
        assert!(matches!(err, VaultError::CredentialsFile { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_ensure_trailing_newline() {
        let mut empty = String::new();
        ensure_trailing_newline(&mut empty);
        assert_eq!(empty, "");

        let mut text = "a".to_string();
        ensure_trailing_newline(&mut text);
        assert_eq!(text, "a\n");

        ensure_trailing_newline(&mut text);
        assert_eq!(text, "a\n");
    }
}
