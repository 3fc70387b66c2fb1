//! Parsing helpers for environment values.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::defaults::IDENTITY_TOKEN;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{CacheTargetKind, CacheTargetSpec};

pub(crate) fn parse_bool(field: &'static str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::invalid(field, "not_a_boolean", value)),
    }
}

pub(crate) fn parse_u32(field: &'static str, value: &str) -> ConfigResult<u32> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::invalid(field, "not_an_unsigned_integer", value))
}

pub(crate) fn parse_secs(field: &'static str, value: &str) -> ConfigResult<Duration> {
    let secs = value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid(field, "not_an_unsigned_integer", value))?;
    if secs == 0 {
        return Err(ConfigError::invalid(field, "zero", value));
    }
    Ok(Duration::from_secs(secs))
}

pub(crate) fn parse_millis(field: &'static str, value: &str) -> ConfigResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::invalid(field, "not_an_unsigned_integer", value))
}

pub(crate) fn parse_path(field: &'static str, value: &str) -> ConfigResult<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(field, "empty", value));
    }
    Ok(PathBuf::from(trimmed))
}

/// Validate a fetch URL template: it must carry `{identity}` and expand to an http(s) URL.
pub(crate) fn parse_url_template(field: &'static str, value: &str) -> ConfigResult<String> {
    let trimmed = value.trim();
    if !trimmed.contains(IDENTITY_TOKEN) {
        return Err(ConfigError::invalid(field, "missing_identity_token", value));
    }
    let probe = trimmed.replace(IDENTITY_TOKEN, "probe");
    let parsed = Url::parse(&probe).map_err(|_| ConfigError::invalid(field, "not_a_url", value))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(field, "unsupported_scheme", value));
    }
    Ok(trimmed.to_string())
}

/// Parse `name=kind:path` entries separated by commas.
pub(crate) fn parse_cache_targets(
    field: &'static str,
    value: &str,
) -> ConfigResult<Vec<CacheTargetSpec>> {
    let mut specs: Vec<CacheTargetSpec> = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (name, rest) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::invalid(field, "missing_equals", entry))?;
        let (kind, path) = rest
            .split_once(':')
            .ok_or_else(|| ConfigError::invalid(field, "missing_kind", entry))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::invalid(field, "empty_name", entry));
        }
        if specs.iter().any(|spec| spec.name == name) {
            return Err(ConfigError::invalid(field, "duplicate_name", entry));
        }
        let kind = match kind.trim() {
            "dir" | "directory" => CacheTargetKind::Directory,
            "index" => CacheTargetKind::Index,
            _ => return Err(ConfigError::invalid(field, "unknown_kind", entry)),
        };
        specs.push(CacheTargetSpec {
            name: name.to_string(),
            kind,
            path: parse_path(field, path)?,
        });
    }
    Ok(specs)
}

pub(crate) fn parse_command(field: &'static str, value: &str) -> ConfigResult<Vec<String>> {
    let parts: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        return Err(ConfigError::invalid(field, "empty", value));
    }
    Ok(parts)
}

/// Lexically normalise a path, dropping `.` and resolving `..` where possible.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}
