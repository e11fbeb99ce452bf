/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use git_url_parse::{GitUrl, Scheme};
use rand::Rng;

use super::consts::*;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Repository URL is required")]
    MissingRepository,
    #[error("Invalid repository URL: {0}")]
    InvalidRepository(String),
    #[error("URLs pointing to local files are not allowed")]
    LocalRepository,
    #[error("Invalid subdomain: {0}")]
    InvalidSubdomain(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub fn port_in_range(s: &str) -> Result<u16, String> {
    let port: usize = s
        .parse()
        .map_err(|_| format!("`{s}` is not a port number"))?;

    if PORT_RANGE.contains(&port) {
        Ok(port as u16)
    } else {
        Err(format!(
            "port not in range {}-{}",
            PORT_RANGE.start(),
            PORT_RANGE.end()
        ))
    }
}

pub fn greater_than_zero<
    T: std::str::FromStr + std::cmp::PartialOrd + std::fmt::Display + Default,
>(
    s: &str,
) -> Result<T, String> {
    let num: T = s
        .parse()
        .map_err(|_| format!("`{}` is not a valid number", s))?;

    if num > T::default() {
        Ok(num)
    } else {
        Err(format!("`{}` is not larger than 0", s))
    }
}

/// Accepts remote git URLs (https, ssh, scp-like) and returns the trimmed
/// URL. Local paths and `file://` URLs are refused.
pub fn check_repository_url(url: &str) -> Result<String, InputError> {
    let url = url.trim();

    if url.is_empty() {
        return Err(InputError::MissingRepository);
    }

    if url.starts_with("file") || url.contains("file://") {
        return Err(InputError::LocalRepository);
    }

    let parsed =
        GitUrl::parse(url).map_err(|e| InputError::InvalidRepository(e.to_string()))?;

    if parsed.scheme == Scheme::File {
        return Err(InputError::LocalRepository);
    }

    if parsed.host.as_deref().unwrap_or_default().is_empty() {
        return Err(InputError::InvalidRepository(format!("{} has no host", url)));
    }

    Ok(url.to_string())
}

/// Subdomains are single DNS labels: lowercase letters, digits and dashes.
pub fn check_subdomain(s: &str) -> Result<(), InputError> {
    let invalid = |reason: &str| Err(InputError::InvalidSubdomain(reason.to_string()));

    if s.is_empty() {
        return invalid("Subdomain cannot be empty");
    }

    if s.len() > SUBDOMAIN_MAX_LENGTH {
        return invalid("Subdomain cannot exceed 63 characters");
    }

    if s.contains(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')) {
        return invalid("Subdomain can only contain lowercase letters, numbers, and dashes");
    }

    if s.starts_with('-') || s.ends_with('-') {
        return invalid("Subdomain can only start and end with letters or numbers");
    }

    Ok(())
}

pub fn check_project_name(s: &str) -> Result<(), InputError> {
    if s.trim().is_empty() {
        return Err(InputError::InvalidName("Name cannot be empty".to_string()));
    }

    if s.len() > 255 {
        return Err(InputError::InvalidName(
            "Name cannot exceed 255 characters".to_string(),
        ));
    }

    Ok(())
}

/// Output directories are relative to the checkout and may not escape it.
pub fn check_output_dir(s: &str) -> Result<(), InputError> {
    if s.starts_with('/') || s.split('/').any(|segment| segment == "..") {
        return Err(InputError::InvalidPath(s.to_string()));
    }

    Ok(())
}

pub fn generate_subdomain() -> String {
    let mut rng = rand::rng();

    (0..SUBDOMAIN_LENGTH)
        .map(|_| SUBDOMAIN_ALPHABET[rng.random_range(0..SUBDOMAIN_ALPHABET.len())] as char)
        .collect()
}
