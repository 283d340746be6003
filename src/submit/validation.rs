//! Job validation; runs before any network call.

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::api::JobCategory;

/// URL prefixes the backend accepts.
pub const ACCEPTED_URL_PREFIXES: &[&str] = &[
    "https://www.youtube.com/",
    "https://youtu.be/",
    "https://m.youtube.com/",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no URLs given")]
    EmptyJob,

    #[error("not a valid URL: {url}")]
    InvalidUrl { url: String },

    #[error("unsupported URL (expected a YouTube link): {url}")]
    UnsupportedHost { url: String },

    #[error("unsupported {category} format '{format}' (expected one of: {})", .allowed.join(", "))]
    UnsupportedFormat {
        category: JobCategory,
        format: String,
        allowed: Vec<&'static str>,
    },
}

/// Trims every entry, drops blanks and duplicates (first occurrence wins),
/// and checks each URL against [`ACCEPTED_URL_PREFIXES`].
///
/// # Errors
///
/// The first offending URL, or [`ValidationError::EmptyJob`] when nothing
/// is left.
pub fn normalize_urls<S: AsRef<str>>(raw: &[S]) -> Result<Vec<String>, ValidationError> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for entry in raw {
        let candidate = entry.as_ref().trim();
        if candidate.is_empty() {
            continue;
        }
        let parsed = Url::parse(candidate).map_err(|_| ValidationError::InvalidUrl {
            url: candidate.to_string(),
        })?;
        if !ACCEPTED_URL_PREFIXES
            .iter()
            .any(|prefix| parsed.as_str().starts_with(prefix))
        {
            return Err(ValidationError::UnsupportedHost {
                url: candidate.to_string(),
            });
        }
        if seen.insert(candidate.to_string()) {
            urls.push(candidate.to_string());
        }
    }

    if urls.is_empty() {
        return Err(ValidationError::EmptyJob);
    }
    Ok(urls)
}

/// Resolves the format for `category`, defaulting when none was given.
///
/// # Errors
///
/// [`ValidationError::UnsupportedFormat`] for a format the category does
/// not offer.
pub fn resolve_format(
    category: JobCategory,
    format: Option<&str>,
) -> Result<String, ValidationError> {
    let format = match format.map(str::trim) {
        None | Some("") => return Ok(category.default_format().to_string()),
        Some(format) => format.to_ascii_lowercase(),
    };
    if category.allowed_formats().contains(&format.as_str()) {
        Ok(format)
    } else {
        Err(ValidationError::UnsupportedFormat {
            category,
            format,
            allowed: category.allowed_formats().to_vec(),
        })
    }
}

/// Uses `fallback` when `requested` is missing or blank.
#[must_use]
pub fn resolve_output_path(requested: Option<&str>, fallback: &str) -> String {
    requested
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
