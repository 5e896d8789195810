//! URL templates of the sources file.
//!
//! Positional `{}` placeholders take the state's native tile key, then the
//! year of the tile's last-modified date. Named placeholders:
//!
//! | placeholder      | example        |
//! |------------------|----------------|
//! | `{tile}`         | `32_350_5600`  |
//! | `{key}`          | `32350_5600`   |
//! | `{tile_compact}` | `323505600`    |
//! | `{zone}`         | `32`           |
//! | `{x_km}`         | `350`          |
//! | `{y_km}`         | `5600`         |
//! | `{year}`         | `2021`         |

use thiserror::Error;

/// Template expansion failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// `{name}` is not a known placeholder.
    #[error("unknown placeholder '{{{0}}}' in '{1}'")]
    UnknownPlaceholder(String, String),

    /// More `{}` than positional values.
    #[error("too many positional placeholders in '{0}'")]
    TooManyPositional(String),

    /// A `{` without matching `}`.
    #[error("unclosed placeholder in '{0}'")]
    Unclosed(String),

    /// The placeholder needs a value the tile does not have.
    #[error("placeholder '{{{0}}}' has no value for this tile")]
    MissingValue(&'static str),
}

/// Values available to a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    /// Canonical tile name.
    pub tile: String,
    /// The state's native tile key.
    pub key: String,
    /// UTM zone.
    pub zone: u8,
    /// Kilometre easting of the lower-left corner.
    pub x_km: i64,
    /// Kilometre northing of the lower-left corner.
    pub y_km: i64,
    /// Year of the last-modified date.
    pub year: Option<i32>,
}

impl TemplateVars {
    fn named(&self, name: &str) -> Option<Result<String, TemplateError>> {
        let value = match name {
            "tile" => self.tile.clone(),
            "key" => self.key.clone(),
            "tile_compact" => format!("{}{:03}{:04}", self.zone, self.x_km, self.y_km),
            "zone" => self.zone.to_string(),
            "x_km" => format!("{:03}", self.x_km),
            "y_km" => format!("{:04}", self.y_km),
            "year" => {
                return Some(
                    self.year
                        .map(|y| y.to_string())
                        .ok_or(TemplateError::MissingValue("year")),
                )
            }
            _ => return None,
        };
        Some(Ok(value))
    }

    fn positional(&self, index: usize) -> Option<Result<String, TemplateError>> {
        match index {
            0 => Some(Ok(self.key.clone())),
            1 => self.named("year"),
            _ => None,
        }
    }
}

/// Expand `template` with `vars`. `{{` and `}}` are literal braces.
pub fn expand(template: &str, vars: &TemplateVars) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars().peekable();
    let mut next_positional = 0;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if !closed {
                    return Err(TemplateError::Unclosed(template.to_string()));
                }
                let value = if name.is_empty() {
                    let value = vars
                        .positional(next_positional)
                        .ok_or_else(|| TemplateError::TooManyPositional(template.to_string()))?;
                    next_positional += 1;
                    value
                } else {
                    vars.named(&name).ok_or_else(|| {
                        TemplateError::UnknownPlaceholder(name.clone(), template.to_string())
                    })?
                };
                out.push_str(&value?);
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}
