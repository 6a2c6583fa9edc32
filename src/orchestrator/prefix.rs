// src/orchestrator/prefix.rs

//! Prefix templates and label fitting.
//!
//! A template such as `"[{command}]"` carries at most one placeholder. The
//! placeholder is located once when the orchestrator is built; rendering is
//! then a plain substitution. `command` and `group` labels are fitted to a
//! shared width so that the multiplexed output lines up.

use std::path::Path;

use regex::Regex;

use crate::command::Command;
use crate::errors::{Result, TandemError};
use crate::types::{PrefixAlign, PrefixKey};

/// Executables whose first non-`run` argument makes a better label.
const PACKAGE_RUNNERS: &[&str] = &["npm", "yarn", "pnpm", "bun"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixTemplate {
    template: String,
    key: Option<PrefixKey>,
    token_len: usize,
}

impl PrefixTemplate {
    /// Parse a template. More than one placeholder, or an unknown one, is a
    /// configuration error.
    pub fn parse(template: &str) -> Result<Self> {
        let pattern = Regex::new(r"\{([a-z]+)\}")
            .map_err(|e| TandemError::ConfigError(format!("prefix pattern: {e}")))?;

        let mut found = pattern.captures_iter(template);
        let first = found.next();
        if found.next().is_some() {
            return Err(TandemError::ConfigError(format!(
                "prefix template \"{template}\" has more than one placeholder"
            )));
        }

        let (key, token_len) = match first {
            Some(caps) => {
                let token = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let key = name
                    .parse::<PrefixKey>()
                    .map_err(|e| TandemError::ConfigError(format!("{e} in \"{template}\"")))?;
                (Some(key), token.chars().count())
            }
            None => (None, 0),
        };

        Ok(Self {
            template: template.to_string(),
            key,
            token_len,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// The placeholder, or `None` for a literal template.
    pub fn key(&self) -> Option<PrefixKey> {
        self.key
    }

    /// Characters the template adds around the placeholder value.
    pub fn decoration_len(&self) -> usize {
        self.template.chars().count() - self.token_len
    }

    pub fn render(&self, value: &str) -> String {
        match self.key {
            Some(key) => self.template.replace(&format!("{{{}}}", key.as_str()), value),
            None => self.template.clone(),
        }
    }
}

impl Default for PrefixTemplate {
    fn default() -> Self {
        Self {
            template: "[{index}]".to_string(),
            key: Some(PrefixKey::Index),
            token_len: "{index}".len(),
        }
    }
}

/// Label used by the `command` placeholder.
///
/// An explicit alias wins. Otherwise package-runner invocations such as
/// `npm run build` are labelled by their script (`build`), and anything else
/// by the executable's file name.
pub fn derive_label(command: &Command) -> String {
    if command.has_alias() {
        return command.name().to_string();
    }
    label_for_command_line(&command.command_line())
}

pub fn label_for_command_line(line: &str) -> String {
    let mut parts = line.split_whitespace();
    let Some(executable) = parts.next() else {
        return String::new();
    };

    let file_name = Path::new(executable)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(executable);

    if PACKAGE_RUNNERS.contains(&file_name) {
        if let Some(script) = parts.find(|arg| *arg != "run") {
            return script.to_string();
        }
    }
    file_name.to_string()
}

/// Width shared by every `command`/`group` prefix in one run.
pub fn compute_max_prefix<I>(label_lens: I, min: usize, max: Option<usize>, decoration: usize) -> usize
where
    I: IntoIterator<Item = usize>,
{
    let longest = label_lens.into_iter().max().unwrap_or(0);
    let width = longest.max(min);
    match max {
        Some(max) => width.min(max.saturating_sub(decoration)),
        None => width,
    }
}

/// Truncate `label` to `width` characters and pad it with `fill`.
pub fn fit_label(label: &str, width: usize, fill: char, align: PrefixAlign) -> String {
    let truncated: String = label.chars().take(width).collect();
    let missing = width - truncated.chars().count();
    let pad = |n: usize| fill.to_string().repeat(n);

    match align {
        PrefixAlign::Left => format!("{truncated}{}", pad(missing)),
        PrefixAlign::Right => format!("{}{truncated}", pad(missing)),
        PrefixAlign::Center => {
            let before = missing / 2;
            format!("{}{truncated}{}", pad(before), pad(missing - before))
        }
    }
}
