// src/config/validate.rs

use std::collections::BTreeSet;

use crate::color::ColorChain;
use crate::config::model::{CommandSection, ConfigFile, RawConfigFile};
use crate::errors::{Result, TandemError};
use crate::orchestrator::PrefixTemplate;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TandemError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.options, raw.command))
    }
}

/// Check a parsed config for everything serde cannot express.
pub fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_options(cfg)?;
    validate_commands(cfg)?;
    validate_references(cfg)?;
    Ok(())
}

fn validate_options(cfg: &RawConfigFile) -> Result<()> {
    let options = &cfg.options;

    if let Some(prefix) = &options.prefix {
        PrefixTemplate::parse(prefix)?;
    }

    if let Some(fill) = &options.prefix_fill {
        if fill.chars().count() != 1 {
            return Err(TandemError::ConfigError(format!(
                "[options].prefix_fill must be exactly one character (got \"{fill}\")"
            )));
        }
    }

    if let (Some(min), Some(max)) = (options.prefix_min, options.prefix_max) {
        if min > max {
            return Err(TandemError::ConfigError(format!(
                "[options].prefix_min ({min}) is larger than prefix_max ({max})"
            )));
        }
    }

    if let Some(color) = &options.default_color {
        parse_color("[options].default_color", color)?;
    }

    if options.max_processes == Some(0) {
        return Err(TandemError::ConfigError(
            "[options].max_processes must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_commands(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = BTreeSet::new();

    for command in &cfg.command {
        if command.cmd.trim().is_empty() {
            return Err(TandemError::ConfigError(
                "every [[command]] needs a non-empty `cmd`".to_string(),
            ));
        }

        let name = command.name();
        if !seen.insert(name.clone()) {
            return Err(TandemError::ConfigError(format!(
                "duplicate command name '{name}'"
            )));
        }

        if let Some(color) = &command.color {
            parse_color(&format!("command '{name}' color"), color)?;
        }

        if let Some(probe) = &command.probe {
            if probe.attempts == 0 {
                return Err(TandemError::ConfigError(format!(
                    "command '{name}': probe.attempts must be >= 1 (got 0)"
                )));
            }
        }

        if let Some(idle) = &command.idle {
            if idle.tick_ms == 0 {
                return Err(TandemError::ConfigError(format!(
                    "command '{name}': idle.tick_ms must be >= 1 (got 0)"
                )));
            }
        }
    }

    Ok(())
}

fn validate_references(cfg: &RawConfigFile) -> Result<()> {
    let resolves = |reference: &str| {
        cfg.command
            .iter()
            .any(|c| c.name() == reference || c.command_line() == reference)
    };

    for command in &cfg.command {
        let name = command.name();
        let targets = [
            ("probe", command.probe.as_ref().and_then(|p| p.target.as_deref())),
            ("idle", command.idle.as_ref().and_then(|i| i.target.as_deref())),
        ];

        for (kind, target) in targets {
            let Some(target) = target else { continue };
            if !resolves(target) {
                return Err(TandemError::ConfigError(format!(
                    "command '{name}' has unknown {kind} target '{target}'"
                )));
            }
            if is_self(command, target) {
                return Err(TandemError::ConfigError(format!(
                    "command '{name}' cannot target itself from its {kind}"
                )));
            }
        }
    }

    if let Some(pipe_input) = &cfg.options.pipe_input {
        if !resolves(pipe_input) {
            return Err(TandemError::ConfigError(format!(
                "[options].pipe_input refers to unknown command '{pipe_input}'"
            )));
        }
    }

    Ok(())
}

fn is_self(command: &CommandSection, target: &str) -> bool {
    command.name() == target || command.command_line() == target
}

fn parse_color(what: &str, color: &str) -> Result<ColorChain> {
    color
        .parse::<ColorChain>()
        .map_err(|e| TandemError::ConfigError(format!("{what}: {e}")))
}
