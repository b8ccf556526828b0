//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use moledro_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "user_id": config.user_id,
                    "lookup_url": config.lookup_url,
                    "lookup_timeout_secs": config.lookup_timeout_secs,
                    "log_level": config.log_level
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:            {}", config.data_dir.display());
            println!(
                "  user_id:             {}",
                config.user_id.as_deref().unwrap_or("(not set)")
            );
            println!("  lookup_url:          {}", config.lookup_url);
            println!("  lookup_timeout_secs: {}", config.lookup_timeout_secs);
            println!("  log_level:           {}", config.log_level);
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "user_id" => {
            config.user_id = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.to_string())
            };
        }
        "lookup_url" => {
            if value.is_empty() {
                bail!("lookup_url cannot be empty");
            }
            config.lookup_url = value.to_string();
        }
        "lookup_timeout_secs" => {
            config.lookup_timeout_secs = value
                .parse()
                .context("Invalid value for lookup_timeout_secs. Use a whole number of seconds.")?;
        }
        "log_level" => {
            config.log_level = value.to_string();
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, user_id, lookup_url, lookup_timeout_secs, log_level",
                key
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keys() {
        let mut config = Config::default();

        apply(&mut config, "user_id", "uid-1").unwrap();
        assert_eq!(config.current_user(), Some("uid-1"));
        apply(&mut config, "user_id", "none").unwrap();
        assert!(config.user_id.is_none());

        apply(&mut config, "lookup_timeout_secs", "3").unwrap();
        assert_eq!(config.lookup_timeout_secs, 3);
        assert!(apply(&mut config, "lookup_timeout_secs", "soon").is_err());

        apply(&mut config, "data_dir", "/tmp/moledro").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/moledro"));
    }

    #[test]
    fn test_apply_unknown_key() {
        let mut config = Config::default();
        let err = apply(&mut config, "sync_url", "x").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }
}
