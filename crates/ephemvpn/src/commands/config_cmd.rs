//! Config subcommand handlers.

use secrecy::SecretString;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Settings};
use crate::error::CliError;
use crate::output;

/// Mask the plaintext credential before display.
fn redacted(mut settings: Settings) -> Settings {
    if settings.api_key.is_some() {
        settings.api_key = Some("****".into());
    }
    settings
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let settings = redacted(config::load(global)?);
            let toml = toml::to_string_pretty(&settings)?;
            let out = output::render_single(
                &global.output,
                &settings,
                |_| toml.clone(),
                |s| s.ssm_prefix.clone(),
            )?;
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", config::settings_path(global).display());
            Ok(())
        }

        // ── Init ────────────────────────────────────────────────────
        ConfigCommand::Init { force } => {
            let path = config::settings_path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            config::save_settings(&Settings::default(), &path)?;
            if !global.quiet {
                eprintln!("✓ Settings written to {}", path.display());
            }
            Ok(())
        }

        // ── SetKey ──────────────────────────────────────────────────
        ConfigCommand::SetKey => {
            let key = rpassword::prompt_password("API key: ")?;
            if key.is_empty() {
                return Err(CliError::Validation {
                    field: "api_key".into(),
                    reason: "API key cannot be empty".into(),
                });
            }
            config::store_api_key(&SecretString::from(key))?;
            if !global.quiet {
                eprintln!("✓ API key stored in system keyring");
            }
            Ok(())
        }
    }
}
