use anyhow::{anyhow, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{expand_env_reference, Config};
use crate::extractor::join_endpoint;
use crate::transport::http::HttpTransport;
use crate::transport::Transport;

const TOKEN_PLACEHOLDER: &str = "${ASANA_TOKEN}";

pub struct InitOptions {
    pub config_path: Option<PathBuf>,
    pub no_prompt: bool,
    pub force: bool,
}

/// Check that `token` is accepted by calling `GET {base_url}/users/me`
///
/// # Errors
///
/// Returns an error if the request fails or the API rejects the token
pub async fn verify_token(base_url: &str, token: &str) -> Result<()> {
    let mut url = join_endpoint(base_url, "users")?;
    url.path_segments_mut()
        .map_err(|()| anyhow!("`{base_url}` cannot be a base URL"))?
        .push("me");

    let transport = HttpTransport::new(Duration::from_secs(10))?;
    let response = transport.get(&url, token).await?;

    if !response.status.is_success() {
        return Err(anyhow!(
            "token check failed with status {}: {}",
            response.status,
            response.body
        ));
    }

    Ok(())
}

/// Write a starter configuration file, prompting for values unless
/// `no_prompt` is set.
///
/// # Errors
///
/// Returns an error if:
/// - The file exists and `force` is not set
/// - A prompt fails or an entered number cannot be parsed
/// - The token check fails
/// - The file cannot be written
pub async fn initialize_config(opts: InitOptions) -> Result<()> {
    let config_path = opts.config_path.unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("asana-extractor")
            .join("config.toml")
    });

    if config_path.exists() && !opts.force {
        return Err(anyhow!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        ));
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut config = Config::default();
    config.api.token = Some(TOKEN_PLACEHOLDER.to_string());

    if !opts.no_prompt {
        let theme = ColorfulTheme::default();
        println!("Initializing asana-extractor configuration...\n");

        config.api.base_url = Input::with_theme(&theme)
            .with_prompt("Asana API base URL")
            .default(config.api.base_url.clone())
            .interact_text()?;

        let token: String = Input::with_theme(&theme)
            .with_prompt("Personal access token (or environment variable reference)")
            .with_initial_text(TOKEN_PLACEHOLDER)
            .interact_text()?;

        if let Some(resolved) = expand_env_reference(&token) {
            let check = Confirm::with_theme(&theme)
                .with_prompt("Verify the token against the API now?")
                .default(true)
                .interact()?;
            if check {
                print!("Testing token... ");
                match verify_token(&config.api.base_url, &resolved).await {
                    Ok(()) => println!("✓ Success"),
                    Err(e) => {
                        println!("✗ Failed");
                        return Err(anyhow!("token validation failed: {e}"));
                    }
                }
            }
        }
        config.api.token = Some(token);

        let interval: String = Input::with_theme(&theme)
            .with_prompt("Extraction interval in seconds")
            .with_initial_text(config.poll.interval_seconds.to_string())
            .interact_text()?;
        config.poll.interval_seconds = interval.trim().parse()?;

        let timeout: String = Input::with_theme(&theme)
            .with_prompt("HTTP client timeout in seconds")
            .with_initial_text(config.api.timeout_seconds.to_string())
            .interact_text()?;
        config.api.timeout_seconds = timeout.trim().parse()?;
    }

    let toml = toml::to_string_pretty(&config)?;
    std::fs::write(&config_path, toml)?;

    println!("\nConfiguration created at: {}", config_path.display());
    Ok(())
}
