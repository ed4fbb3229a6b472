use pmsync_core::util::{is_http_url, is_ws_url, normalize_text_option};

use crate::cli::ConfigCommands;
use crate::config_profiles::{default_config_path, CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            user,
            websocket_url,
            events_url,
            api_base_url,
            no_activate,
        } => {
            let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let name = config_init(
                &mut config,
                profile.as_deref().or(global_profile),
                ProfileUpdate {
                    user,
                    websocket_url,
                    events_url,
                    api_base_url,
                },
                no_activate,
            )?;
            let path = config.save().map_err(CliError::Config)?;
            println!("Saved profile '{name}' to {}", path.display());
            Ok(())
        }
        ConfigCommands::Show => run_config_show(global_profile),
    }
}

/// Values passed to `config init`; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub user: Option<String>,
    pub websocket_url: Option<String>,
    pub events_url: Option<String>,
    pub api_base_url: Option<String>,
}

/// Merge `update` into the named profile and optionally activate it.
pub fn config_init(
    config: &mut CliProfilesConfig,
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<String, CliError> {
    let name = config.resolve_profile_name(profile_name);

    let websocket_url = normalize_text_option(update.websocket_url);
    let events_url = normalize_text_option(update.events_url);
    let api_base_url = normalize_text_option(update.api_base_url);

    if let Some(url) = websocket_url.as_deref() {
        if !is_ws_url(url) {
            return Err(CliError::Config(format!(
                "WebSocket URL must start with ws:// or wss://: {url}"
            )));
        }
    }
    for url in [events_url.as_deref(), api_base_url.as_deref()]
        .into_iter()
        .flatten()
    {
        if !is_http_url(url) {
            return Err(CliError::Config(format!(
                "Push sync URL must start with http:// or https://: {url}"
            )));
        }
    }

    let profile = config.profile_mut_or_default(&name);
    if let Some(user) = normalize_text_option(update.user) {
        profile.user_id = Some(user);
    }
    // Switching transport kinds clears the other kind's endpoints.
    if websocket_url.is_some() {
        profile.websocket_url = websocket_url;
        profile.events_url = None;
        profile.api_base_url = None;
    } else if events_url.is_some() || api_base_url.is_some() {
        profile.websocket_url = None;
        if events_url.is_some() {
            profile.events_url = events_url;
        }
        if api_base_url.is_some() {
            profile.api_base_url = api_base_url;
        }
    }

    if !no_activate || config.active_profile.is_none() {
        config.active_profile = Some(name.clone());
    }

    Ok(name)
}

pub fn run_config_show(global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let name = config.resolve_profile_name(global_profile);
    let profile = config.profile(&name).cloned().unwrap_or_default();

    println!("Config file: {}", default_config_path().display());
    println!("Profile:     {name}");
    for line in describe_profile(&profile) {
        println!("{line}");
    }
    Ok(())
}

pub fn describe_profile(profile: &CliProfile) -> Vec<String> {
    let user = profile.user_id().unwrap_or_else(|| "(not set)".to_string());
    let transport = profile.transport_config().map_or_else(
        || "(not configured)".to_string(),
        |transport| transport.endpoint().to_string(),
    );

    vec![
        format!("User:        {user}"),
        format!("Endpoint:    {transport}"),
        format!(
            "Sync every:  {}ms, reconnect {}..{}ms, max {} attempt(s)",
            profile.session.sync_interval_ms,
            profile.session.reconnect_base_delay_ms,
            profile.session.reconnect_max_delay_ms,
            profile.session.max_reconnect_attempts
        ),
    ]
}
