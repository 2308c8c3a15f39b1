use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, UserId};
use std::{str::FromStr, time::Duration};

/// `USER_REACTIONS` entry: every message by `user_id` gets `reactions`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UserReactionEntry {
    pub user_id: UserId,
    pub reactions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,
    pub default_channel_id: Option<ChannelId>,

    // Mensajes
    pub welcome_back_message: String,
    pub cooldown_message: String,
    pub unknown_command_message: String,

    // Límites
    pub cooldown_seconds: u64,

    // Audio
    pub audio_enabled: bool,
    pub watchdog_interval_ms: u64,
    pub resolve_timeout_secs: u64,

    // Plugins
    pub enabled_plugins: Vec<String>,
    pub user_reactions: Vec<UserReactionEntry>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            discord_token: get("DISCORD_TOKEN").context("DISCORD_TOKEN is required")?,
            command_prefix: get("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),
            default_channel_id: get("DEFAULT_CHANNEL_ID")
                .map(|raw| parse_id(&raw).map(ChannelId::new))
                .transpose()
                .context("invalid DEFAULT_CHANNEL_ID")?,

            welcome_back_message: get("WELCOME_BACK_MESSAGE")
                .unwrap_or(defaults.welcome_back_message),
            cooldown_message: get("COOLDOWN_MESSAGE").unwrap_or(defaults.cooldown_message),
            unknown_command_message: get("UNKNOWN_COMMAND_MESSAGE")
                .unwrap_or(defaults.unknown_command_message),

            cooldown_seconds: parse_or(&get, "COOLDOWN_SECONDS", defaults.cooldown_seconds)?,

            audio_enabled: parse_or(&get, "AUDIO_ENABLED", defaults.audio_enabled)?,
            watchdog_interval_ms: parse_or(
                &get,
                "WATCHDOG_INTERVAL_MS",
                defaults.watchdog_interval_ms,
            )?,
            resolve_timeout_secs: parse_or(
                &get,
                "RESOLVE_TIMEOUT_SECS",
                defaults.resolve_timeout_secs,
            )?,

            enabled_plugins: match get("ENABLED_PLUGINS") {
                Some(raw) => parse_list(&raw),
                None => defaults.enabled_plugins,
            },
            user_reactions: match get("USER_REACTIONS") {
                Some(raw) => parse_user_reactions(&raw).context("invalid USER_REACTIONS")?,
                None => Vec::new(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if self.watchdog_interval_ms == 0 {
            anyhow::bail!("Watchdog interval must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}', {}s cooldown\n  \
            Default channel: {}\n  \
            Audio: enabled={}, watchdog {}ms, resolve timeout {}s\n  \
            Plugins: [{}], {} user reactions",
            self.command_prefix,
            self.cooldown_seconds,
            self.default_channel_id
                .map_or("none".to_string(), |id| id.to_string()),
            self.audio_enabled,
            self.watchdog_interval_ms,
            self.resolve_timeout_secs,
            self.enabled_plugins.join(", "),
            self.user_reactions.len(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            command_prefix: "!".to_string(),
            default_channel_id: None,

            welcome_back_message: "I'm back!".to_string(),
            cooldown_message: "Too many commands at once!".to_string(),
            unknown_command_message: "Invalid command!".to_string(),

            cooldown_seconds: 10,

            audio_enabled: true,
            watchdog_interval_ms: 1000,
            resolve_timeout_secs: 30,

            enabled_plugins: ["ping", "beep", "hello", "embed", "okay"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            user_reactions: Vec::new(),
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: '{raw}'")),
        None => Ok(default),
    }
}

/// Discord snowflakes are never zero.
fn parse_id(raw: &str) -> Result<u64> {
    let id: u64 = raw.trim().parse()?;
    if id == 0 {
        anyhow::bail!("id must not be 0");
    }
    Ok(id)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

/// `userid=emoji|emoji;userid=emoji`
fn parse_user_reactions(raw: &str) -> Result<Vec<UserReactionEntry>> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (user, reactions) = entry
                .split_once('=')
                .with_context(|| format!("expected userid=emoji, got '{entry}'"))?;
            let reactions: Vec<String> = reactions
                .split('|')
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
            if reactions.is_empty() {
                anyhow::bail!("no reactions for user {}", user.trim());
            }
            Ok(UserReactionEntry {
                user_id: UserId::new(parse_id(user)?),
                reactions,
            })
        })
        .collect()
}
