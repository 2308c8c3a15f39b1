//! # Plugins Module
//!
//! Static registration table for the non-voice features of the bot.
//!
//! Every capability is a variant of [`Plugin`]; the table of built-ins lives
//! in [`builtin`] and configuration (`ENABLED_PLUGINS`) picks which entries
//! are active. Nothing is loaded at runtime.

pub mod builtin;
pub mod timed;

use serenity::model::id::UserId;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::{config::Config, ui::Reply};

pub type CommandFn = fn(&[String]) -> Reply;
pub type TimedFn = fn() -> Reply;

/// `!name args...` → reply.
#[derive(Debug, Clone)]
pub struct CommandPlugin {
    pub name: String,
    pub description: String,
    /// Answer in a direct message instead of the channel.
    pub private: bool,
    pub exec: CommandFn,
}

/// Posts to the default channel on a cron schedule (seconds field first).
#[derive(Debug, Clone)]
pub struct TimedMessage {
    pub name: String,
    pub cron: String,
    pub exec: TimedFn,
}

/// Reacts to every message written by one of `user_ids`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserReaction {
    pub name: String,
    pub user_ids: Vec<UserId>,
    pub reactions: Vec<String>,
}

/// Reacts when a trigger word appears in a message (case-insensitive).
#[derive(Debug, Clone, PartialEq)]
pub struct MessageReaction {
    pub name: String,
    pub triggers: Vec<String>,
    pub reactions: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum Plugin {
    Command(CommandPlugin),
    TimedMessage(TimedMessage),
    UserReaction(UserReaction),
    MessageReaction(MessageReaction),
}

impl Plugin {
    pub fn name(&self) -> &str {
        match self {
            Plugin::Command(p) => &p.name,
            Plugin::TimedMessage(p) => &p.name,
            Plugin::UserReaction(p) => &p.name,
            Plugin::MessageReaction(p) => &p.name,
        }
    }
}

/// Active plugins, grouped by capability.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    commands: BTreeMap<String, CommandPlugin>,
    timed: Vec<TimedMessage>,
    user_reactions: Vec<UserReaction>,
    message_reactions: Vec<MessageReaction>,
}

impl PluginRegistry {
    /// Keeps the entries of `table` whose name is listed in `enabled`.
    pub fn from_table(table: Vec<Plugin>, enabled: &[String]) -> Self {
        let mut registry = Self::default();

        for name in enabled {
            if !table.iter().any(|plugin| plugin.name() == name.as_str()) {
                warn!("Plugin desconocido en ENABLED_PLUGINS: {}", name);
            }
        }

        for plugin in table {
            if !enabled.iter().any(|name| name.as_str() == plugin.name()) {
                continue;
            }
            info!("🔌 Plugin cargado: {}", plugin.name());
            registry.register(plugin);
        }

        registry
    }

    /// Built-in table filtered by `ENABLED_PLUGINS`, plus `USER_REACTIONS`.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::from_table(builtin::table(), &config.enabled_plugins);
        for entry in &config.user_reactions {
            registry.register(Plugin::UserReaction(UserReaction {
                name: format!("user-reaction-{}", entry.user_id),
                user_ids: vec![entry.user_id],
                reactions: entry.reactions.clone(),
            }));
        }
        registry
    }

    pub fn register(&mut self, plugin: Plugin) {
        match plugin {
            Plugin::Command(p) => {
                self.commands.insert(p.name.to_lowercase(), p);
            }
            Plugin::TimedMessage(p) => self.timed.push(p),
            Plugin::UserReaction(p) => self.user_reactions.push(p),
            Plugin::MessageReaction(p) => self.message_reactions.push(p),
        }
    }

    pub fn command(&self, name: &str) -> Option<&CommandPlugin> {
        self.commands.get(name)
    }

    /// `(name, description)` of every command, sorted by name.
    pub fn command_help(&self) -> impl Iterator<Item = (&str, &str)> {
        self.commands
            .values()
            .map(|p| (p.name.as_str(), p.description.as_str()))
    }

    pub fn timed_messages(&self) -> &[TimedMessage] {
        &self.timed
    }

    pub fn reactions_for_user(&self, user_id: UserId) -> Vec<&str> {
        self.user_reactions
            .iter()
            .filter(|p| p.user_ids.contains(&user_id))
            .flat_map(|p| p.reactions.iter().map(String::as_str))
            .collect()
    }

    /// One round of reactions per trigger found in `content`.
    pub fn reactions_for_message(&self, content: &str) -> Vec<&str> {
        let content = content.to_lowercase();
        let mut reactions = Vec::new();
        for plugin in &self.message_reactions {
            for trigger in &plugin.triggers {
                if content.contains(trigger.to_lowercase().as_str()) {
                    reactions.extend(plugin.reactions.iter().map(String::as_str));
                }
            }
        }
        reactions
    }
}
