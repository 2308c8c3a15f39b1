use serenity::{
    all::{Colour, Timestamp},
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::queue::QueuedTrack;

const LIMIT_TITLE: usize = 256;
const LIMIT_DESCRIPTION: usize = 2048;
const LIMIT_FIELD_NAME: usize = 256;
const LIMIT_FIELD_VALUE: usize = 1024;
const LIMIT_FIELDS: usize = 25;
const LIMIT_FOOTER: usize = 2048;

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Platform-neutral rich message.
///
/// Setters truncate to the gateway's embed limits so a long track title can
/// never make a send fail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub colour: Option<Colour>,
    pub footer: Option<String>,
    pub fields: Vec<EmbedField>,
}

fn truncate(value: impl Into<String>, limit: usize) -> String {
    let value = value.into();
    match value.char_indices().nth(limit) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value,
    }
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(truncate(title, LIMIT_TITLE));
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(truncate(description, LIMIT_DESCRIPTION));
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn colour(mut self, colour: Colour) -> Self {
        self.colour = Some(colour);
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(truncate(text, LIMIT_FOOTER));
        self
    }

    /// Fields beyond the 25th are dropped.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        if self.fields.len() < LIMIT_FIELDS {
            self.fields.push(EmbedField {
                name: truncate(name, LIMIT_FIELD_NAME),
                value: truncate(value, LIMIT_FIELD_VALUE),
                inline,
            });
        }
        self
    }

    pub fn into_serenity(self) -> CreateEmbed {
        let mut embed = CreateEmbed::new();
        if let Some(title) = self.title {
            embed = embed.title(title);
        }
        if let Some(description) = self.description {
            embed = embed.description(description);
        }
        if let Some(url) = self.url {
            embed = embed.url(url);
        }
        if let Some(colour) = self.colour {
            embed = embed.colour(colour);
        }
        if let Some(footer) = self.footer {
            embed = embed.footer(CreateEmbedFooter::new(footer));
        }
        embed
            .fields(self.fields.into_iter().map(|f| (f.name, f.value, f.inline)))
            .timestamp(Timestamp::now())
    }
}

pub fn format_duration(duration: Option<Duration>) -> String {
    match duration {
        // Drop sub-second noise before handing it to humantime
        Some(d) => humantime::format_duration(Duration::from_secs(d.as_secs())).to_string(),
        None => "🔴 En vivo".to_string(),
    }
}

/// Crea un embed para mostrar la canción actual
pub fn now_playing(track: &QueuedTrack) -> Embed {
    Embed::new()
        .title("🎵 Now Playing")
        .description(format!("**{}**", track.title))
        .url(track.source_link.clone())
        .colour(colors::SUCCESS_GREEN)
        .field("⏱️ Duration", format_duration(track.duration), true)
        .field("👤 Requested by", format!("<@{}>", track.requested_by), true)
        .footer(STANDARD_FOOTER)
}

/// Listado de la cola: la canción actual y las pendientes
pub fn queue_listing(current: Option<&QueuedTrack>, pending: &[QueuedTrack]) -> Embed {
    let mut embed = Embed::new()
        .title("📜 Queue")
        .colour(colors::MUSIC_PURPLE)
        .footer(format!("{} pending", pending.len()));

    if let Some(track) = current {
        embed = embed.description(format!(
            "Now playing: **{}** ({})",
            track.title,
            format_duration(track.duration)
        ));
    }

    // Position 1 is the current track
    for (idx, track) in pending.iter().enumerate() {
        embed = embed.field(
            format!("{}. {}", idx + 2, track.title),
            format_duration(track.duration),
            false,
        );
    }

    embed
}

/// Ayuda: una línea por comando
pub fn help<'a>(commands: impl IntoIterator<Item = (&'a str, &'a str)>, prefix: &str) -> Embed {
    commands.into_iter().fold(
        Embed::new()
            .title("❓ Commands")
            .colour(colors::INFO_BLUE)
            .footer(STANDARD_FOOTER),
        |embed, (name, description)| embed.field(format!("{prefix}{name}"), description, false),
    )
}
