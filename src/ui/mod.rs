pub mod embeds;

pub use embeds::Embed;

/// What a command (or the playback loop) wants to say in a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Plain text, addressed to the invoking user.
    Text(String),
    Embed(Embed),
    /// Voice command feedback, sent to the channel verbatim.
    Voice(String),
}

impl Reply {
    pub fn voice(message: impl Into<String>) -> Self {
        Self::Voice(message.into())
    }

    pub fn text(message: impl Into<String>) -> Self {
        Self::Text(message.into())
    }

    /// Voice feedback does not count towards the user's cooldown.
    pub fn starts_cooldown(&self) -> bool {
        !matches!(self, Self::Voice(_))
    }
}
