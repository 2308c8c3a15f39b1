use crate::{
    plugins::{CommandPlugin, MessageReaction, Plugin, TimedMessage},
    ui::{embeds::colors, Embed, Reply},
};

fn command(name: &str, description: &str, exec: fn(&[String]) -> Reply) -> Plugin {
    Plugin::Command(CommandPlugin {
        name: name.to_string(),
        description: description.to_string(),
        private: false,
        exec,
    })
}

fn ping(_args: &[String]) -> Reply {
    Reply::text("Pong!")
}

fn beep(_args: &[String]) -> Reply {
    Reply::text("Boop!")
}

fn hello(args: &[String]) -> Reply {
    match args {
        [] => Reply::text("Hello!"),
        args => Reply::text(format!("Hello {}", args.join(" "))),
    }
}

fn embed(_args: &[String]) -> Reply {
    Reply::Embed(
        Embed::new()
            .title("This is a test")
            .description("This is also a test")
            .colour(colors::INFO_BLUE),
    )
}

fn five_seconds() -> Reply {
    Reply::text("Five seconds have elapsed")
}

/// Every plugin the binary ships with.
pub fn table() -> Vec<Plugin> {
    vec![
        command("ping", "Responds to !ping with 'Pong!'", ping),
        command("beep", "Responds to !beep with 'Boop!'", beep),
        command("hello", "says hello + whatever argument follows", hello),
        command("embed", "test embed command", embed),
        Plugin::MessageReaction(MessageReaction {
            name: "okay".to_string(),
            triggers: vec!["ok".to_string(), "okay".to_string()],
            reactions: vec!["👌".to_string()],
        }),
        Plugin::TimedMessage(TimedMessage {
            name: "five-seconds".to_string(),
            cron: "0/5 * * * * *".to_string(),
            exec: five_seconds,
        }),
    ]
}
