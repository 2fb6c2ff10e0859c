use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(name = "chatrelay", about = "Chat with a streaming relay from the terminal")]
pub struct Cli {
    /// Chat endpoint of a running relay.
    #[arg(short = 'e', long, default_value = "http://localhost:3000/api/chat")]
    pub endpoint: String,

    #[arg(short = 't', long, value_enum, default_value_t = Theme::Dark)]
    pub theme: Theme,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Dark,
    Light,
}

impl Theme {
    pub fn syntect_name(&self) -> &'static str {
        match self {
            Theme::Dark => "base16-ocean.dark",
            Theme::Light => "base16-ocean.light",
        }
    }
}
