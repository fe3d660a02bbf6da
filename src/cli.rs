use clap::{Parser, Subcommand};

/// Chat with Gemini from the terminal
#[derive(Debug, Parser)]
#[command(name = "gemini-chat")]
#[command(version)]
#[command(about = "Chat with Gemini from the terminal", long_about = None)]
pub struct Args {
    /// Model name
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Client (default: config/provider or "google"); "stub" works offline
    #[arg(long = "provider")]
    pub provider: Option<String>,

    /// Milliseconds between revealed characters
    #[arg(long = "tick-ms", value_name = "MS")]
    pub tick_ms: Option<u64>,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run an interactive terminal chat UI (needs the `tui` feature)
    Tui,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_prompt() {
        let args = Args::try_parse_from([
            "gemini-chat",
            "-m",
            "gemini-1.5-flash",
            "--provider",
            "stub",
            "--tick-ms",
            "5",
            "tell",
            "me",
        ])
        .unwrap();
        assert_eq!(args.model.as_deref(), Some("gemini-1.5-flash"));
        assert_eq!(args.provider.as_deref(), Some("stub"));
        assert_eq!(args.tick_ms, Some(5));
        assert!(args.cmd.is_none());
        assert_eq!(args.prompt, vec!["tell", "me"]);
    }

    #[test]
    fn tui_subcommand() {
        let args = Args::try_parse_from(["gemini-chat", "tui"]).unwrap();
        assert!(matches!(args.cmd, Some(Command::Tui)));
        assert!(args.prompt.is_empty());
    }
}
