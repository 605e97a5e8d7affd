/// A line of terminal input, interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCommand {
    Tap,
    Reset,
    Status,
    Quit,
}

impl InputCommand {
    /// Parse a line typed by the user. An empty line is a tap.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "" | "t" | "tap" => Some(Self::Tap),
            "r" | "reset" => Some(Self::Reset),
            "s" | "status" => Some(Self::Status),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InputCommand;

    #[test]
    fn empty_line_taps() {
        assert_eq!(InputCommand::parse(""), Some(InputCommand::Tap));
        assert_eq!(InputCommand::parse("  \n"), Some(InputCommand::Tap));
        assert_eq!(InputCommand::parse("tap"), Some(InputCommand::Tap));
    }

    #[test]
    fn parses_commands_case_insensitively() {
        assert_eq!(InputCommand::parse("R"), Some(InputCommand::Reset));
        assert_eq!(InputCommand::parse("Status"), Some(InputCommand::Status));
        assert_eq!(InputCommand::parse("quit\n"), Some(InputCommand::Quit));
        assert_eq!(InputCommand::parse("bogus"), None);
    }
}
