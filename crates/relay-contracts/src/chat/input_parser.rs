use super::command_registry::{CommandAction, CommandSpec, NO_ARG_COMMANDS, PATH_COMMANDS};

/// What the user typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Noop,
    Utterance(String),
    Help,
    LoadRules { path: String },
    ShowRules,
    Upload { path: String, name: Option<String> },
    ListFiles,
    Quit,
    MissingArgument { command: String },
    Unknown { command: String, arg: String },
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<CommandAction> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

pub fn parse_chat_input(text: &str) -> ChatInput {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return ChatInput::Noop;
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, PATH_COMMANDS) {
                let mut parts = parse_path_args(arg).into_iter();
                let Some(path) = parts.next() else {
                    return ChatInput::MissingArgument { command };
                };
                return match action {
                    CommandAction::Upload => {
                        let rest = parts.collect::<Vec<String>>();
                        ChatInput::Upload {
                            path,
                            name: if rest.is_empty() {
                                None
                            } else {
                                Some(rest.join(" "))
                            },
                        }
                    }
                    _ => {
                        // A single unquoted path may still contain spaces.
                        let rest = parts.collect::<Vec<String>>();
                        let path = if rest.is_empty() {
                            path
                        } else {
                            std::iter::once(path).chain(rest).collect::<Vec<_>>().join(" ")
                        };
                        ChatInput::LoadRules { path }
                    }
                };
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return match action {
                    CommandAction::ShowRules => ChatInput::ShowRules,
                    CommandAction::ListFiles => ChatInput::ListFiles,
                    CommandAction::Quit => ChatInput::Quit,
                    _ => ChatInput::Help,
                };
            }

            return ChatInput::Unknown {
                command,
                arg: arg.to_string(),
            };
        }
    }

    ChatInput::Utterance(raw_trimmed.to_string())
}
