#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommandAction {
    Help,
    LoadRules,
    ShowRules,
    Upload,
    ListFiles,
    Quit,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: CommandAction,
}

pub(crate) const PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "rules",
        action: CommandAction::LoadRules,
    },
    CommandSpec {
        command: "upload",
        action: CommandAction::Upload,
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "rules_show",
        action: CommandAction::ShowRules,
    },
    CommandSpec {
        command: "files",
        action: CommandAction::ListFiles,
    },
    CommandSpec {
        command: "help",
        action: CommandAction::Help,
    },
    CommandSpec {
        command: "quit",
        action: CommandAction::Quit,
    },
    CommandSpec {
        command: "exit",
        action: CommandAction::Quit,
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/rules <mapping.json>",
    "/rules_show",
    "/upload <path> [name]",
    "/files",
    "/help",
    "/quit",
];
