//! Command palette entries and autocomplete logic

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
  /// Go back to the students list, dropping any pushed views
  Students,
  /// Open the create form
  NewStudent,
  /// Invalidate every cached student query
  Refresh,
  Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub action: CommandAction,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "students",
    aliases: &["s", "list", "home"],
    description: "Browse students",
    action: CommandAction::Students,
  },
  Command {
    name: "new",
    aliases: &["n", "add", "create"],
    description: "Add a student",
    action: CommandAction::NewStudent,
  },
  Command {
    name: "refresh",
    aliases: &["r", "reload"],
    description: "Refetch student data",
    action: CommandAction::Refresh,
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit roster",
    action: CommandAction::Quit,
  },
];

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.trim().to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    let priority = if cmd.name == input_lower {
      0
    } else if cmd.aliases.contains(&input_lower.as_str()) {
      1
    } else if cmd.name.starts_with(&input_lower) {
      2
    } else if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      3
    } else if cmd.name.contains(&input_lower) {
      4
    } else {
      continue;
    };
    matches.push((cmd, priority));
  }

  // Stable sort keeps table order within a priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Exact lookup by name or alias
pub fn find(input: &str) -> Option<&'static Command> {
  let input_lower = input.trim().to_lowercase();
  COMMANDS
    .iter()
    .find(|cmd| cmd.name == input_lower || cmd.aliases.contains(&input_lower.as_str()))
}
