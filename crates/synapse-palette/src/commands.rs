//! The command table and the query resolver.

use serde::Serialize;

/// Which feature area a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Chat,
    Document,
    Task,
    Code,
    Analytics,
    Setting,
}

/// One executable palette entry. Serializable so hosts can ship the
/// visible items to a webview or IPC surface as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub kind: CommandKind,
}

const fn command(
    id: &'static str,
    title: &'static str,
    description: &'static str,
    kind: CommandKind,
) -> Command {
    Command {
        id,
        title,
        description,
        kind,
    }
}

/// Quick actions followed by navigation targets. Declaration order is
/// result order; the resolver adds no ranking of its own.
pub const BUILTIN_COMMANDS: &[Command] = &[
    command(
        "new-chat",
        "New Chat",
        "Start a new conversation",
        CommandKind::Chat,
    ),
    command(
        "upload-doc",
        "Upload Document",
        "Upload and process a new document",
        CommandKind::Document,
    ),
    command(
        "create-task",
        "Create Task",
        "Add a new task",
        CommandKind::Task,
    ),
    command(
        "analyze-code",
        "Analyze Code",
        "Run code analysis",
        CommandKind::Code,
    ),
    command(
        "nav-chat",
        "Go to Chat",
        "Navigate to chat interface",
        CommandKind::Chat,
    ),
    command(
        "nav-docs",
        "Go to Documents",
        "Navigate to documents panel",
        CommandKind::Document,
    ),
    command(
        "nav-tasks",
        "Go to Tasks",
        "Navigate to tasks panel",
        CommandKind::Task,
    ),
    command(
        "nav-code",
        "Go to Code",
        "Navigate to code analysis",
        CommandKind::Code,
    ),
    command(
        "nav-analytics",
        "Go to Analytics",
        "View analytics dashboard",
        CommandKind::Analytics,
    ),
    command(
        "nav-settings",
        "Go to Settings",
        "Open settings",
        CommandKind::Setting,
    ),
];

/// Case-insensitive substring filter over title and description, in table
/// order. A blank query matches nothing.
pub fn resolve<'a>(commands: &'a [Command], query: &str) -> Vec<&'a Command> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    commands
        .iter()
        .filter(|c| {
            c.title.to_lowercase().contains(&query) || c.description.to_lowercase().contains(&query)
        })
        .collect()
}
