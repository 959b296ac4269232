//! Shell escaping and command composition.

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a single argument, only when it needs it.
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    const SHELL_META: &[char] = &[
        ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}',
        '<', '>', '|', '&', ';', '#', '~',
    ];

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", escape_single_quote_content(arg))
}

/// Quote a path (always quotes).
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quote_content(path))
}

/// `cd <dir> && <command>`.
pub fn with_cwd(dir: &str, command: &str) -> String {
    format!("cd {} && {}", quote_path(dir), command)
}

/// Run a whole command line as another user through a login shell.
pub fn sudo_command(user: &str, command: &str) -> String {
    format!(
        "sudo -u {} -i bash -c '{}'",
        quote_arg(user),
        escape_single_quote_content(command)
    )
}
