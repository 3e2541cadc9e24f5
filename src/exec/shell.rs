//! POSIX shell quoting for arguments that pass through a remote shell
//!
//! ssh joins its arguments into a single string and hands it to the login
//! shell on the far side, so every argument must be quoted before it leaves.

/// Quote `arg` so a POSIX shell reads it back as exactly one word
///
/// Strings made only of `[A-Za-z0-9@%+=:,./_-]` are returned unchanged; the
/// empty string becomes `''`; everything else is wrapped in single quotes with
/// embedded single quotes written as `'"'"'`.
pub fn quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    if arg.chars().all(is_safe) {
        return arg.to_string();
    }

    format!("'{}'", arg.replace('\'', r#"'"'"'"#))
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c)
}
