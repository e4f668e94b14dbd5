use nix::unistd::{getuid, User};

/// Returns the name of the user running the process.
///
/// Falls back to `$USER` and finally to the numeric uid when the passwd
/// database has no entry.
pub fn get_username() -> String {
    let uid = getuid();
    match User::from_uid(uid) {
        Ok(Some(user)) => user.name,
        _ => std::env::var("USER").unwrap_or_else(|_| uid.to_string()),
    }
}
