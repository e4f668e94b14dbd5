use std::{
    fmt::Display,
    path::{Path, PathBuf},
    sync::{LazyLock, PoisonError, RwLock},
};

use nu_ansi_term::Color;
use serde::Serialize;
use up_utils::path::resolve_path;

use crate::error::{ErrorContext, UpResult};

pub static COLOR: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));
pub static PROGRESS: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));
pub static JSON: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(false));

pub fn set_flag(flag: &RwLock<bool>, value: bool) {
    *flag.write().unwrap_or_else(PoisonError::into_inner) = value;
}

fn flag(flag: &RwLock<bool>) -> bool {
    *flag.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn progress_enabled() -> bool {
    flag(&PROGRESS)
}

pub fn json_enabled() -> bool {
    flag(&JSON)
}

pub struct Colored<T: Display>(pub Color, pub T);

impl<T: Display> Display for Colored<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if flag(&COLOR) {
            write!(f, "{}", self.0.prefix())?;
            self.1.fmt(f)?;
            write!(f, "{}", self.0.suffix())
        } else {
            self.1.fmt(f)
        }
    }
}

/// Prints `value` as a single JSON line when `--json` is set.
pub fn print_json<T: Serialize>(value: &T) -> UpResult<bool> {
    if !json_enabled() {
        return Ok(false);
    }
    println!("{}", serde_json::to_string(value)?);
    Ok(true)
}

/// Resolves `path` and makes it absolute against the current directory.
pub fn absolute_path(path: &str) -> UpResult<PathBuf> {
    let path = resolve_path(path)?;
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(std::env::current_dir()
        .with_context(|| "retrieving current directory".into())?
        .join(path))
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
