//! Library search-path variable mutation.

use std::env;
use std::ffi::OsString;
use std::path::Path;

use tracing::{debug, info};

/// `original` with `dir` appended.
///
/// An empty original becomes `dir`. If it already ends in `separator`, `dir`
/// is appended directly; otherwise `separator` and `dir` are.
pub fn appended(original: &str, dir: &str, separator: char) -> String {
    if original.is_empty() {
        dir.to_string()
    } else if original.ends_with(separator) {
        format!("{original}{dir}")
    } else {
        format!("{original}{separator}{dir}")
    }
}

/// Appends a directory to a search-path variable and restores the previous
/// value on drop unless committed.
///
/// A variable that was unset is removed again on restore.
#[derive(Debug)]
pub struct SearchPathGuard {
    var: String,
    original: Option<OsString>,
    committed: bool,
}

impl SearchPathGuard {
    /// Append `dir` to the variable `var`.
    pub fn append(var: impl Into<String>, dir: &Path, separator: char) -> Self {
        let var = var.into();
        let original = env::var_os(&var);

        let current = original
            .as_ref()
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_default();
        let updated = appended(&current, &dir.to_string_lossy(), separator);
        env::set_var(&var, &updated);
        info!("Appended {} to {}", dir.display(), var);

        Self {
            var,
            original,
            committed: false,
        }
    }

    /// Name of the variable.
    pub fn var(&self) -> &str {
        &self.var
    }

    /// Keep the new value.
    pub fn commit(mut self) {
        self.committed = true;
    }

    /// Put the previous value back now.
    pub fn restore(self) {
        drop(self);
    }
}

impl Drop for SearchPathGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        match &self.original {
            Some(value) => env::set_var(&self.var, value),
            None => env::remove_var(&self.var),
        }
        debug!("Restored {}", self.var);
    }
}
