use std::path::PathBuf;

/// Current wall-clock time as epoch seconds.
#[must_use]
pub fn now_epoch() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[must_use]
pub fn fmt_time(s: f64) -> String {
    let secs = s.max(0.0).floor() as i64;
    let m = secs / 60;
    let r = secs % 60;
    format!("{m}:{r:02}")
}

#[must_use]
pub fn runtime_dir() -> String {
    std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| {
        let uid = nix::unistd::Uid::current().as_raw();
        format!("/run/user/{uid}")
    })
}

/// Expand `$HOME`, `$XDG_CONFIG_HOME` and `$XDG_RUNTIME_DIR` in a configured path.
#[must_use]
pub fn expand(path: &str) -> PathBuf {
    let mut s = path.to_string();
    if let Some(home) = dirs::home_dir() {
        s = s.replace("$HOME", home.to_string_lossy().as_ref());
    }
    if let Some(cfg) = dirs::config_dir() {
        s = s.replace("$XDG_CONFIG_HOME", cfg.to_string_lossy().as_ref());
    }
    s = s.replace("$XDG_RUNTIME_DIR", &runtime_dir());
    PathBuf::from(s)
}

#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max.saturating_sub(1)).collect::<String>() + "…"
}
