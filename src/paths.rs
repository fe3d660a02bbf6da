use anyhow::Context;
use std::env;
use std::path::{Path, PathBuf};

fn home_dir() -> anyhow::Result<PathBuf> {
    // On Unix, HOME is standard. (Windows support can be expanded later.)
    let home = env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home))
}

fn ensure_dir(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Where `config.toml` lives.
///
/// `$GEMINI_CHAT_HOME/config`, then `$XDG_CONFIG_HOME/gemini-chat`, then
/// `~/.config/gemini-chat`.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    ensure_dir(&config_dir_from(
        env::var_os("GEMINI_CHAT_HOME").map(PathBuf::from),
        env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        home_dir,
    )?)
}

fn config_dir_from(
    app_home: Option<PathBuf>,
    xdg_config: Option<PathBuf>,
    home: impl FnOnce() -> anyhow::Result<PathBuf>,
) -> anyhow::Result<PathBuf> {
    if let Some(base) = app_home {
        return Ok(base.join("config"));
    }
    if let Some(xdg) = xdg_config {
        return Ok(xdg.join("gemini-chat"));
    }
    Ok(home()?.join(".config").join("gemini-chat"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_home_takes_precedence() {
        let dir = config_dir_from(
            Some(PathBuf::from("/opt/chat")),
            Some(PathBuf::from("/xdg")),
            || anyhow::bail!("home should not be consulted"),
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/opt/chat/config"));
    }

    #[test]
    fn falls_back_to_xdg_then_home() {
        let dir = config_dir_from(None, Some(PathBuf::from("/xdg")), || {
            anyhow::bail!("home should not be consulted")
        })
        .unwrap();
        assert_eq!(dir, PathBuf::from("/xdg/gemini-chat"));

        let dir = config_dir_from(None, None, || Ok(PathBuf::from("/home/u"))).unwrap();
        assert_eq!(dir, PathBuf::from("/home/u/.config/gemini-chat"));
    }
}
