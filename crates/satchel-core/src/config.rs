use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::{debug, info, trace, warn};

const RC_ENV_VAR: &str = "SATCHELRC";

#[derive(Debug, Clone)]
pub struct Config {
    map: HashMap<String, String>,
    pub loaded_file: Option<PathBuf>,
}

impl Config {
    #[tracing::instrument(skip(rc_override))]
    pub fn load(rc_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Config {
            map: HashMap::new(),
            loaded_file: None,
        };

        cfg.map
            .insert("data.location".to_string(), "~/.satchel".to_string());
        cfg.map.insert("color".to_string(), "on".to_string());

        if let Some(path) = resolve_rc_path(rc_override) {
            info!(rcfile = %path.display(), "loading rc file");
            cfg.load_file(&path)?;
        } else {
            debug!("no rc file found; using defaults");
        }

        Ok(cfg)
    }

    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (k, v) in overrides {
            debug!(key = %k, value = %v, "applying override");
            self.map.insert(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.map.get(key).map(|v| parse_bool(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.map.iter()
    }

    fn load_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = expand_tilde(path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        self.loaded_file = Some(path.clone());

        for (line_num, raw_line) in text.lines().enumerate() {
            let mut line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((before, _)) = line.split_once('#') {
                line = before.trim();
            }
            if line.is_empty() {
                continue;
            }

            let (k, v) = line.split_once('=').ok_or_else(|| {
                anyhow!(
                    "invalid config line {}:{}: {}",
                    path.display(),
                    line_num + 1,
                    raw_line
                )
            })?;

            let key = k.trim().to_string();
            let value = v.trim().to_string();
            trace!(key = %key, value = %value, "loaded config key");
            self.map.insert(key, value);
        }

        Ok(())
    }
}

#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(path) = override_dir {
        path.to_path_buf()
    } else if let Some(cfg_value) = cfg.get("data.location") {
        expand_tilde(Path::new(&cfg_value))
    } else {
        default_data_dir()?
    };

    Ok(dir)
}

fn resolve_rc_path(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }

    if let Ok(from_env) = std::env::var(RC_ENV_VAR) {
        if from_env == "/dev/null" {
            return None;
        }
        return Some(PathBuf::from(from_env));
    }

    let home = match dirs::home_dir() {
        Some(home) => home,
        None => {
            warn!("cannot determine home directory; skipping rc file");
            return None;
        }
    };
    let candidate = home.join(".satchelrc");
    candidate.exists().then_some(candidate)
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".satchel"))
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "y" | "yes" | "on" | "true"
    )
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_bool, resolve_data_dir};

    #[test]
    fn overrides_replace_defaults() {
        let mut cfg = Config {
            map: std::collections::HashMap::new(),
            loaded_file: None,
        };
        cfg.map
            .insert("data.location".to_string(), "~/.satchel".to_string());

        cfg.apply_overrides([("data.location".to_string(), "/tmp/elsewhere".to_string())]);
        assert_eq!(cfg.get("data.location").as_deref(), Some("/tmp/elsewhere"));

        let dir = resolve_data_dir(&cfg, None).expect("resolve");
        assert_eq!(dir, std::path::PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    fn cli_override_wins_over_config() {
        let mut cfg = Config {
            map: std::collections::HashMap::new(),
            loaded_file: None,
        };
        cfg.map
            .insert("data.location".to_string(), "/tmp/from-config".to_string());

        let dir = resolve_data_dir(&cfg, Some(std::path::Path::new("/tmp/from-cli")))
            .expect("resolve");
        assert_eq!(dir, std::path::PathBuf::from("/tmp/from-cli"));
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert!(parse_bool("on"));
        assert!(parse_bool("Yes"));
        assert!(!parse_bool("off"));
        assert!(!parse_bool("nonsense"));
    }
}
