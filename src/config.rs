use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::Deserialize;

use crate::entity::EntityRegistry;
use crate::list::DEFAULT_PAGE_SIZE;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_NAME: &str = "refadmin";
const CONFIG_ENV: &str = "REFADMIN_CONFIG";
const TOKEN_ENV: &str = "REFADMIN_TOKEN";
const MAX_PAGE_SIZE: u64 = 500;

#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: Option<PathBuf>,
    pub base_url: String,
    pub token: Option<String>,
    pub page_size: u64,
    pub entities: EntityRegistry,
}

/// Values given on the command line; they win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub base_url: Option<String>,
    pub token: Option<String>,
}

// =============================================================================
// Config file structure
// =============================================================================

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    base_url: Option<String>,
    token: Option<String>,
    token_file: Option<String>,
    page_size: Option<u64>,
    entities: BTreeMap<String, EntityFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct EntityFile {
    path: Option<String>,
}

impl ConfigFile {
    /// `env_token` is the value of `REFADMIN_TOKEN`, read by the caller.
    fn into_config(
        self,
        config_path: Option<PathBuf>,
        overrides: &Overrides,
        env_token: Option<String>,
    ) -> Result<Config> {
        let base_url = overrides
            .base_url
            .clone()
            .or(self.base_url)
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .context("`base_url` must be specified in configuration or with --base-url")?;

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("base_url must start with http:// or https://, got '{}'", base_url);
        }

        let token = match overrides.token.clone().or(env_token) {
            Some(token) => Some(token),
            None => match self.token {
                Some(token) => Some(token),
                None => match self.token_file {
                    Some(path) => Some(read_token_file(&expand_tilde(Path::new(&path)))?),
                    None => None,
                },
            },
        }
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

        let page_size = match self.page_size {
            Some(0) => bail!("page_size must be at least 1"),
            Some(size) if size > MAX_PAGE_SIZE => {
                tracing::warn!(size, max = MAX_PAGE_SIZE, "page_size too large, clamping");
                MAX_PAGE_SIZE
            }
            Some(size) => size,
            None => DEFAULT_PAGE_SIZE,
        };

        let mut entities = EntityRegistry::builtin();
        for (name, entity) in self.entities {
            let Some(path) = entity.path else {
                continue;
            };
            if !entities.override_path(&name, &path) {
                tracing::warn!(entity = %name, "unknown entity in configuration; ignoring");
            }
        }

        Ok(Config {
            config_path,
            base_url,
            token,
            page_size,
            entities,
        })
    }
}

/// Expand ~ to home directory in paths
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = home::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

fn read_token_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read token file at {}", path.display()))
}

fn config_root() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine base directories")?;
    Ok(base.config_dir().join(APP_NAME))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE_NAME))
}

/// Loads the config file (explicit path, `REFADMIN_CONFIG`, or the default
/// location) and applies command-line overrides. A missing default file is
/// fine when the overrides supply everything.
pub fn load(overrides: &Overrides) -> Result<Config> {
    let explicit = overrides
        .config_path
        .clone()
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("configuration file not found at {}", path.display());
            }
            Some(path)
        }
        None => default_config_path().ok().filter(|path| path.exists()),
    };

    let Some(path) = path else {
        return ConfigFile::default().into_config(None, overrides, env_token());
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration file at {}", path.display()))?;
    let config = parse(&raw, Some(path.clone()), overrides)
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded configuration");
    Ok(config)
}

fn env_token() -> Option<String> {
    env::var(TOKEN_ENV).ok()
}

pub fn parse(raw: &str, config_path: Option<PathBuf>, overrides: &Overrides) -> Result<Config> {
    parse_with_env_token(raw, config_path, overrides, env_token())
}

fn parse_with_env_token(
    raw: &str,
    config_path: Option<PathBuf>,
    overrides: &Overrides,
    env_token: Option<String>,
) -> Result<Config> {
    let value: toml::Value = toml::from_str(raw).context("failed to parse configuration as TOML")?;

    warn_unknown_keys(&value);

    let cfg_file: ConfigFile = value
        .try_into()
        .context("failed to deserialize configuration")?;
    cfg_file.into_config(config_path, overrides, env_token)
}

// =============================================================================
// Unknown key warnings
// =============================================================================

fn warn_unknown_keys(value: &toml::Value) {
    let Some(table) = value.as_table() else {
        return;
    };

    let known = HashSet::from(["base_url", "token", "token_file", "page_size", "entities"]);
    for key in table.keys() {
        if !known.contains(key.as_str()) {
            tracing::warn!("unknown configuration key `{}`", key);
        }
    }

    let Some(entities) = table.get("entities").and_then(toml::Value::as_table) else {
        return;
    };
    for (name, entry) in entities {
        let Some(entry) = entry.as_table() else {
            continue;
        };
        for key in entry.keys() {
            if key != "path" {
                tracing::warn!("unknown configuration key `entities.{}.{}`", name, key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides() -> Overrides {
        Overrides {
            token: Some("t0k3n".into()),
            ..Overrides::default()
        }
    }

    #[test]
    fn parses_base_url_and_entity_paths() {
        let raw = r#"
            base_url = "https://admin.example.com/api/"
            page_size = 25

            [entities.eye-color]
            path = "/eyecolor"
        "#;
        let config = parse(raw, None, &overrides()).unwrap();
        assert_eq!(config.base_url, "https://admin.example.com/api");
        assert_eq!(config.page_size, 25);
        assert_eq!(config.entities.get("eye-color").unwrap().base_path, "/eyecolor");
        assert_eq!(config.token.as_deref(), Some("t0k3n"));
    }

    #[test]
    fn base_url_is_required() {
        let err = parse("page_size = 5", None, &Overrides::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("base_url"));
    }

    #[test]
    fn command_line_wins_over_file() {
        let raw = r#"base_url = "http://file.example""#;
        let overrides = Overrides {
            base_url: Some("http://flag.example".into()),
            token: Some("flag".into()),
            ..Overrides::default()
        };
        let config = parse(raw, None, &overrides).unwrap();
        assert_eq!(config.base_url, "http://flag.example");
        assert_eq!(config.token.as_deref(), Some("flag"));
    }

    #[test]
    fn page_size_bounds() {
        assert!(parse("base_url = \"http://x\"\npage_size = 0", None, &overrides()).is_err());
        let config = parse("base_url = \"http://x\"\npage_size = 9000", None, &overrides()).unwrap();
        assert_eq!(config.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn token_file_is_read_and_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token");
        fs::write(&token_path, "secret\n").unwrap();
        let raw = format!(
            "base_url = \"http://x\"\ntoken_file = \"{}\"",
            token_path.display()
        );
        let config = parse_with_env_token(&raw, None, &Overrides::default(), None).unwrap();
        assert_eq!(config.token.as_deref(), Some("secret"));
    }

    #[test]
    fn env_token_wins_over_file_but_not_flag() {
        let raw = "base_url = \"http://x\"\ntoken = \"from-file\"";
        let config =
            parse_with_env_token(raw, None, &Overrides::default(), Some("from-env".into())).unwrap();
        assert_eq!(config.token.as_deref(), Some("from-env"));

        let config = parse_with_env_token(raw, None, &overrides(), Some("from-env".into())).unwrap();
        assert_eq!(config.token.as_deref(), Some("t0k3n"));
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(parse("base_url = \"ftp://x\"", None, &overrides()).is_err());
    }
}
