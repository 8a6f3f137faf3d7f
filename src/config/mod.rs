//! Configuration layer: typed settings with layered precedence (files → environment).

use std::path::Path;
use std::str::FromStr;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::CacheConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "blogcache";
const ENV_PREFIX: &str = "BLOGCACHE";
const DEFAULT_PERSONAL_TITLE_PREFIX: &str = "Blog by";
const DEFAULT_PERSONAL_DESCRIPTION: &str = "This is your personal blog.";
const DEFAULT_PERSONAL_LIMIT_RATING_TOPIC: f64 = -1000.0;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheConfig,
    pub blogs: BlogSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Defaults applied to automatically created personal blogs.
#[derive(Debug, Clone, PartialEq)]
pub struct BlogSettings {
    /// Placed before the owner's login to form the blog title.
    pub personal_title_prefix: String,
    pub personal_description: String,
    pub personal_limit_rating_topic: f64,
}

impl Default for BlogSettings {
    fn default() -> Self {
        Self {
            personal_title_prefix: DEFAULT_PERSONAL_TITLE_PREFIX.to_string(),
            personal_description: DEFAULT_PERSONAL_DESCRIPTION.to_string(),
            personal_limit_rating_topic: DEFAULT_PERSONAL_LIMIT_RATING_TOPIC,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence
/// (`config/default` → `blogcache` → `config_file` → `BLOGCACHE__*` environment).
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: CacheConfig,
    blogs: RawBlogSettings,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            blogs,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let blogs = build_blog_settings(blogs)?;

        Ok(Self {
            logging,
            cache,
            blogs,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: CacheConfig) -> Result<CacheConfig, LoadError> {
    if cache.enabled && cache.memory_capacity == 0 {
        return Err(LoadError::invalid(
            "cache.memory_capacity",
            "must be greater than zero while the cache is enabled",
        ));
    }
    Ok(cache)
}

fn build_blog_settings(blogs: RawBlogSettings) -> Result<BlogSettings, LoadError> {
    let defaults = BlogSettings::default();

    let personal_title_prefix = match blogs.personal_title_prefix {
        Some(prefix) => {
            let trimmed = prefix.trim();
            if trimmed.is_empty() {
                return Err(LoadError::invalid(
                    "blogs.personal_title_prefix",
                    "must not be blank",
                ));
            }
            trimmed.to_string()
        }
        None => defaults.personal_title_prefix,
    };

    let personal_limit_rating_topic = blogs
        .personal_limit_rating_topic
        .unwrap_or(defaults.personal_limit_rating_topic);
    if !personal_limit_rating_topic.is_finite() {
        return Err(LoadError::invalid(
            "blogs.personal_limit_rating_topic",
            "must be a finite number",
        ));
    }

    Ok(BlogSettings {
        personal_title_prefix,
        personal_description: blogs
            .personal_description
            .unwrap_or(defaults.personal_description),
        personal_limit_rating_topic,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBlogSettings {
    personal_title_prefix: Option<String>,
    personal_description: Option<String>,
    personal_limit_rating_topic: Option<f64>,
}
