use crate::services::Endpoints;
use log::{info, warn};
use reqwest::Url;
use std::{env, fmt::Display, str::FromStr, time::Duration};
use thiserror::Error;

const DEFAULT_MOVIE_LIST_URL: &str =
    "https://api.themoviedb.org/3/discover/movie?include_adult=false&with_genres=16";
const DEFAULT_MOVIE_DETAIL_URL: &str = "https://api.themoviedb.org/3/movie";
const DEFAULT_POSTER_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";
const DEFAULT_REVIEW_API_URL: &str = "http://localhost/apis_movie_review.php";
const DEFAULT_USER_API_URL: &str = "http://localhost/apis_user.php";
const DEFAULT_CACHE_QUOTA: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

pub struct Config {
    pub bind_address: String,
    pub database_path: Option<String>,
    pub templates_glob: String,
    pub session_key: Vec<u8>,
    pub endpoints: Endpoints,
    pub poster_base_url: String,
    pub cache_quota: usize,
    pub bcrypt_cost: u32,
    pub request_timeout: Option<Duration>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Config {
            bind_address: text("BIND_ADDRESS", "127.0.0.1:8080"),
            database_path: env::var("DATABASE_PATH").ok(),
            templates_glob: text(
                "TEMPLATES_GLOB",
                concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*"),
            ),
            session_key: session_key()?,
            endpoints: Endpoints {
                movie_list: url("MOVIE_LIST_URL", DEFAULT_MOVIE_LIST_URL)?,
                movie_detail: url("MOVIE_DETAIL_URL", DEFAULT_MOVIE_DETAIL_URL)?,
                api_key: api_key(),
                reviews: url("REVIEW_API_URL", DEFAULT_REVIEW_API_URL)?,
                users: url("USER_API_URL", DEFAULT_USER_API_URL)?,
                movie_pages: parsed("MOVIE_PAGES", 10)?,
            },
            poster_base_url: text("POSTER_BASE_URL", DEFAULT_POSTER_BASE_URL),
            cache_quota: parsed("CACHE_QUOTA_BYTES", DEFAULT_CACHE_QUOTA)?,
            bcrypt_cost: parsed("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            request_timeout: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .map(|secs| parse("REQUEST_TIMEOUT_SECS", &secs).map(Duration::from_secs))
                .transpose()?,
        })
    }
}

fn text(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        info!("{} not set, using default: {}", key, default);
        default.to_owned()
    })
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        key,
        message: err.to_string(),
    })
}

fn parsed<T: FromStr + Display>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => parse(key, &value),
        Err(_) => {
            info!("{} not set, using default: {}", key, default);
            Ok(default)
        }
    }
}

fn url(key: &'static str, default: &str) -> Result<Url, ConfigError> {
    let url: Url = parse(key, &text(key, default))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::Invalid {
            key,
            message: format!("{} cannot hold a path", url),
        });
    }
    Ok(url)
}

fn api_key() -> String {
    env::var("TMDB_API_KEY").unwrap_or_else(|_| {
        warn!("TMDB_API_KEY not set, catalog requests will be rejected");
        String::new()
    })
}

fn session_key() -> Result<Vec<u8>, ConfigError> {
    match env::var("SESSION_KEY") {
        Ok(key) if key.len() >= 32 => Ok(key.into_bytes()),
        Ok(_) => Err(ConfigError::Invalid {
            key: "SESSION_KEY",
            message: "must be at least 32 bytes".to_owned(),
        }),
        Err(_) => {
            warn!("SESSION_KEY not set, identity cookies are signed with a zero key");
            Ok(vec![0u8; 32])
        }
    }
}
