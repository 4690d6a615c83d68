//! Clients for the remote movie, review and user services.
//!
//! Every outbound call goes through a [`Transport`]. Clients log failures
//! before handing them back as [`ServiceError`]; they never retry.

mod movie;
mod user;

pub use movie::MovieService;
pub use user::{AuthFailure, UserKey, UserService};

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Method, Url};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{target} answered with status {status}")]
    Status { status: u16, target: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("cannot build url from {0}")]
    Url(String),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub body: Option<String>,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Request {
            method: Method::GET,
            url,
            body: None,
        }
    }

    pub fn with_body(method: Method, url: Url, body: String) -> Self {
        Request {
            method,
            url,
            body: Some(body),
        }
    }

    /// Method, host and path. The query is left out since it may hold the api key.
    pub fn target(&self) -> String {
        format!(
            "{} {}{}",
            self.method,
            self.url.host_str().unwrap_or_default(),
            self.url.path()
        )
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a single attempt and returns the response body of a 2xx answer.
    async fn execute(&self, request: Request) -> Result<String, ServiceError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(HttpTransport {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: Request) -> Result<String, ServiceError> {
        let target = request.target();
        let mut builder = self.client.request(request.method, request.url);
        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(body);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                target,
            });
        }
        Ok(response.text().await?)
    }
}

/// Base urls of the remote services.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub movie_list: Url,
    pub movie_detail: Url,
    pub api_key: String,
    pub reviews: Url,
    pub users: Url,
    pub movie_pages: u32,
}

/// Appends path segments to `base`, keeping whatever path it already has.
pub(crate) fn join(base: &Url, segments: &[&str]) -> Result<Url, ServiceError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ServiceError::Url(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// The shared, stateless clients. Cheap to clone into every request.
#[derive(Clone)]
pub struct Services {
    pub movies: MovieService,
    pub users: UserService,
}

impl Services {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints, bcrypt_cost: u32) -> Self {
        let endpoints = Arc::new(endpoints);
        let users = UserService::new(transport.clone(), endpoints.clone(), bcrypt_cost);
        Services {
            movies: MovieService::new(transport, endpoints, users.clone()),
            users,
        }
    }
}
