use super::{join, Endpoints, Request, ServiceError, Transport};
use crate::model::{NewUser, User, UserRecord, UserRef};
use log::{error, warn};
use reqwest::Method;
use std::sync::Arc;
use thiserror::Error;

/// Why an account operation was refused. The message is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Authentication failed")]
    Failed,
}

/// Which column a user record is addressed by.
#[derive(Debug, Clone, Copy)]
pub enum UserKey<'a> {
    Id(&'a str),
    Email(&'a str),
}

impl<'a> UserKey<'a> {
    fn segments(self) -> [&'a str; 2] {
        match self {
            UserKey::Id(id) => ["id", id],
            UserKey::Email(email) => ["email", email],
        }
    }
}

#[derive(Clone)]
pub struct UserService {
    transport: Arc<dyn Transport>,
    endpoints: Arc<Endpoints>,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Arc<Endpoints>, bcrypt_cost: u32) -> Self {
        UserService {
            transport,
            endpoints,
            bcrypt_cost,
        }
    }

    /// Creates the account. The password is stored as a bcrypt hash.
    pub async fn add(&self, user: &NewUser) -> Result<String, ServiceError> {
        let password_hash = bcrypt::hash(&user.password, self.bcrypt_cost).map_err(|err| {
            error!("Hashing password failed: {}", err);
            ServiceError::from(err)
        })?;
        let user = NewUser {
            password: password_hash,
            ..user.clone()
        };
        let url = join(&self.endpoints.users, &[""])?;
        let body = serde_json::to_string(&user)?;
        self.execute(Request::with_body(Method::POST, url, body)).await
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthFailure> {
        let record = match self.record(UserKey::Email(email)).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(AuthFailure::UserNotFound),
            Err(_) => return Err(AuthFailure::Failed),
        };
        if !password_matches(password, &record.password) {
            return Err(AuthFailure::InvalidPassword);
        }
        Ok(record.without_password())
    }

    /// The account registered under `email`, if any.
    pub async fn retrieve(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(self
            .record(UserKey::Email(email))
            .await?
            .map(UserRecord::without_password))
    }

    pub async fn retrieve_ref(&self, id: &str) -> Result<Option<UserRef>, ServiceError> {
        Ok(self
            .record(UserKey::Id(id))
            .await?
            .map(|record| UserRef::from(&record.without_password())))
    }

    pub async fn update(&self, key: UserKey<'_>, user: &User) -> Result<String, ServiceError> {
        let url = join(&self.endpoints.users, &key.segments())?;
        let body = serde_json::to_string(user)?;
        self.execute(Request::with_body(Method::PUT, url, body)).await
    }

    async fn record(&self, key: UserKey<'_>) -> Result<Option<UserRecord>, ServiceError> {
        let request = Request::get(join(&self.endpoints.users, &key.segments())?);
        let target = request.target();
        let body = self.execute(request).await?;
        let records: Option<Vec<UserRecord>> = serde_json::from_str(&body).map_err(|err| {
            error!("{} returned a malformed body: {}", target, err);
            ServiceError::from(err)
        })?;
        // the user api answers `null` as well as `[]` for a missing account
        Ok(records.unwrap_or_default().into_iter().next())
    }

    async fn execute(&self, request: Request) -> Result<String, ServiceError> {
        let target = request.target();
        self.transport.execute(request).await.map_err(|err| {
            error!("{} failed: {}", target, err);
            err
        })
    }
}

fn password_matches(password: &str, stored: &str) -> bool {
    if stored.is_empty() {
        return false;
    }
    match bcrypt::verify(password, stored) {
        Ok(matches) => matches,
        Err(_) => {
            warn!("Account still has a plaintext password");
            password == stored
        }
    }
}
