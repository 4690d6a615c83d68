use super::AppContext;
use crate::cache::CACHE_CURRENT_USER;
use crate::model::{NewUser, ProfileChanges, User};
use crate::services::{AuthFailure, ServiceError, UserKey};
use log::{error, info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("An account with this email already exists")]
    EmailTaken,
    #[error("You need to log in first")]
    NotLoggedIn,
    #[error(transparent)]
    Refused(#[from] AuthFailure),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignupOutcome {
    SignedIn(User),
    /// The account was created but the follow-up login did not go through.
    CreatedWithoutSession(AuthFailure),
}

impl SignupOutcome {
    pub fn message(&self) -> String {
        match self {
            SignupOutcome::SignedIn(user) => format!("Welcome, {}!", user.first_name),
            SignupOutcome::CreatedWithoutSession(reason) => {
                format!("Your account was created, but you could not be logged in: {}", reason)
            }
        }
    }
}

pub async fn signup(ctx: &mut AppContext, model: &NewUser) -> Result<SignupOutcome, AccountError> {
    if ctx.services.users.retrieve(&model.email).await?.is_some() {
        return Err(AccountError::EmailTaken);
    }
    ctx.services.users.add(model).await?;
    match ctx
        .services
        .users
        .authenticate(&model.email, &model.password)
        .await
    {
        Ok(user) => {
            info!("Account {} created", user.id);
            ctx.store.set_current_user(Some(user.clone()));
            Ok(SignupOutcome::SignedIn(user))
        }
        Err(reason) => {
            warn!("Account for {} created without a session: {}", model.email, reason);
            Ok(SignupOutcome::CreatedWithoutSession(reason))
        }
    }
}

/// Starts a session. On failure the store is left as it was.
pub async fn login(ctx: &mut AppContext, email: &str, password: &str) -> Result<User, AuthFailure> {
    let user = ctx.services.users.authenticate(email, password).await?;
    ctx.store.set_current_user(Some(user.clone()));
    Ok(user)
}

pub fn logout(ctx: &mut AppContext) {
    ctx.store.set_current_user(None);
    if let Err(err) = ctx.cache.remove(CACHE_CURRENT_USER) {
        error!("Removing cached user failed: {}", err);
    }
}

/// Writes the changes and re-reads the account before updating the session.
pub async fn update_profile(
    ctx: &mut AppContext,
    changes: &ProfileChanges,
) -> Result<User, AccountError> {
    let current = ctx
        .store
        .current_user()
        .cloned()
        .ok_or(AccountError::NotLoggedIn)?;
    let updated = User {
        first_name: changes.first_name.clone(),
        last_name: changes.last_name.clone(),
        ..current.clone()
    };
    ctx.services
        .users
        .update(UserKey::Id(&current.id), &updated)
        .await?;
    let user = ctx
        .services
        .users
        .retrieve(&current.email)
        .await?
        .ok_or(AuthFailure::UserNotFound)?;
    ctx.store.set_current_user(Some(user.clone()));
    Ok(user)
}
