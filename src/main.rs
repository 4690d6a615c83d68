mod bootstrap;
mod cache;
mod config;
mod model;
mod mutations;
mod router;
mod services;
mod store;
#[cfg(test)]
mod testing;

use actix_identity::{CookieIdentityPolicy, Identity, IdentityService};
use actix_web::{
    error, http::StatusCode, middleware::Logger, web, App, HttpRequest, HttpResponse, HttpServer,
};
use bootstrap::Renderer;
use cache::SledCache;
use config::Config;
use log::{debug, error, info};
use model::{NewUser, ProfileChanges, ReviewDraft};
use mutations::user::SignupOutcome;
use mutations::{AccountError, AppContext};
use serde::{Deserialize, Serialize};
use services::{HttpTransport, Services};
use std::sync::Arc;

/// What every request shares: the stateless clients and the templates.
struct Site {
    services: Services,
    renderer: Arc<Renderer>,
    cache_quota: usize,
}

type SiteData = web::Data<Site>;
type Db = web::Data<sled::Db>;

fn log_error<E: std::fmt::Debug>(err: E, message: &'static str) -> error::Error {
    debug!("{:?}", err);
    error::ErrorInternalServerError(message)
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .append_header(("location", location))
        .finish()
}

/// The browser's cache namespace, handed out on the first visit.
fn origin(id: &Identity, db: &sled::Db) -> actix_web::Result<String> {
    if let Some(origin) = id.identity() {
        return Ok(origin);
    }
    let origin = db
        .generate_id()
        .map_err(|err| log_error(err, "Database error"))?
        .to_string();
    id.remember(origin.clone());
    Ok(origin)
}

/// A fresh application for this request, over this browser's cache.
fn new_app(id: &Identity, db: &sled::Db, site: &Site) -> actix_web::Result<bootstrap::App> {
    let origin = origin(id, db)?;
    let cache = SledCache::open(db, &origin, site.cache_quota)
        .map_err(|err| log_error(err, "Database error"))?;
    let ctx = AppContext::new(cache, site.services.clone());
    Ok(bootstrap::create_app(ctx, site.renderer.clone(), true))
}

async fn respond(site: &Site, app: &mut bootstrap::App, url: &str) -> HttpResponse {
    match bootstrap::render(app, url).await {
        Ok(page) => {
            let status = if page.route.is_found() {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            };
            HttpResponse::build(status)
                .content_type("text/html; charset=utf-8")
                .body(page.html)
        }
        Err(err) => {
            error!("Rendering {} failed: {}", url, err);
            HttpResponse::InternalServerError()
                .content_type("text/html; charset=utf-8")
                .body(site.renderer.error_page("This page could not be loaded."))
        }
    }
}

async fn page(req: HttpRequest, id: Identity, db: Db, site: SiteData) -> actix_web::Result<HttpResponse> {
    let url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut app = new_app(&id, &db, &site)?;
    Ok(respond(&site, &mut app, url).await)
}

#[derive(Serialize, Deserialize)]
struct LoginParams {
    email: String,
    password: String,
}

async fn login_post(
    params: web::Form<LoginParams>,
    id: Identity,
    db: Db,
    site: SiteData,
) -> actix_web::Result<HttpResponse> {
    let mut app = new_app(&id, &db, &site)?;
    match mutations::user::login(app.context(), &params.email, &params.password).await {
        Ok(user) => {
            info!("User {} logged in", user.id);
            Ok(redirect("/"))
        }
        Err(reason) => {
            app.set_notice(reason.to_string());
            Ok(respond(&site, &mut app, "/login").await)
        }
    }
}

async fn signup_post(
    params: web::Form<NewUser>,
    id: Identity,
    db: Db,
    site: SiteData,
) -> actix_web::Result<HttpResponse> {
    let mut app = new_app(&id, &db, &site)?;
    match mutations::user::signup(app.context(), &params).await {
        Ok(SignupOutcome::SignedIn(_)) => Ok(redirect("/")),
        Ok(outcome) => {
            app.set_notice(outcome.message());
            Ok(respond(&site, &mut app, "/login").await)
        }
        Err(AccountError::Service(err)) => Err(log_error(err, "Signup failed")),
        Err(refused) => {
            app.set_notice(refused.to_string());
            Ok(respond(&site, &mut app, "/signup").await)
        }
    }
}

async fn logout(id: Identity, db: Db, site: SiteData) -> actix_web::Result<HttpResponse> {
    let mut app = new_app(&id, &db, &site)?;
    mutations::user::logout(app.context());
    Ok(redirect("/"))
}

async fn profile_post(
    params: web::Form<ProfileChanges>,
    id: Identity,
    db: Db,
    site: SiteData,
) -> actix_web::Result<HttpResponse> {
    let mut app = new_app(&id, &db, &site)?;
    match mutations::user::update_profile(app.context(), &params).await {
        Ok(_) => Ok(redirect("/profile")),
        Err(AccountError::Service(err)) => Err(log_error(err, "Profile update failed")),
        Err(refused) => {
            app.set_notice(refused.to_string());
            Ok(respond(&site, &mut app, "/profile").await)
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ReviewParams {
    rating: u8,
    comment: String,
}

/// Builds the review body for the signed-in user, if there is one.
fn draft(app: &bootstrap::App, movie_id: u64, params: ReviewParams) -> Option<ReviewDraft> {
    let user = app.store().current_user()?;
    Some(ReviewDraft {
        movie_id,
        user_id: user.id.clone(),
        rating: params.rating.clamp(1, 5),
        comment: params.comment,
    })
}

async fn add_review_post(
    path: web::Path<u64>,
    params: web::Form<ReviewParams>,
    id: Identity,
    db: Db,
    site: SiteData,
) -> actix_web::Result<HttpResponse> {
    let movie_id = path.into_inner();
    let mut app = new_app(&id, &db, &site)?;
    let draft = match draft(&app, movie_id, params.into_inner()) {
        Some(draft) => draft,
        None => return Ok(redirect("/login")),
    };
    mutations::movie::add_review(app.context(), &draft)
        .await
        .map_err(|err| log_error(err, "Saving review failed"))?;
    Ok(redirect(&format!("/movie/{}", movie_id)))
}

async fn update_review_post(
    path: web::Path<(u64, u64)>,
    params: web::Form<ReviewParams>,
    id: Identity,
    db: Db,
    site: SiteData,
) -> actix_web::Result<HttpResponse> {
    let (movie_id, review_id) = path.into_inner();
    let mut app = new_app(&id, &db, &site)?;
    let draft = match draft(&app, movie_id, params.into_inner()) {
        Some(draft) => draft,
        None => return Ok(redirect("/login")),
    };
    mutations::movie::update_review(app.context(), review_id, &draft)
        .await
        .map_err(|err| log_error(err, "Saving review failed"))?;
    Ok(redirect(&format!("/movie/{}", movie_id)))
}

async fn delete_review_post(
    path: web::Path<(u64, u64)>,
    id: Identity,
    db: Db,
    site: SiteData,
) -> actix_web::Result<HttpResponse> {
    let (movie_id, review_id) = path.into_inner();
    let mut app = new_app(&id, &db, &site)?;
    if app.store().current_user().is_none() {
        return Ok(redirect("/login"));
    }
    mutations::movie::delete_review(app.context(), review_id, movie_id)
        .await
        .map_err(|err| log_error(err, "Deleting review failed"))?;
    Ok(redirect(&format!("/movie/{}", movie_id)))
}

fn startup_error<E: std::fmt::Display>(err: E) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
}

#[actix_rt::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("movie_explorer=debug,actix_web=info"),
    )
    .init();

    let config = Config::load().map_err(startup_error)?;
    let db = match &config.database_path {
        Some(path) => sled::open(path),
        None => sled::Config::new().temporary(true).open(),
    }
    .map_err(startup_error)?;
    let transport = HttpTransport::new(config.request_timeout).map_err(startup_error)?;
    let renderer = Renderer::new(&config.templates_glob, &config.poster_base_url)
        .map_err(startup_error)?;
    let site = web::Data::new(Site {
        services: Services::new(
            Arc::new(transport),
            config.endpoints.clone(),
            config.bcrypt_cost,
        ),
        renderer: Arc::new(renderer),
        cache_quota: config.cache_quota,
    });
    let db = web::Data::new(db);
    let session_key = config.session_key.clone();

    info!("Listening on {}", config.bind_address);
    HttpServer::new(move || {
        App::new()
            .wrap(IdentityService::new(
                CookieIdentityPolicy::new(&session_key)
                    .name("auth-cookie")
                    .secure(false),
            ))
            .wrap(Logger::default())
            .app_data(site.clone())
            .app_data(db.clone())
            .route("/login", web::post().to(login_post))
            .route("/signup", web::post().to(signup_post))
            .route("/logout", web::get().to(logout))
            .route("/profile", web::post().to(profile_post))
            .route("/movie/{id}/reviews", web::post().to(add_review_post))
            .route(
                "/movie/{id}/reviews/{review}",
                web::post().to(update_review_post),
            )
            .route(
                "/movie/{id}/reviews/{review}/delete",
                web::post().to(delete_review_post),
            )
            .route("/{tail:.*}", web::get().to(page))
    })
    .bind(&config.bind_address)?
    .run()
    .await
}
