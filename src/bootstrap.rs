//! Builds the application for one render cycle and drives it to markup.
//!
//! A cycle goes `Constructed -> Routing -> Rendered` on the server, where
//! [`render`] turns a request url into a full page, and
//! `Constructed -> Routing -> Hydrated` in a browser page, where [`hydrate`]
//! attaches to markup the server already produced. Both sides build their
//! app with [`create_app`]; the only difference is the router history.

use crate::model::{MovieDetail, MovieSummary, Review};
use crate::mutations::movie::{list_movies, retrieve_movie};
use crate::mutations::{self, AppContext};
use crate::router::{History, Route, Router};
use crate::services::ServiceError;
use crate::store::{State, Store};
use log::{debug, error, warn};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

const APP_OPEN: &str = r#"<div id="app">"#;
const APP_CLOSE: &str = "</div><!--/app-->";
const STATE_OPEN: &str = r#"<script id="initial-state" type="application/json">"#;
const STATE_CLOSE: &str = "</script>";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
    #[error("route could not be loaded: {0}")]
    Routing(#[from] ServiceError),
    #[error("state could not be serialized: {0}")]
    State(#[from] serde_json::Error),
    #[error("page has no server-rendered app markup")]
    MissingMarkup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Constructed,
    Routing,
    Rendered,
    Hydrated,
    Failed,
}

/// Templates and the settings they need, shared by every request.
pub struct Renderer {
    templates: tera::Tera,
    poster_base: String,
}

impl Renderer {
    pub fn new(templates_glob: &str, poster_base: &str) -> Result<Self, tera::Error> {
        Ok(Renderer {
            templates: tera::Tera::new(templates_glob)?,
            poster_base: poster_base.trim_end_matches('/').to_owned(),
        })
    }

    /// Standalone error page. Falls back to plain text if even that fails.
    pub fn error_page(&self, message: &str) -> String {
        let mut ctx = tera::Context::new();
        ctx.insert("title", "Movie Explorer | Error");
        ctx.insert("message", message);
        self.templates.render("error.html", &ctx).unwrap_or_else(|err| {
            error!("Rendering error page failed: {:?}", err);
            message.to_owned()
        })
    }

    fn poster(&self, path: &Option<String>) -> Option<String> {
        path.as_ref().map(|path| format!("{}{}", self.poster_base, path))
    }

    fn card<'a>(&self, movie: &'a MovieSummary) -> MovieCard<'a> {
        MovieCard {
            id: movie.id,
            title: &movie.title,
            poster: self.poster(&movie.poster_path),
            year: movie.release_year(),
            genres: movie.genre_names(),
            vote_average: movie.vote_average,
            overview: &movie.overview,
        }
    }
}

#[derive(Serialize)]
struct MovieCard<'a> {
    id: u64,
    title: &'a str,
    poster: Option<String>,
    year: Option<&'a str>,
    genres: Vec<&'a str>,
    vote_average: f64,
    overview: &'a str,
}

#[derive(Serialize)]
struct MoviePage<'a> {
    #[serde(flatten)]
    card: MovieCard<'a>,
    tagline: Option<&'a str>,
    runtime: Option<u32>,
    reviews: &'a [Review],
}

pub struct App {
    ctx: AppContext,
    router: Router,
    renderer: Arc<Renderer>,
    phase: Phase,
    notice: Option<String>,
}

/// One factory for both sides; `is_server` only picks the history.
pub fn create_app(ctx: AppContext, renderer: Arc<Renderer>, is_server: bool) -> App {
    App {
        ctx,
        router: Router::new(History::for_context(is_server)),
        renderer,
        phase: Phase::Constructed,
        notice: None,
    }
}

impl App {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn store(&self) -> &Store {
        &self.ctx.store
    }

    pub fn context(&mut self) -> &mut AppContext {
        &mut self.ctx
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Message shown above the page content, e.g. a failed login reason.
    pub fn set_notice<S: Into<String>>(&mut self, notice: S) {
        self.notice = Some(notice.into());
    }

    fn enter(&mut self, phase: Phase) {
        debug!("Render cycle {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Resolves the pending location and loads the data its page needs.
    async fn ready(&mut self, location: &str) -> Result<Route, RenderError> {
        self.enter(Phase::Routing);
        self.router.push(location);
        let route = self.router.resolve().clone();
        let loaded = match &route {
            Route::Home => list_movies(&mut self.ctx).await,
            Route::Movie(id) => retrieve_movie(&mut self.ctx, *id).await,
            _ => Ok(()),
        };
        loaded?;
        Ok(route)
    }

    fn render_fragment(&self, route: &Route) -> Result<String, RenderError> {
        let state = self.ctx.store.state();
        let renderer = &self.renderer;
        let mut ctx = tera::Context::new();
        ctx.insert("route", route.name());
        ctx.insert("notice", &self.notice);
        ctx.insert("user", &state.current_user);
        match route {
            Route::Home => {
                let cards: Vec<_> = state.movies.iter().map(|m| renderer.card(m)).collect();
                ctx.insert("movies", &cards);
            }
            Route::Movie(id) => {
                let movie = state
                    .current_movie
                    .as_ref()
                    .filter(|movie| movie.id() == *id)
                    .map(|movie| movie_page(renderer, movie));
                ctx.insert("movie", &movie);
            }
            Route::NotFound(path) => ctx.insert("path", path),
            _ => {}
        }
        Ok(renderer.templates.render(&route.template(), &ctx)?)
    }

    fn render_page(&self, route: &Route, fragment: &str) -> Result<String, RenderError> {
        let state_json = serde_json::to_string(self.ctx.store.state())?.replace('<', "\\u003c");
        let mut ctx = tera::Context::new();
        ctx.insert("title", &format!("Movie Explorer | {}", route.title()));
        ctx.insert("app_html", fragment);
        ctx.insert("state_json", &state_json);
        Ok(self.renderer.templates.render("shell.html", &ctx)?)
    }
}

fn movie_page<'a>(renderer: &Renderer, movie: &'a MovieDetail) -> MoviePage<'a> {
    let mut card = renderer.card(&movie.summary);
    // detail answers carry genre objects instead of ids
    if !movie.genres.is_empty() {
        card.genres = movie.genres.iter().map(|g| g.name.as_str()).collect();
    }
    MoviePage {
        card,
        tagline: movie.tagline.as_deref(),
        runtime: movie.runtime,
        reviews: &movie.reviews,
    }
}

pub struct RenderedPage {
    pub route: Route,
    pub html: String,
}

/// Server side: navigates to `url`, waits for the route and renders the page.
pub async fn render(app: &mut App, url: &str) -> Result<RenderedPage, RenderError> {
    let result = server_cycle(app, url).await;
    app.enter(match result {
        Ok(_) => Phase::Rendered,
        Err(_) => Phase::Failed,
    });
    result
}

async fn server_cycle(app: &mut App, url: &str) -> Result<RenderedPage, RenderError> {
    let route = app.ready(url).await?;
    let fragment = app.render_fragment(&route)?;
    let html = app.render_page(&route, &fragment)?;
    Ok(RenderedPage { route, html })
}

pub struct HydratedPage {
    pub route: Route,
    pub markup: String,
    /// Whether the server markup was kept as is.
    pub reused: bool,
}

/// Client side: takes over a server-rendered `page` shown at `location`.
pub async fn hydrate(app: &mut App, page: &str, location: &str) -> Result<HydratedPage, RenderError> {
    let result = attach(app, page, location).await;
    app.enter(match result {
        Ok(_) => Phase::Hydrated,
        Err(_) => Phase::Failed,
    });
    result
}

async fn attach(app: &mut App, page: &str, location: &str) -> Result<HydratedPage, RenderError> {
    let existing = between(page, APP_OPEN, APP_CLOSE).ok_or(RenderError::MissingMarkup)?;
    match between(page, STATE_OPEN, STATE_CLOSE).map(serde_json::from_str::<State>) {
        Some(Ok(state)) => mutations::restore(&mut app.ctx, state),
        Some(Err(err)) => warn!("Ignoring embedded state: {}", err),
        None => debug!("Page has no embedded state, using cached state"),
    }
    let route = app.ready(location).await?;
    let fragment = app.render_fragment(&route)?;
    if fragment == existing {
        return Ok(HydratedPage {
            route,
            markup: existing.to_owned(),
            reused: true,
        });
    }
    warn!("Hydration mismatch on {}, replacing server markup", location);
    Ok(HydratedPage {
        route,
        markup: fragment,
        reused: false,
    })
}

fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let len = text[start..].find(close)?;
    Some(&text[start..start + len])
}
