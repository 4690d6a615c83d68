//! The only code allowed to write to the [`Store`].
//!
//! Every operation takes the per-request [`AppContext`], performs its remote
//! calls and then applies a single store update. The durable cache is left
//! to the store's observers, except for [`user::logout`].

pub mod movie;
pub mod user;

use crate::cache::DurableCache;
use crate::services::Services;
use crate::store::{State, Store};

pub use user::AccountError;

/// Everything one render cycle works on. Built per request, never shared.
pub struct AppContext {
    pub store: Store,
    pub cache: Box<dyn DurableCache>,
    pub services: Services,
}

impl AppContext {
    pub fn new<C: DurableCache + Clone + 'static>(cache: C, services: Services) -> Self {
        AppContext {
            store: Store::persisted(&cache),
            cache: Box::new(cache),
            services,
        }
    }
}

/// Adopts a snapshot produced elsewhere, such as the state a server-rendered
/// page was built from.
pub fn restore(ctx: &mut AppContext, state: State) {
    ctx.store.set_movies(state.movies);
    ctx.store.set_current_movie(state.current_movie);
    ctx.store.set_current_user(state.current_user);
}
