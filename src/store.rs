//! Application state for one render cycle.
//!
//! The [`Store`] holds the three fields every page renders from. Writes go
//! through the `set_*` methods, which notify every registered [`Observer`]
//! before returning. The durable cache is kept in sync by a [`Persister`]
//! observer; on construction the fields are read back from that cache.

use crate::cache::{DurableCache, CACHE_CURRENT_MOVIE, CACHE_CURRENT_USER, CACHE_MOVIES};
use crate::model::{MovieDetail, MovieSummary, User};
use log::{error, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub movies: Vec<MovieSummary>,
    pub current_movie: Option<MovieDetail>,
    pub current_user: Option<User>,
}

impl State {
    /// Reads all three fields from `cache`. Missing or unreadable entries
    /// fall back to their empty value.
    pub fn load<C: DurableCache + ?Sized>(cache: &C) -> Self {
        State {
            movies: load_field(cache, CACHE_MOVIES).unwrap_or_default(),
            current_movie: load_field(cache, CACHE_CURRENT_MOVIE).unwrap_or_default(),
            current_user: load_field(cache, CACHE_CURRENT_USER).unwrap_or_default(),
        }
    }
}

fn load_field<C, T>(cache: &C, key: &str) -> Option<T>
where
    C: DurableCache + ?Sized,
    T: DeserializeOwned,
{
    let raw = match cache.get(key) {
        Ok(raw) => raw?,
        Err(err) => {
            warn!("Reading {} from cache failed: {}", key, err);
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Ignoring corrupt cache entry {}: {}", key, err);
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Movies,
    CurrentMovie,
    CurrentUser,
}

impl Field {
    pub fn cache_key(self) -> &'static str {
        match self {
            Field::Movies => CACHE_MOVIES,
            Field::CurrentMovie => CACHE_CURRENT_MOVIE,
            Field::CurrentUser => CACHE_CURRENT_USER,
        }
    }
}

/// Called synchronously after every store write.
pub trait Observer {
    fn changed(&self, field: Field, state: &State);
}

pub struct Store {
    state: State,
    observers: Vec<Box<dyn Observer>>,
}

impl Store {
    pub fn new(state: State) -> Self {
        Store {
            state,
            observers: Vec::new(),
        }
    }

    /// Store seeded from `cache` and mirrored back into it on every write.
    pub fn persisted<C: DurableCache + Clone + 'static>(cache: &C) -> Self {
        let mut store = Store::new(State::load(cache));
        store.observe(Persister::new(cache.clone()));
        store
    }

    pub fn observe<O: Observer + 'static>(&mut self, observer: O) {
        self.observers.push(Box::new(observer));
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn movies(&self) -> &[MovieSummary] {
        &self.state.movies
    }

    pub fn current_movie(&self) -> Option<&MovieDetail> {
        self.state.current_movie.as_ref()
    }

    pub fn current_user(&self) -> Option<&User> {
        self.state.current_user.as_ref()
    }

    pub(crate) fn set_movies(&mut self, movies: Vec<MovieSummary>) {
        self.state.movies = movies;
        self.notify(Field::Movies);
    }

    pub(crate) fn set_current_movie(&mut self, movie: Option<MovieDetail>) {
        self.state.current_movie = movie;
        self.notify(Field::CurrentMovie);
    }

    pub(crate) fn set_current_user(&mut self, user: Option<User>) {
        self.state.current_user = user;
        self.notify(Field::CurrentUser);
    }

    fn notify(&self, field: Field) {
        for observer in &self.observers {
            observer.changed(field, &self.state);
        }
    }
}

/// Writes the changed field to the durable cache as JSON.
pub struct Persister<C> {
    cache: C,
}

impl<C: DurableCache> Persister<C> {
    pub fn new(cache: C) -> Self {
        Persister { cache }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                error!("Serializing {} failed: {}", key, err);
                return;
            }
        };
        if let Err(err) = self.cache.set(key, &json) {
            error!("Persisting {} failed: {}", key, err);
        }
    }

    /// A cleared field leaves no entry behind.
    fn write_optional<T: Serialize>(&self, key: &str, value: &Option<T>) {
        match value {
            Some(value) => self.write(key, value),
            None => {
                if let Err(err) = self.cache.remove(key) {
                    error!("Removing {} failed: {}", key, err);
                }
            }
        }
    }
}

impl<C: DurableCache> Observer for Persister<C> {
    fn changed(&self, field: Field, state: &State) {
        let key = field.cache_key();
        match field {
            Field::Movies => self.write(key, &state.movies),
            Field::CurrentMovie => self.write_optional(key, &state.current_movie),
            Field::CurrentUser => self.write_optional(key, &state.current_user),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SledCache;
    use crate::testing::{movie_detail, movie_summary, review, user};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn cache() -> SledCache {
        let db = sled::Config::new().temporary(true).open().unwrap();
        SledCache::open(&db, "1", 1 << 20).unwrap()
    }

    #[test]
    fn empty_cache_loads_defaults() {
        let store = Store::persisted(&cache());
        assert_eq!(store.state(), &State::default());
    }

    #[test]
    fn corrupt_entries_are_not_cached() {
        let cache = cache();
        cache.set(CACHE_MOVIES, "[{").unwrap();
        cache.set(CACHE_CURRENT_USER, r#"{"id":"1","email":"a@b.c"}"#).unwrap();
        let state = State::load(&cache);
        assert!(state.movies.is_empty());
        assert_eq!(state.current_user.unwrap().email, "a@b.c");
    }

    #[test]
    fn fields_survive_reload() {
        let cache = cache();
        let mut detail = movie_detail(42);
        detail.reviews = vec![review(1, 42, "u1")];
        {
            let mut store = Store::persisted(&cache);
            store.set_movies(vec![movie_summary(1), movie_summary(2)]);
            store.set_current_movie(Some(detail.clone()));
            store.set_current_user(Some(user("u1", "ann@example.com")));
        }
        let reloaded = Store::persisted(&cache);
        assert_eq!(reloaded.movies(), &[movie_summary(1), movie_summary(2)][..]);
        assert_eq!(reloaded.current_movie(), Some(&detail));
        assert_eq!(
            reloaded.current_user(),
            Some(&user("u1", "ann@example.com"))
        );
    }

    #[test]
    fn clearing_a_field_removes_its_entry() {
        let cache = cache();
        let mut store = Store::persisted(&cache);
        store.set_current_user(None);
        assert_eq!(cache.get(CACHE_CURRENT_USER).unwrap(), None);

        store.set_current_user(Some(user("u1", "ann@example.com")));
        store.set_current_movie(Some(movie_detail(42)));
        assert!(cache.get(CACHE_CURRENT_USER).unwrap().is_some());
        store.set_current_user(None);
        store.set_current_movie(None);
        assert_eq!(cache.get(CACHE_CURRENT_USER).unwrap(), None);
        assert_eq!(cache.get(CACHE_CURRENT_MOVIE).unwrap(), None);
        assert_eq!(Store::persisted(&cache).state(), &State::default());
    }

    struct Recorder(Rc<RefCell<Vec<(Field, usize)>>>);

    impl Observer for Recorder {
        fn changed(&self, field: Field, state: &State) {
            self.0.borrow_mut().push((field, state.movies.len()));
        }
    }

    #[test]
    fn observers_see_the_write_before_setter_returns() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut store = Store::new(State::default());
        store.observe(Recorder(seen.clone()));
        store.set_movies(vec![movie_summary(1)]);
        assert_eq!(*seen.borrow(), vec![(Field::Movies, 1)]);
        store.set_current_movie(None);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn quota_failure_does_not_abort_the_write() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let small = SledCache::open(&db, "1", 16).unwrap();
        let mut store = Store::persisted(&small);
        store.set_movies(vec![movie_summary(1)]);
        assert_eq!(store.movies().len(), 1);
        assert_eq!(small.get(CACHE_MOVIES).unwrap(), None);
    }
}
