//! Fixtures shared by the unit tests.

use crate::model::{MovieDetail, MovieSummary, Review, User};
use crate::services::{Endpoints, Request, ServiceError, Services, Transport};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::json;
use std::sync::{Arc, Mutex};

type Responder = dyn Fn(&Request) -> Result<String, ServiceError> + Send + Sync;

struct Inner {
    respond: Box<Responder>,
    log: Mutex<Vec<(String, Option<String>)>>,
}

/// Answers every request with `respond` and records what was asked.
#[derive(Clone)]
pub struct FakeTransport {
    inner: Arc<Inner>,
}

impl FakeTransport {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&Request) -> Result<String, ServiceError> + Send + Sync + 'static,
    {
        FakeTransport {
            inner: Arc::new(Inner {
                respond: Box::new(respond),
                log: Mutex::new(Vec::new()),
            }),
        }
    }

    /// `METHOD path`, plus `?page=N` for catalog pages.
    pub fn requests(&self) -> Vec<String> {
        self.inner
            .log
            .lock()
            .unwrap()
            .iter()
            .map(|(line, _)| line.clone())
            .collect()
    }

    pub fn bodies(&self) -> Vec<Option<String>> {
        self.inner
            .log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.inner.log.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, request: Request) -> Result<String, ServiceError> {
        let mut line = format!("{} {}", request.method, request.url.path());
        if let Some(page) = page_of(&request.url) {
            line.push_str(&format!("?page={}", page));
        }
        self.inner
            .log
            .lock()
            .unwrap()
            .push((line, request.body.clone()));
        (self.inner.respond)(&request)
    }
}

pub fn endpoints(movie_pages: u32) -> Endpoints {
    Endpoints {
        movie_list: Url::parse("http://tmdb.test/3/discover/movie?with_genres=16").unwrap(),
        movie_detail: Url::parse("http://tmdb.test/3/movie").unwrap(),
        api_key: "key".to_owned(),
        reviews: Url::parse("http://api.test/reviews").unwrap(),
        users: Url::parse("http://api.test/users").unwrap(),
        movie_pages,
    }
}

pub fn services(fake: &FakeTransport, movie_pages: u32) -> Services {
    Services::new(Arc::new(fake.clone()), endpoints(movie_pages), 4)
}

pub fn unavailable() -> ServiceError {
    ServiceError::Status {
        status: 503,
        target: "fake".to_owned(),
    }
}

pub fn page_of(url: &Url) -> Option<u32> {
    url.query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse().ok())
}

/// Catalog page `page` with ids `page * 100 ..`.
pub fn catalog_page(page: u32, size: u64) -> String {
    let results: Vec<_> = (0..size)
        .map(|i| {
            let id = u64::from(page) * 100 + i;
            json!({
                "id": id,
                "title": format!("Movie {}", id),
                "poster_path": format!("/{}.jpg", id),
                "genre_ids": [16],
            })
        })
        .collect();
    json!({ "page": page, "results": results }).to_string()
}

pub fn user_rows(id: &str, email: &str, password: &str) -> String {
    json!([{
        "id": id,
        "email": email,
        "password": password,
        "firstName": "Ann",
        "lastName": "Lee",
    }])
    .to_string()
}

pub fn movie_summary(id: u64) -> MovieSummary {
    MovieSummary {
        id,
        title: format!("Movie {}", id),
        poster_path: Some(format!("/{}.jpg", id)),
        genre_ids: vec![16, 10751],
        release_date: Some("2001-07-20".to_owned()),
        overview: "A girl and a bathhouse.".to_owned(),
        vote_average: 8.5,
    }
}

pub fn movie_detail(id: u64) -> MovieDetail {
    MovieDetail {
        summary: movie_summary(id),
        genres: Vec::new(),
        runtime: Some(125),
        tagline: None,
        reviews: Vec::new(),
    }
}

pub fn review(id: u64, movie_id: u64, user_id: &str) -> Review {
    Review {
        id,
        movie_id,
        user_id: user_id.to_owned(),
        rating: 4,
        comment: "Great".to_owned(),
        user: None,
    }
}

pub fn user(id: &str, email: &str) -> User {
    User {
        id: id.to_owned(),
        email: email.to_owned(),
        first_name: "Ann".to_owned(),
        last_name: "Lee".to_owned(),
    }
}
