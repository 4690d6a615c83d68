use super::{join, Endpoints, Request, ServiceError, Transport, UserService};
use crate::model::{MovieDetail, MovieSummary, Review, ReviewDraft, UserRef};
use futures::future::join_all;
use log::{debug, error, warn};
use reqwest::{Method, Url};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    results: Vec<MovieSummary>,
}

#[derive(Clone)]
pub struct MovieService {
    transport: Arc<dyn Transport>,
    endpoints: Arc<Endpoints>,
    users: UserService,
}

impl MovieService {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Arc<Endpoints>, users: UserService) -> Self {
        MovieService {
            transport,
            endpoints,
            users,
        }
    }

    /// Fetches the configured number of catalog pages one after another and
    /// concatenates them in page order.
    pub async fn list(&self) -> Result<Vec<MovieSummary>, ServiceError> {
        let mut movies = Vec::new();
        for page in 1..=self.endpoints.movie_pages {
            let mut url = self.endpoints.movie_list.clone();
            url.query_pairs_mut()
                .append_pair("api_key", &self.endpoints.api_key)
                .append_pair("page", &page.to_string());
            let page: Page = self.fetch_json(Request::get(url)).await?;
            movies.extend(page.results);
        }
        debug!("Listed {} movies", movies.len());
        Ok(movies)
    }

    /// Fetches a movie and its reviews concurrently. Only the movie itself is
    /// required; reviews degrade to an empty list.
    pub async fn retrieve(&self, id: u64) -> Result<MovieDetail, ServiceError> {
        let (movie, reviews) = futures::join!(self.retrieve_detail(id), self.retrieve_reviews(id));
        let mut movie = movie?;
        movie.reviews = match reviews {
            Ok(reviews) => self.with_authors(reviews).await,
            Err(err) => {
                warn!("Showing movie {} without reviews: {}", id, err);
                Vec::new()
            }
        };
        Ok(movie)
    }

    async fn retrieve_detail(&self, id: u64) -> Result<MovieDetail, ServiceError> {
        let mut url = join(&self.endpoints.movie_detail, &[&id.to_string()])?;
        url.query_pairs_mut()
            .append_pair("api_key", &self.endpoints.api_key);
        self.fetch_json(Request::get(url)).await
    }

    pub async fn retrieve_reviews(&self, movie_id: u64) -> Result<Vec<Review>, ServiceError> {
        let url = join(&self.endpoints.reviews, &["movieId", &movie_id.to_string()])?;
        self.fetch_json(Request::get(url)).await
    }

    /// Resolves every distinct author once and annotates each review.
    async fn with_authors(&self, mut reviews: Vec<Review>) -> Vec<Review> {
        let ids: BTreeSet<String> = reviews.iter().map(|r| r.user_id.clone()).collect();
        let lookups = ids.into_iter().map(|id| async move {
            let author = match self.users.retrieve_ref(&id).await {
                Ok(Some(author)) => author,
                Ok(None) => {
                    warn!("Review author {} does not exist", id);
                    UserRef::unknown(&id)
                }
                Err(_) => UserRef::unknown(&id),
            };
            (id, author)
        });
        let authors: HashMap<String, UserRef> = join_all(lookups).await.into_iter().collect();
        for review in &mut reviews {
            review.user = Some(
                authors
                    .get(&review.user_id)
                    .cloned()
                    .unwrap_or_else(|| UserRef::unknown(&review.user_id)),
            );
        }
        reviews
    }

    pub async fn add_review(&self, draft: &ReviewDraft) -> Result<String, ServiceError> {
        let url = join(&self.endpoints.reviews, &[""])?;
        self.send(Method::POST, url, draft).await
    }

    pub async fn update_review(&self, id: u64, draft: &ReviewDraft) -> Result<String, ServiceError> {
        let url = join(&self.endpoints.reviews, &["id", &id.to_string()])?;
        self.send(Method::PUT, url, draft).await
    }

    pub async fn delete_review(&self, id: u64) -> Result<String, ServiceError> {
        let url = join(&self.endpoints.reviews, &["id", &id.to_string()])?;
        self.execute(Request {
            method: Method::DELETE,
            url,
            body: None,
        })
        .await
    }

    async fn send(&self, method: Method, url: Url, draft: &ReviewDraft) -> Result<String, ServiceError> {
        let body = serde_json::to_string(draft)?;
        self.execute(Request::with_body(method, url, body)).await
    }

    async fn fetch_json<T: for<'de> Deserialize<'de>>(&self, request: Request) -> Result<T, ServiceError> {
        let target = request.target();
        let body = self.execute(request).await?;
        serde_json::from_str(&body).map_err(|err| {
            error!("{} returned a malformed body: {}", target, err);
            ServiceError::from(err)
        })
    }

    async fn execute(&self, request: Request) -> Result<String, ServiceError> {
        let target = request.target();
        self.transport.execute(request).await.map_err(|err| {
            error!("{} failed: {}", target, err);
            err
        })
    }
}
