use super::AppContext;
use crate::model::ReviewDraft;
use crate::services::ServiceError;
use log::debug;

/// Loads the catalog unless the store already holds it.
pub async fn list_movies(ctx: &mut AppContext) -> Result<(), ServiceError> {
    if !ctx.store.movies().is_empty() {
        debug!("Movie list already loaded");
        return Ok(());
    }
    let movies = ctx.services.movies.list().await?;
    ctx.store.set_movies(movies);
    Ok(())
}

pub async fn retrieve_movie(ctx: &mut AppContext, id: u64) -> Result<(), ServiceError> {
    let movie = ctx.services.movies.retrieve(id).await?;
    ctx.store.set_current_movie(Some(movie));
    Ok(())
}

pub async fn add_review(ctx: &mut AppContext, draft: &ReviewDraft) -> Result<(), ServiceError> {
    ctx.services.movies.add_review(draft).await?;
    retrieve_movie(ctx, draft.movie_id).await
}

pub async fn update_review(
    ctx: &mut AppContext,
    id: u64,
    draft: &ReviewDraft,
) -> Result<(), ServiceError> {
    ctx.services.movies.update_review(id, draft).await?;
    retrieve_movie(ctx, draft.movie_id).await
}

/// Deletes review `id` and reloads the movie it belonged to.
pub async fn delete_review(ctx: &mut AppContext, id: u64, movie_id: u64) -> Result<(), ServiceError> {
    ctx.services.movies.delete_review(id).await?;
    retrieve_movie(ctx, movie_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DurableCache, SledCache, CACHE_CURRENT_MOVIE};
    use crate::model::MovieDetail;
    use crate::testing::{self, FakeTransport};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn context(fake: &FakeTransport) -> (AppContext, SledCache) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let cache = SledCache::open(&db, "1", 1 << 20).unwrap();
        (AppContext::new(cache.clone(), testing::services(fake, 2)), cache)
    }

    #[actix_rt::test]
    async fn list_is_fetched_once() {
        let fake = FakeTransport::new(|request| {
            Ok(testing::catalog_page(testing::page_of(&request.url).unwrap(), 20))
        });
        let (mut ctx, cache) = context(&fake);
        list_movies(&mut ctx).await.unwrap();
        assert_eq!(ctx.store.movies().len(), 40);
        assert_eq!(fake.requests().len(), 2);

        fake.clear();
        list_movies(&mut ctx).await.unwrap();
        assert!(fake.requests().is_empty());

        // a fresh context over the same cache starts out populated
        let mut reloaded = AppContext::new(cache, testing::services(&fake, 2));
        list_movies(&mut reloaded).await.unwrap();
        assert!(fake.requests().is_empty());
        assert_eq!(reloaded.store.movies(), ctx.store.movies());
    }

    #[actix_rt::test]
    async fn failed_list_leaves_store_empty() {
        let fake = FakeTransport::new(|_| Err(testing::unavailable()));
        let (mut ctx, _cache) = context(&fake);
        assert!(list_movies(&mut ctx).await.is_err());
        assert!(ctx.store.movies().is_empty());
    }

    #[actix_rt::test]
    async fn retrieve_always_refetches() {
        let fake = FakeTransport::new(|request| match request.url.path() {
            "/3/movie/42" => Ok(json!({"id": 42, "title": "Totoro"}).to_string()),
            "/reviews/movieId/42" => Ok("[]".to_owned()),
            _ => Err(testing::unavailable()),
        });
        let (mut ctx, cache) = context(&fake);
        retrieve_movie(&mut ctx, 42).await.unwrap();
        retrieve_movie(&mut ctx, 42).await.unwrap();
        assert_eq!(
            fake.requests(),
            vec![
                "GET /3/movie/42",
                "GET /reviews/movieId/42",
                "GET /3/movie/42",
                "GET /reviews/movieId/42"
            ]
        );
        let cached: MovieDetail =
            serde_json::from_str(&cache.get(CACHE_CURRENT_MOVIE).unwrap().unwrap()).unwrap();
        assert_eq!(Some(&cached), ctx.store.current_movie());
    }

    #[actix_rt::test]
    async fn failed_retrieve_keeps_previous_movie() {
        let fake = FakeTransport::new(|request| match request.url.path() {
            "/3/movie/1" => Ok(json!({"id": 1, "title": "Akira"}).to_string()),
            "/reviews/movieId/1" => Ok("[]".to_owned()),
            _ => Err(testing::unavailable()),
        });
        let (mut ctx, _cache) = context(&fake);
        retrieve_movie(&mut ctx, 1).await.unwrap();
        assert!(retrieve_movie(&mut ctx, 2).await.is_err());
        assert_eq!(ctx.store.current_movie().unwrap().id(), 1);
    }

    /// A review service that really stores reviews, so refetches can be checked.
    fn review_backend() -> FakeTransport {
        let reviews = Arc::new(Mutex::new(vec![json!({"id": 1, "movieId": 42, "userId": "u1"})]));
        FakeTransport::new(move |request| {
            let mut reviews = reviews.lock().unwrap();
            let path = request.url.path().to_owned();
            match (request.method.as_str(), path.as_str()) {
                ("GET", "/3/movie/42") => Ok(json!({"id": 42, "title": "Totoro"}).to_string()),
                ("GET", "/reviews/movieId/42") => Ok(serde_json::Value::from(reviews.clone()).to_string()),
                ("GET", "/users/id/u1") => Ok(testing::user_rows("u1", "ann@example.com", "pw")),
                ("POST", "/reviews/") => {
                    let mut review: serde_json::Value =
                        serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
                    review["id"] = json!(reviews.len() as u64 + 1);
                    reviews.push(review);
                    Ok("created".to_owned())
                }
                ("PUT", "/reviews/id/1") => {
                    let mut review: serde_json::Value =
                        serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
                    review["id"] = json!(1);
                    reviews[0] = review;
                    Ok("updated".to_owned())
                }
                ("DELETE", "/reviews/id/1") => {
                    reviews.retain(|r| r["id"] != json!(1));
                    Ok("deleted".to_owned())
                }
                _ => Err(testing::unavailable()),
            }
        })
    }

    fn draft(comment: &str) -> ReviewDraft {
        ReviewDraft {
            movie_id: 42,
            user_id: "u1".to_owned(),
            rating: 5,
            comment: comment.to_owned(),
        }
    }

    #[actix_rt::test]
    async fn review_mutations_reload_current_movie() {
        let fake = review_backend();
        let (mut ctx, _cache) = context(&fake);

        add_review(&mut ctx, &draft("Second")).await.unwrap();
        let movie = ctx.store.current_movie().unwrap();
        assert_eq!(movie.id(), 42);
        assert_eq!(movie.reviews.len(), 2);
        assert_eq!(movie.reviews[1].comment, "Second");
        assert_eq!(movie.reviews[1].user.as_ref().unwrap().first_name, "Ann");

        update_review(&mut ctx, 1, &draft("Edited")).await.unwrap();
        assert_eq!(ctx.store.current_movie().unwrap().reviews[0].comment, "Edited");

        fake.clear();
        delete_review(&mut ctx, 1, 42).await.unwrap();
        let movie = ctx.store.current_movie().unwrap();
        assert_eq!(movie.id(), 42);
        assert_eq!(movie.reviews.len(), 1);
        assert_eq!(movie.reviews[0].id, 2);
        assert_eq!(
            &fake.requests()[..3],
            &["DELETE /reviews/id/1", "GET /3/movie/42", "GET /reviews/movieId/42"]
        );
    }

    #[actix_rt::test]
    async fn failed_review_write_does_not_refetch() {
        let fake = FakeTransport::new(|_| Err(testing::unavailable()));
        let (mut ctx, _cache) = context(&fake);
        assert!(add_review(&mut ctx, &draft("x")).await.is_err());
        assert_eq!(fake.requests(), vec!["POST /reviews/"]);
        assert!(ctx.store.current_movie().is_none());
    }
}
