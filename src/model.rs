use serde::{de, Deserialize, Deserializer, Serialize};

/// One entry of the catalog listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MovieSummary {
    #[serde(deserialize_with = "numeric_id")]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<u32>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub vote_average: f64,
}

impl MovieSummary {
    pub fn genre_names(&self) -> Vec<&'static str> {
        self.genre_ids.iter().filter_map(|id| genre_name(*id)).collect()
    }

    /// Year part of the release date, if the catalog had one.
    pub fn release_year(&self) -> Option<&str> {
        self.release_date
            .as_deref()
            .and_then(|date| date.get(0..4))
            .filter(|year| year.chars().all(|c| c.is_ascii_digit()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Genre {
    pub id: u32,
    #[serde(default)]
    pub name: String,
}

/// A movie with its detail fields and the reviews attached when it was fetched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MovieDetail {
    #[serde(flatten)]
    pub summary: MovieSummary,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

impl MovieDetail {
    pub fn id(&self) -> u64 {
        self.summary.id
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl UserRef {
    /// Stand-in for an author that could not be resolved.
    pub fn unknown(id: &str) -> Self {
        UserRef {
            id: id.to_owned(),
            first_name: "Unknown".to_owned(),
            last_name: "User".to_owned(),
        }
    }
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        UserRef {
            id: user.id.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(deserialize_with = "numeric_id")]
    pub id: u64,
    #[serde(default, deserialize_with = "numeric_id")]
    pub movie_id: u64,
    #[serde(deserialize_with = "string_id")]
    pub user_id: String,
    #[serde(default, deserialize_with = "rating")]
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub user: Option<UserRef>,
}

/// Body of a review create or update call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDraft {
    pub movie_id: u64,
    pub user_id: String,
    pub rating: u8,
    pub comment: String,
}

/// A user as it may be held by the store. Never carries a password.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// A user as stored by the user service, password included.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl UserRecord {
    pub fn without_password(self) -> User {
        User {
            id: self.id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
        }
    }
}

/// Signup form and the body of the add-user call.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Profile changes submitted by a signed-in user.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProfileChanges {
    pub first_name: String,
    pub last_name: String,
}

pub fn genre_name(id: u32) -> Option<&'static str> {
    Some(match id {
        28 => "Action",
        12 => "Adventure",
        16 => "Animation",
        35 => "Comedy",
        80 => "Crime",
        99 => "Documentary",
        18 => "Drama",
        10751 => "Family",
        14 => "Fantasy",
        36 => "History",
        27 => "Horror",
        10402 => "Music",
        9648 => "Mystery",
        10749 => "Romance",
        878 => "Science Fiction",
        10770 => "TV Movie",
        53 => "Thriller",
        10752 => "War",
        37 => "Western",
        10759 => "Action & Adventure",
        10762 => "Kids",
        10763 => "News",
        10764 => "Reality",
        10765 => "Sci-Fi & Fantasy",
        10766 => "Soap",
        10767 => "Talk",
        10768 => "War & Politics",
        _ => return None,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

// The review and user services answer with numbers or numeric strings
// depending on the column, so ids are accepted in both shapes.
fn numeric_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match RawId::deserialize(deserializer)? {
        RawId::Number(n) => Ok(n),
        RawId::Text(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

fn rating<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let rating = numeric_id(deserializer)?;
    u8::try_from(rating).map_err(de::Error::custom)
}

fn string_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}
