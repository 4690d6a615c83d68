/// How locations reach the router. The server replays a single requested
/// url in memory; a browser page reads the address bar below `base`.
#[derive(Debug, Clone, PartialEq)]
pub enum History {
    Memory { entries: Vec<String> },
    Web { base: String },
}

impl History {
    pub fn for_context(is_server: bool) -> Self {
        if is_server {
            History::Memory {
                entries: vec!["/".to_owned()],
            }
        } else {
            History::Web {
                base: String::new(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Home,
    Movie(u64),
    News,
    About,
    Login,
    Signup,
    Profile,
    NotFound(String),
}

impl Route {
    pub fn resolve(path: &str) -> Route {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Route::Home,
            ["news"] => Route::News,
            ["about"] => Route::About,
            ["login"] => Route::Login,
            ["signup"] => Route::Signup,
            ["profile"] => Route::Profile,
            ["movie", id] => match id.parse() {
                Ok(id) => Route::Movie(id),
                Err(_) => Route::NotFound(path.to_owned()),
            },
            _ => Route::NotFound(path.to_owned()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Route::Home => "home",
            Route::Movie(_) => "movie",
            Route::News => "news",
            Route::About => "about",
            Route::Login => "login",
            Route::Signup => "signup",
            Route::Profile => "profile",
            Route::NotFound(_) => "not_found",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Home => "Home",
            Route::Movie(_) => "Movie",
            Route::News => "News",
            Route::About => "About",
            Route::Login => "Login",
            Route::Signup => "Sign up",
            Route::Profile => "Profile",
            Route::NotFound(_) => "Not found",
        }
    }

    pub fn template(&self) -> String {
        format!("{}.html", self.name())
    }

    pub fn is_found(&self) -> bool {
        !matches!(self, Route::NotFound(_))
    }
}

pub struct Router {
    history: History,
    pending: Option<String>,
    current: Option<Route>,
}

impl Router {
    pub fn new(history: History) -> Self {
        Router {
            history,
            pending: None,
            current: None,
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Queues a navigation; it takes effect on the next [`Router::resolve`].
    pub fn push(&mut self, location: &str) {
        if let History::Memory { entries } = &mut self.history {
            entries.push(location.to_owned());
        }
        self.pending = Some(location.to_owned());
    }

    pub fn resolve(&mut self) -> &Route {
        let location = self.pending.take().unwrap_or_else(|| self.initial_location());
        let route = Route::resolve(&self.path_of(&location));
        self.current.insert(route)
    }

    pub fn current(&self) -> Option<&Route> {
        self.current.as_ref()
    }

    fn initial_location(&self) -> String {
        match &self.history {
            History::Memory { entries } => entries.last().cloned().unwrap_or_else(|| "/".to_owned()),
            History::Web { base } => base.clone(),
        }
    }

    /// Drops query, fragment and the web history base.
    fn path_of(&self, location: &str) -> String {
        let end = location.find(|c: char| c == '?' || c == '#').unwrap_or(location.len());
        let path = &location[..end];
        match &self.history {
            History::Web { base } if !base.is_empty() => {
                path.strip_prefix(base.as_str()).unwrap_or(path).to_owned()
            }
            _ => path.to_owned(),
        }
    }
}
