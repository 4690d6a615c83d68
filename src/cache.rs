use thiserror::Error;

pub const CACHE_MOVIES: &str = "cache-movies";
pub const CACHE_CURRENT_MOVIE: &str = "cache-current-movie";
pub const CACHE_CURRENT_USER: &str = "cache-current-user";

const CACHE: &'static [u8] = b"cache";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },
}

/// String key/value store scoped to one browser origin.
pub trait DurableCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Durable cache kept in a sled tree, with keys prefixed by the origin id.
#[derive(Clone)]
pub struct SledCache {
    tree: sled::Tree,
    prefix: Vec<u8>,
    quota: usize,
}

impl SledCache {
    pub fn open(db: &sled::Db, origin: &str, quota: usize) -> sled::Result<Self> {
        let mut prefix = origin.as_bytes().to_vec();
        prefix.push(b'/');
        Ok(SledCache {
            tree: db.open_tree(CACHE)?,
            prefix,
            quota,
        })
    }

    fn full_key(&self, key: &str) -> Vec<u8> {
        let mut full = self.prefix.clone();
        full.extend_from_slice(key.as_bytes());
        full
    }

    /// Bytes used by this origin, not counting `skip`.
    fn usage_without(&self, skip: &[u8]) -> sled::Result<usize> {
        let mut used = 0;
        for entry in self.tree.scan_prefix(&self.prefix) {
            let (key, value) = entry?;
            if key.as_ref() != skip {
                used += key.len() - self.prefix.len() + value.len();
            }
        }
        Ok(used)
    }
}

impl DurableCache for SledCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .tree
            .get(self.full_key(key))?
            .map(|value| String::from_utf8_lossy(&value).into_owned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let full_key = self.full_key(key);
        let needed = self.usage_without(&full_key)? + key.len() + value.len();
        if needed > self.quota {
            return Err(CacheError::QuotaExceeded {
                needed,
                quota: self.quota,
            });
        }
        self.tree.insert(full_key, value.as_bytes())?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.tree.remove(self.full_key(key))?;
        Ok(())
    }
}
