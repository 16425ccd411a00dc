//! Ordered API keys with a single shared cursor that only moves forward.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, info};

use crate::{Error, Result};

/// The key a request is sent with, plus its position so a quota failure can name it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub index: usize,
    pub key: Arc<str>,
}

#[derive(Debug)]
struct Cursor {
    active: usize,
    exhausted: bool,
}

#[derive(Debug)]
pub struct KeyRotator {
    keys: Vec<Arc<str>>,
    cursor: Mutex<Cursor>,
}

impl KeyRotator {
    pub fn new(keys: Vec<String>) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::data_load("<credentials>", "no API keys given"));
        }
        Ok(Self {
            keys: keys.into_iter().map(Arc::<str>::from).collect(),
            cursor: Mutex::new(Cursor {
                active: 0,
                exhausted: false,
            }),
        })
    }

    /// Newline-delimited keys; surrounding whitespace and blank lines are ignored.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::data_load(path, e))?;
        let keys: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        if keys.is_empty() {
            return Err(Error::data_load(path, "no API keys found"));
        }
        Self::new(keys)
    }

    /// The active key, or `CredentialsExhausted` once the list has run out.
    pub fn current(&self) -> Result<Credential> {
        let cursor = self.lock();
        if cursor.exhausted {
            return Err(Error::CredentialsExhausted);
        }
        Ok(self.credential(cursor.active))
    }

    /// Advances to the next key. Past the last key the cursor stays put and the
    /// rotator is marked exhausted for the rest of the run.
    pub fn rotate(&self) -> Result<Credential> {
        let mut cursor = self.lock();
        self.advance(&mut cursor)
    }

    /// Like [`rotate`](Self::rotate), but only if `failed` is still the active key.
    /// Workers that hit the quota on a key someone else already replaced get the
    /// replacement instead of burning another key.
    pub fn rotate_from(&self, failed: usize) -> Result<Credential> {
        let mut cursor = self.lock();
        if cursor.exhausted {
            return Err(Error::CredentialsExhausted);
        }
        if cursor.active > failed {
            return Ok(self.credential(cursor.active));
        }
        self.advance(&mut cursor)
    }

    pub fn is_exhausted(&self) -> bool {
        self.lock().exhausted
    }

    pub fn active_index(&self) -> usize {
        self.lock().active
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn advance(&self, cursor: &mut Cursor) -> Result<Credential> {
        if cursor.exhausted {
            return Err(Error::CredentialsExhausted);
        }
        let next = cursor.active + 1;
        if next >= self.keys.len() {
            cursor.exhausted = true;
            error!(
                "[API KEY EXHAUSTED] {} is the last of {} keys",
                mask(&self.keys[cursor.active]),
                self.keys.len()
            );
            return Err(Error::CredentialsExhausted);
        }
        info!(
            "[API KEY ROTATE] {} -> {} ({}/{})",
            mask(&self.keys[cursor.active]),
            mask(&self.keys[next]),
            next + 1,
            self.keys.len()
        );
        cursor.active = next;
        Ok(self.credential(next))
    }

    fn credential(&self, index: usize) -> Credential {
        Credential {
            index,
            key: Arc::clone(&self.keys[index]),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps only the last four characters of a key for log output.
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("****{tail}")
}
