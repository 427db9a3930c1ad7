//! A credential jar backed by a local JSON file

use std::{collections::HashMap, io, path::PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{fs::OpenOptions, sync::Mutex};

use super::CredentialJar;
use crate::clock::{Clock, System, UnixTime};
use crate::config::CookieOptions;
use crate::error::BoxError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct JarContents {
    #[serde(default)]
    cookies: HashMap<String, StoredCookie>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCookie {
    value: String,
    path: String,
    expires: UnixTime,
}

/// A credential jar persisted to a local file
///
/// Every operation reads the file afresh, so several processes (or tabs)
/// pointed at the same path observe each other's writes.
#[derive(Debug)]
pub struct FileCookieJar<C = System> {
    path: PathBuf,
    lock: Mutex<()>,
    clock: C,
}

impl FileCookieJar<System> {
    /// Constructs a new file jar
    pub fn new(path: PathBuf) -> Self {
        Self::with_clock(path, System)
    }
}

impl<C> FileCookieJar<C> {
    /// Constructs a new file jar using the given clock
    pub fn with_clock(path: PathBuf, clock: C) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
            clock,
        }
    }

    async fn read_contents(&self) -> Result<JarContents, io::Error> {
        use tokio::io::AsyncReadExt;

        let mut file = match OpenOptions::new().read(true).open(&self.path).await {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(JarContents::default())
            }
            Err(error) => return Err(error),
        };
        let mut data = String::new();
        file.read_to_string(&mut data).await?;
        if data.trim().is_empty() {
            return Ok(JarContents::default());
        }
        let contents = serde_json::from_str(&data)?;
        Ok(contents)
    }

    async fn write_contents(&self, contents: &JarContents) -> Result<(), io::Error> {
        use tokio::io::AsyncWriteExt;

        let mut file_opts = OpenOptions::new();

        file_opts.create(true).truncate(true).write(true);

        #[cfg(unix)]
        file_opts.mode(0o600);

        let mut file = file_opts.open(&self.path).await?;
        let data = serde_json::to_string_pretty(contents)?;
        file.write_all(data.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> CredentialJar for FileCookieJar<C> {
    async fn get(&self, key: &str) -> Result<Option<String>, BoxError> {
        let _guard = self.lock.lock().await;
        let contents = self.read_contents().await?;
        let now = self.clock.now();
        Ok(contents
            .cookies
            .get(key)
            .filter(|cookie| now < cookie.expires)
            .map(|cookie| cookie.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, options: &CookieOptions) -> Result<(), BoxError> {
        let _guard = self.lock.lock().await;
        let mut contents = self.read_contents().await?;
        let now = self.clock.now();
        contents.cookies.retain(|_, cookie| now < cookie.expires);
        contents.cookies.insert(
            key.to_owned(),
            StoredCookie {
                value: value.to_owned(),
                path: options.path.clone(),
                expires: now + options.max_age,
            },
        );
        self.write_contents(&contents).await?;
        tracing::trace!(path = %self.path.display(), key, "wrote credential to file");
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), BoxError> {
        let _guard = self.lock.lock().await;
        let mut contents = self.read_contents().await?;
        if contents.cookies.remove(key).is_some() {
            self.write_contents(&contents).await?;
        }
        Ok(())
    }
}
