// Store contract shared by every backend.
//
// String values in, string values out. Binary payloads are carried as
// standard base64 on top of that.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::Error;

/// How a parameter is stored at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidentiality {
    /// Stored as plain text (SSM `String`).
    Plain,
    /// Encrypted at rest, decrypted on read (SSM `SecureString`).
    Secret,
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The value was written.
    Written,
    /// A value already existed; nothing was written.
    AlreadyExists,
}

/// Typed get/put access to a namespaced key-value store.
///
/// Every call is a remote round trip with no retries; callers decide
/// what to do with [`Error::Unavailable`].
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Read a parameter value. Secrets are returned decrypted.
    async fn get(&self, name: &str) -> Result<String, Error>;

    /// Write a parameter, overwriting any existing value.
    async fn put(
        &self,
        name: &str,
        value: &str,
        confidentiality: Confidentiality,
    ) -> Result<(), Error>;

    /// Write a parameter only if it does not exist yet.
    async fn put_if_absent(
        &self,
        name: &str,
        value: &str,
        confidentiality: Confidentiality,
    ) -> Result<PutOutcome, Error>;

    /// All parameter names starting with `prefix`, sorted.
    async fn list_names(&self, prefix: &str) -> Result<Vec<String>, Error>;

    /// Delete a parameter. Deleting a missing parameter is not an error.
    async fn delete(&self, name: &str) -> Result<(), Error>;

    /// Like [`get`](Self::get), but maps `NotFound` to `None`.
    async fn get_optional(&self, name: &str) -> Result<Option<String>, Error> {
        match self.get(name).await {
            Ok(value) => Ok(Some(value)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read a base64-encoded parameter and decode it.
    async fn get_binary(&self, name: &str) -> Result<Vec<u8>, Error> {
        let text = self.get(name).await?;
        STANDARD
            .decode(text.trim())
            .map_err(|e| Error::Encoding {
                name: name.to_owned(),
                message: e.to_string(),
            })
    }

    /// Encode `value` as base64 and write it.
    async fn put_binary(
        &self,
        name: &str,
        value: &[u8],
        confidentiality: Confidentiality,
    ) -> Result<(), Error> {
        let encoded = STANDARD.encode(value);
        self.put(name, &encoded, confidentiality).await
    }
}
