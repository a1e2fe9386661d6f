// ── Identity bootstrap ──
//
// Get-or-create for the node keypair and the administrative API
// credential. The private-key write is conditional so two nodes racing
// on an empty store converge on one identity; the follow-up writes
// (public key, encodings, metadata) still have a small window where a
// reader can see the private key alone. Any run that finds a stored
// private key fills in whichever of those are missing.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use ephemvpn_store::{Confidentiality, ParameterStore, PutOutcome};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::SecretString;
use tracing::{debug, info, warn};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::CoreError;
use crate::model::{Identity, KeyMetadata, Namespace};

/// Length in bytes of the random API credential.
const CREDENTIAL_BYTES: usize = 32;

/// Generate a fresh x25519 keypair in WireGuard encoding
/// (standard base64 of the 32-byte keys).
pub fn generate_keypair() -> (String, String) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    (
        STANDARD.encode(secret.to_bytes()),
        STANDARD.encode(public.as_bytes()),
    )
}

/// Derive the WireGuard public key for a base64 private key.
pub fn derive_public_key(private_key: &str) -> Result<String, CoreError> {
    let bytes = STANDARD
        .decode(private_key.trim())
        .map_err(|e| CoreError::KeyMaterial {
            message: format!("private key is not base64: {e}"),
        })?;
    let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| CoreError::KeyMaterial {
        message: format!("private key is {} bytes, expected 32", v.len()),
    })?;
    let secret = StaticSecret::from(bytes);
    Ok(STANDARD.encode(PublicKey::from(&secret).as_bytes()))
}

fn generate_credential() -> String {
    let mut bytes = [0u8; CREDENTIAL_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Provisions the node identity and API credential in the parameter store.
pub struct IdentityBootstrapper<'a> {
    store: &'a dyn ParameterStore,
    namespace: &'a Namespace,
}

impl<'a> IdentityBootstrapper<'a> {
    pub fn new(store: &'a dyn ParameterStore, namespace: &'a Namespace) -> Self {
        Self { store, namespace }
    }

    /// Return the stored identity, creating it on first run.
    ///
    /// A stored private key is used as-is. Store outages are fatal and are
    /// never mistaken for an empty store.
    pub async fn ensure_identity(&self) -> Result<Identity, CoreError> {
        let private_name = self.namespace.server_private_key();

        if let Some(private_key) = self.store.get_optional(&private_name).await? {
            debug!("node identity already provisioned");
            return self.adopt(private_key).await;
        }

        let (private_key, public_key) = generate_keypair();
        match self
            .store
            .put_if_absent(&private_name, &private_key, Confidentiality::Secret)
            .await?
        {
            PutOutcome::AlreadyExists => {
                info!("another node created the identity first, adopting it");
                let stored = self.store.get(&private_name).await?;
                self.adopt(stored).await
            }
            PutOutcome::Written => {
                let metadata = KeyMetadata::now();
                self.store
                    .put_binary(
                        &self.namespace.server_private_key_b64(),
                        private_key.as_bytes(),
                        Confidentiality::Secret,
                    )
                    .await?;
                self.store
                    .put(
                        &self.namespace.server_public_key(),
                        &public_key,
                        Confidentiality::Plain,
                    )
                    .await?;
                self.store
                    .put_binary(
                        &self.namespace.server_public_key_b64(),
                        public_key.as_bytes(),
                        Confidentiality::Plain,
                    )
                    .await?;
                self.store
                    .put(
                        &self.namespace.server_key_metadata(),
                        &metadata.to_string(),
                        Confidentiality::Plain,
                    )
                    .await?;
                info!(public_key = %public_key, "generated new node identity");
                Ok(Identity {
                    private_key: SecretString::from(private_key),
                    public_key,
                    metadata: Some(metadata),
                })
            }
        }
    }

    /// Build an identity around a stored private key, writing back any
    /// companion parameter a crashed or racing bootstrap left out.
    async fn adopt(&self, private_key: String) -> Result<Identity, CoreError> {
        self.fill_binary(
            &self.namespace.server_private_key_b64(),
            private_key.as_bytes(),
            Confidentiality::Secret,
        )
        .await?;

        let public_name = self.namespace.server_public_key();
        let public_key = match self.store.get_optional(&public_name).await? {
            Some(existing) => existing,
            None => {
                let derived = derive_public_key(&private_key)?;
                warn!("stored identity has no public key, writing derived key");
                self.store
                    .put(&public_name, &derived, Confidentiality::Plain)
                    .await?;
                derived
            }
        };
        self.fill_binary(
            &self.namespace.server_public_key_b64(),
            public_key.as_bytes(),
            Confidentiality::Plain,
        )
        .await?;

        let metadata_name = self.namespace.server_key_metadata();
        let raw = match self.store.get_optional(&metadata_name).await? {
            Some(raw) => raw,
            None => {
                let fresh = KeyMetadata::now().to_string();
                warn!("stored identity has no key metadata, recording it now");
                match self
                    .store
                    .put_if_absent(&metadata_name, &fresh, Confidentiality::Plain)
                    .await?
                {
                    PutOutcome::Written => fresh,
                    PutOutcome::AlreadyExists => self.store.get(&metadata_name).await?,
                }
            }
        };
        let metadata = raw
            .parse::<KeyMetadata>()
            .map_err(|e| warn!(error = %e, "ignoring unreadable key metadata"))
            .ok();

        Ok(Identity {
            private_key: SecretString::from(private_key),
            public_key,
            metadata,
        })
    }

    async fn fill_binary(
        &self,
        name: &str,
        value: &[u8],
        confidentiality: Confidentiality,
    ) -> Result<(), CoreError> {
        if self.store.get_optional(name).await?.is_none() {
            warn!(parameter = name, "identity parameter missing, writing it back");
            self.store.put_binary(name, value, confidentiality).await?;
        }
        Ok(())
    }

    /// Return the administrative API credential, creating it on first run.
    pub async fn ensure_api_credential(&self) -> Result<SecretString, CoreError> {
        let name = self.namespace.master_api_key();

        if let Some(existing) = self.store.get_optional(&name).await? {
            debug!("API credential already provisioned");
            return Ok(SecretString::from(existing));
        }

        let candidate = generate_credential();
        match self
            .store
            .put_if_absent(&name, &candidate, Confidentiality::Secret)
            .await?
        {
            PutOutcome::Written => {
                info!("generated new API credential");
                Ok(SecretString::from(candidate))
            }
            PutOutcome::AlreadyExists => Ok(SecretString::from(self.store.get(&name).await?)),
        }
    }
}
