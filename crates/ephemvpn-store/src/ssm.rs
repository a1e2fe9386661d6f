// AWS Systems Manager Parameter Store backend.
//
// Maps the SDK's typed service errors onto the crate taxonomy:
// `ParameterNotFound` → `NotFound`, `ParameterAlreadyExists` →
// `PutOutcome::AlreadyExists`, anything else → `Unavailable`.

use async_trait::async_trait;
use aws_sdk_ssm::Client;
use aws_sdk_ssm::error::DisplayErrorContext;
use aws_sdk_ssm::types::{ParameterStringFilter, ParameterType};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::store::{Confidentiality, ParameterStore, PutOutcome};

/// Page size for `DescribeParameters` (the API maximum).
const DESCRIBE_PAGE_SIZE: i32 = 50;

/// Connection settings for [`SsmStore::connect`].
#[derive(Debug, Clone)]
pub struct SsmConfig {
    /// AWS region, e.g. `us-east-1`.
    pub region: String,
    /// Endpoint override (LocalStack, VPC endpoint). `None` uses the default.
    pub endpoint: Option<Url>,
}

/// [`ParameterStore`] backed by AWS SSM.
#[derive(Debug, Clone)]
pub struct SsmStore {
    client: Client,
}

impl SsmStore {
    /// Build a client from the default AWS credential chain.
    pub async fn connect(config: &SsmConfig) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_ssm::config::Builder::from(&sdk_config);
        if let Some(ref endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint.as_str());
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Wrap a pre-built SDK client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn parameter_type(confidentiality: Confidentiality) -> ParameterType {
        match confidentiality {
            Confidentiality::Plain => ParameterType::String,
            Confidentiality::Secret => ParameterType::SecureString,
        }
    }
}

#[async_trait]
impl ParameterStore for SsmStore {
    async fn get(&self, name: &str) -> Result<String, Error> {
        debug!(name, "ssm GetParameter");

        let output = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_parameter_not_found())
                {
                    Error::NotFound {
                        name: name.to_owned(),
                    }
                } else {
                    Error::unavailable(name, DisplayErrorContext(&err).to_string())
                }
            })?;

        output
            .parameter()
            .and_then(|p| p.value())
            .map(str::to_owned)
            .ok_or_else(|| Error::EmptyValue {
                name: name.to_owned(),
            })
    }

    async fn put(
        &self,
        name: &str,
        value: &str,
        confidentiality: Confidentiality,
    ) -> Result<(), Error> {
        debug!(name, ?confidentiality, "ssm PutParameter (overwrite)");

        self.client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(Self::parameter_type(confidentiality))
            .overwrite(true)
            .send()
            .await
            .map_err(|err| Error::unavailable(name, DisplayErrorContext(&err).to_string()))?;
        Ok(())
    }

    async fn put_if_absent(
        &self,
        name: &str,
        value: &str,
        confidentiality: Confidentiality,
    ) -> Result<PutOutcome, Error> {
        debug!(name, ?confidentiality, "ssm PutParameter (if absent)");

        match self
            .client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(Self::parameter_type(confidentiality))
            .overwrite(false)
            .send()
            .await
        {
            Ok(_) => Ok(PutOutcome::Written),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_parameter_already_exists()) =>
            {
                Ok(PutOutcome::AlreadyExists)
            }
            Err(err) => Err(Error::unavailable(
                name,
                DisplayErrorContext(&err).to_string(),
            )),
        }
    }

    async fn list_names(&self, prefix: &str) -> Result<Vec<String>, Error> {
        debug!(prefix, "ssm DescribeParameters");

        let filter = ParameterStringFilter::builder()
            .key("Name")
            .option("BeginsWith")
            .values(prefix)
            .build()
            .map_err(|e| Error::unavailable(prefix, e.to_string()))?;

        let mut names = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .describe_parameters()
                .parameter_filters(filter.clone())
                .max_results(DESCRIBE_PAGE_SIZE);
            if let Some(ref token) = next_token {
                request = request.next_token(token);
            }

            let page = request
                .send()
                .await
                .map_err(|err| Error::unavailable(prefix, DisplayErrorContext(&err).to_string()))?;

            names.extend(
                page.parameters()
                    .iter()
                    .filter_map(|p| p.name())
                    .map(str::to_owned),
            );

            match page.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_owned()),
                _ => break,
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<(), Error> {
        debug!(name, "ssm DeleteParameter");

        match self.client.delete_parameter().name(name).send().await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_parameter_not_found()) =>
            {
                Ok(())
            }
            Err(err) => Err(Error::unavailable(
                name,
                DisplayErrorContext(&err).to_string(),
            )),
        }
    }
}
