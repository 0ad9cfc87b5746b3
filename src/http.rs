//! Outbound HTTP: resource-server configuration discovery and public-key publication.
//!
//! The payload types are always available so the endpoint adapter can accept and produce
//! them; the reqwest-backed fetchers require the `reqwest` feature.

// crates.io
#[cfg(feature = "reqwest")] use reqwest::redirect::Policy;
#[cfg(feature = "reqwest")] use serde::de::DeserializeOwned;
// self
use crate::_prelude::*;
#[cfg(feature = "reqwest")]
use crate::{
	codec::{KeyFuture, PublicKeySource},
	error::{ConfigError, TransportError},
};

/// Configuration a resource server publishes at `<resource>/config`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
	/// Broker the resource server trusts to mint its access tokens.
	#[serde(default)]
	pub middlecat_url: Option<String>,
	/// Remaining fields, kept verbatim.
	#[serde(flatten)]
	pub extra: BTreeMap<String, serde_json::Value>,
}
impl ResourceConfig {
	/// Returns `true` when the declared trust anchor is `issuer` (trailing slashes ignored).
	pub fn trusts(&self, issuer: &str) -> bool {
		self.middlecat_url
			.as_deref()
			.is_some_and(|url| url.trim_end_matches('/') == issuer.trim_end_matches('/'))
	}
}

/// The broker's public configuration document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfiguration {
	/// PEM-encoded RSA public key resource servers verify access tokens with.
	pub public_key: String,
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Redirects are not followed: a resource server's configuration must be served at the URL
/// it is registered under.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds a client that never follows redirects.
	pub fn new() -> Result<Self, ConfigError> {
		Ok(Self(ReqwestClient::builder().redirect(Policy::none()).build()?))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Fetches `<resource>/config`. Non-success statuses yield `Ok(None)`.
	pub async fn fetch_resource_config(&self, resource: &str) -> Result<Option<ResourceConfig>> {
		let url = format!("{}/config", resource.trim_end_matches('/'));

		match self.get_json(&url).await {
			Ok(config) => Ok(Some(config)),
			Err(Error::Transport(TransportError::UnexpectedStatus { .. })) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Fetches the broker configuration document from `url`.
	pub async fn fetch_broker_configuration(&self, url: &str) -> Result<BrokerConfiguration> {
		self.get_json(url).await
	}

	async fn get_json<T>(&self, url: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let response =
			self.0.get(url).send().await.map_err(|e| TransportError::network(url, e))?;
		let status = response.status();

		if !status.is_success() {
			return Err(TransportError::UnexpectedStatus { url: url.into(), status: status.as_u16() }
				.into());
		}

		let bytes = response.bytes().await.map_err(|e| TransportError::network(url, e))?;
		let mut de = serde_json::Deserializer::from_slice(&bytes);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| TransportError::Decode { url: url.into(), source }.into())
	}
}

/// [`PublicKeySource`] that reads `public_key` from the broker's configuration document.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct BrokerKeySource {
	client: ReqwestHttpClient,
	url: String,
}
#[cfg(feature = "reqwest")]
impl BrokerKeySource {
	/// Path of the configuration document relative to the broker origin.
	pub const CONFIGURATION_PATH: &'static str = "/api/configuration";

	/// Points the source at the broker whose origin is `issuer`.
	pub fn new(client: ReqwestHttpClient, issuer: &str) -> Self {
		let url = format!("{}{}", issuer.trim_end_matches('/'), Self::CONFIGURATION_PATH);

		Self { client, url }
	}

	/// Configuration document URL.
	pub fn url(&self) -> &str {
		&self.url
	}
}
#[cfg(feature = "reqwest")]
impl PublicKeySource for BrokerKeySource {
	fn fetch_public_key(&self) -> KeyFuture<'_> {
		Box::pin(async move {
			let configuration = self.client.fetch_broker_configuration(&self.url).await?;

			Ok(configuration.public_key)
		})
	}
}
