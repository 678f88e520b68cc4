// GraphQL gateway client
//
// Wraps `reqwest::Client` with the gateway's query/mutation envelope and
// bearer-token header. Owns an `Authenticator` so the coordinator can treat
// the whole thing as one `VentilationApi`.

use std::sync::RwLock;

use serde_json::{Value, json};
use tracing::{debug, trace};
use url::Url;

use crate::api::{Parameter, VentilationApi};
use crate::auth::{AccessToken, Authenticator, Credentials};
use crate::error::Error;
use crate::transport::TransportConfig;

const ACCOUNT_DEVICES_QUERY: &str = "query GetAccountDevices { \
    GetAccountDevices { identifier name street zipcode city country \
    status { connectionStatus serialNumber model unitVersion } } }";

const DEVICE_STATUS_QUERY: &str = "query GetDeviceStatus($input: GetDeviceStatusInput!) { \
    GetDeviceStatus(input: $input) { id connectivity activeAlarms temperature \
    airflow humidity airQuality userMode modeRemainingTime \
    temperatures { oat sat setpoint } activeFunctions { heating cooling \
    defrosting ecoMode freeCooling } alarms { filter fire frost } \
    versions { type version } } }";

const WRITE_DATA_ITEMS_MUTATION: &str =
    "mutation WriteDataItems($input: WriteDataItemsInput!) { WriteDataItems(input: $input) }";

/// HTTP client for the SystemAIR Home Solutions gateway.
///
/// Every request carries the current access token in `x-access-token`.
/// The token is set by [`set_access_token`](VentilationApi::set_access_token)
/// or by a successful [`authenticate`](VentilationApi::authenticate).
pub struct SystemairClient {
    http: reqwest::Client,
    api_url: Url,
    auth: Authenticator,
    token: RwLock<Option<AccessToken>>,
}

impl SystemairClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(credentials: Credentials, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(
            http,
            transport.api_url.clone(),
            transport.auth_url.clone(),
            credentials,
        ))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        api_url: Url,
        token_url: Url,
        credentials: Credentials,
    ) -> Self {
        let auth = Authenticator::new(http.clone(), token_url, credentials);
        Self {
            http,
            api_url,
            auth,
            token: RwLock::new(None),
        }
    }

    /// The authenticator backing this client.
    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// The current token, if one has been set.
    pub fn access_token(&self) -> Option<AccessToken> {
        self.token.read().expect("token lock poisoned").clone()
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a query/mutation and return the full response body.
    ///
    /// GraphQL `errors` members are left in the body; callers decide
    /// whether they are fatal.
    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, Error> {
        let token = self.access_token().ok_or(Error::NotAuthenticated)?;

        trace!(url = %self.api_url, "POST graphql");

        let resp = self
            .http
            .post(self.api_url.clone())
            .header("x-access-token", token.expose())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// Extract `data.<field>`, failing on a GraphQL `errors` member.
    fn data_field(body: Value, field: &str) -> Result<Value, Error> {
        if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
            return Err(Error::Api {
                message: graphql_error_message(errors),
            });
        }
        match body.get("data").and_then(|d| d.get(field)) {
            Some(value) if !value.is_null() => Ok(value.clone()),
            _ => Err(Error::Deserialization {
                message: format!("response is missing data.{field}"),
                body: body.to_string(),
            }),
        }
    }
}

fn graphql_error_message(errors: &Value) -> String {
    match errors.as_array() {
        Some(list) => list
            .iter()
            .map(|e| e["message"].as_str().unwrap_or("unknown error"))
            .collect::<Vec<_>>()
            .join("; "),
        None => errors.to_string(),
    }
}

// ── VentilationApi ───────────────────────────────────────────────────

impl VentilationApi for SystemairClient {
    async fn authenticate(&self) -> Result<AccessToken, Error> {
        let token = self.auth.authenticate().await?;
        self.set_access_token(&token);
        Ok(token)
    }

    fn is_token_valid(&self) -> bool {
        self.auth.is_token_valid()
    }

    async fn refresh_token(&self) -> Result<AccessToken, Error> {
        self.auth.refresh().await
    }

    fn set_access_token(&self, token: &AccessToken) {
        *self.token.write().expect("token lock poisoned") = Some(token.clone());
    }

    async fn list_devices(&self) -> Result<Value, Error> {
        debug!("listing account devices");
        self.graphql(ACCOUNT_DEVICES_QUERY, json!({})).await
    }

    async fn fetch_status(&self, device_id: &str) -> Result<Value, Error> {
        let body = self
            .graphql(
                DEVICE_STATUS_QUERY,
                json!({ "input": { "deviceId": device_id } }),
            )
            .await?;
        Self::data_field(body, "GetDeviceStatus")
    }

    async fn send_command(
        &self,
        device_id: &str,
        parameter: Parameter,
        value: i64,
    ) -> Result<bool, Error> {
        debug!(device = device_id, %parameter, value, "writing data item");
        let body = self
            .graphql(
                WRITE_DATA_ITEMS_MUTATION,
                json!({
                    "input": {
                        "deviceId": device_id,
                        "dataItems": [{ "id": parameter.register(), "value": value }],
                    }
                }),
            )
            .await?;
        let accepted = Self::data_field(body, "WriteDataItems")?;
        Ok(accepted.as_bool().unwrap_or(false))
    }
}
