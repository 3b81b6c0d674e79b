use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use crate::codec;
use crate::model::Value;
use crate::sdk::ClientConfig;
use crate::{Error, Result, ValueReader, ValueWriter};

const HEADER_KEY_ID: &str = "X-API-KEY-ID";
const HEADER_KEY: &str = "X-API-KEY";
const APPLICATION_JSON: &str = "application/json";

pub const GET_PATH: &str = "/service.Value/Get";
pub const CREATE_PATH: &str = "/service.Value/Create";
pub const UPDATE_PATH: &str = "/service.Value/Update";
pub const DELETE_PATH: &str = "/service.Value/Delete";

/// HTTP transport for the Edge value service.
///
/// Each method is a single POST; nothing is retried. Use it through a
/// [`crate::sdk::Session`] to get write serialization and timestamp handling.
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn call(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.config.endpoint.trim_end_matches('/'), path);

        let mut request = self.http.post(&url).header(CONTENT_TYPE, APPLICATION_JSON).body(body);
        if let Some(key_id) = &self.config.api_key_id {
            request = request.header(HEADER_KEY_ID, key_id);
        }
        if let Some(key) = &self.config.api_key {
            request = request.header(HEADER_KEY, key);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        debug!("{} {}: {}", path, status, String::from_utf8_lossy(&bytes));

        if status.is_client_error() || status.is_server_error() {
            return Err(Error::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ValueReader for Client {
    async fn get(&self, id: &str) -> Result<Value> {
        let body = codec::encode_id_request(id)?;
        let resp = match self.call(GET_PATH, body).await {
            Err(Error::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Err(Error::NotFound(id.to_string()));
            }
            other => other?,
        };
        Ok(codec::decode(&resp)?)
    }
}

#[async_trait]
impl ValueWriter for Client {
    async fn create(&self, value: &Value) -> Result<()> {
        let body = codec::encode(value)?;
        debug!("CreateValue {}", String::from_utf8_lossy(&body));
        self.call(CREATE_PATH, body).await?;
        Ok(())
    }

    async fn update(&self, value: &Value) -> Result<()> {
        let body = codec::encode(value)?;
        debug!("UpdateValue {}", String::from_utf8_lossy(&body));
        self.call(UPDATE_PATH, body).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let body = codec::encode_id_request(id)?;
        self.call(DELETE_PATH, body).await?;
        Ok(())
    }
}
