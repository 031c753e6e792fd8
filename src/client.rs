//! HTTP client for the API, used as the `Backend` of the console controllers.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use std::{marker::PhantomData, time::Duration};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::{ErrorBody, FieldError},
    machine::Backend,
    models::{LoginRequest, LoginResponse, RefreshRequest},
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// 400 from the API, with the per-field details when it sent any.
    #[error("{message}")]
    Rejected {
        message: String,
        errors: Vec<FieldError>,
    },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
}

pub type ClientResult<T> = Result<T, ClientError>;

/// ApiClient
///
/// Base URL plus an optional bearer token and the refresh token that renews it.
/// Cheap to clone; resource clients share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    refresh_token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            refresh_token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Logs in and keeps the issued token for subsequent requests.
    pub async fn login(&mut self, email: &str, password: &str) -> ClientResult<LoginResponse> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.request(self.http.post(self.url("auth/login")).json(&body)).await?;
        let login: LoginResponse = response.json().await?;
        self.keep_tokens(&login);
        Ok(login)
    }

    /// Renews the bearer token with the refresh token kept from the last login.
    pub async fn refresh(&mut self) -> ClientResult<LoginResponse> {
        let body = RefreshRequest {
            refresh_token: self.refresh_token.clone().ok_or(ClientError::Unauthorized)?,
        };
        let response = self
            .http
            .post(self.url("auth/refresh"))
            .json(&body)
            .send()
            .await?;
        let login: LoginResponse = check_status(response).await?.json().await?;
        self.keep_tokens(&login);
        Ok(login)
    }

    fn keep_tokens(&mut self, login: &LoginResponse) {
        self.token = Some(login.token.clone());
        self.refresh_token = Some(login.refresh_token.clone());
    }

    /// A typed client for one collection, e.g. `resource::<Page, CreatePageRequest>("pages")`.
    pub fn resource<I, D>(&self, path: &str) -> ResourceClient<I, D> {
        ResourceClient {
            api: self.clone(),
            path: path.trim_matches('/').to_string(),
            _types: PhantomData,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn request(&self, mut req: RequestBuilder) -> ClientResult<Response> {
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let response = req.send().await?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await?;
    let (message, errors) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.message, body.errors),
        Err(_) => (text, Vec::new()),
    };
    tracing::debug!(status = status.as_u16(), %message, "API request rejected");

    Err(match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        StatusCode::FORBIDDEN => ClientError::Forbidden(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::BAD_REQUEST => ClientError::Rejected { message, errors },
        _ => ClientError::Server {
            status: status.as_u16(),
            message,
        },
    })
}

/// ResourceClient
///
/// CRUD over `/{path}`: list is `GET`, create `POST`, update `PUT /{id}`, delete
/// `DELETE /{id}`. `I` is the item read back, `D` the draft sent.
#[derive(Debug)]
pub struct ResourceClient<I, D> {
    api: ApiClient,
    path: String,
    _types: PhantomData<fn() -> (I, D)>,
}

impl<I, D> Clone for ResourceClient<I, D> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            path: self.path.clone(),
            _types: PhantomData,
        }
    }
}

impl<I, D> ResourceClient<I, D> {
    fn collection_url(&self) -> String {
        self.api.url(&self.path)
    }

    fn item_url(&self, id: Uuid) -> String {
        self.api.url(&format!("{}/{}", self.path, id))
    }
}

#[async_trait]
impl<I, D> Backend for ResourceClient<I, D>
where
    I: DeserializeOwned + Clone + Send + Sync,
    D: Serialize + Send + Sync,
{
    type Item = I;
    type Draft = D;
    type Error = ClientError;

    async fn list(&self) -> ClientResult<Vec<I>> {
        let response = self.api.request(self.api.http.get(self.collection_url())).await?;
        Ok(response.json().await?)
    }

    async fn create(&self, draft: &D) -> ClientResult<I> {
        let req = self.api.http.post(self.collection_url()).json(draft);
        Ok(self.api.request(req).await?.json().await?)
    }

    async fn update(&self, id: Uuid, draft: &D) -> ClientResult<I> {
        let req = self.api.http.put(self.item_url(id)).json(draft);
        Ok(self.api.request(req).await?.json().await?)
    }

    async fn delete(&self, id: Uuid) -> ClientResult<()> {
        self.api.request(self.api.http.delete(self.item_url(id))).await?;
        Ok(())
    }
}
