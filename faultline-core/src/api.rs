pub mod envelope;

use bytes::Bytes;
use faultline_http::{HttpClient, HttpRequest, HttpResponse, Multipart};
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::{Credentials, ServiceConfig};
use crate::error::StepError;

use envelope::{ID_KEYS, LOCATOR_KEYS, USER_ID_KEYS};

pub type ResourceId = i64;

/// Successful answer of one call: the HTTP status it came with plus the decoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    pub status: u16,
    pub value: T,
}

impl<T> Reply<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        Reply {
            status: self.status,
            value: f(self.value),
        }
    }
}

/// A resource as the service describes it. Either field may be missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: Option<ResourceId>,
    pub locator: Option<String>,
}

impl Resource {
    #[must_use]
    pub fn from_value(v: &Value) -> Self {
        Self {
            id: envelope::id_field(v, &ID_KEYS),
            locator: envelope::str_field(v, &LOCATOR_KEYS),
        }
    }
}

/// One simulated client's session with the service: its own connection pool and token.
#[derive(Debug)]
pub struct ServiceApi {
    client: HttpClient,
    base_url: String,
    storage_url: String,
    timeout: Option<Duration>,
    token: Option<String>,
}

impl ServiceApi {
    #[must_use]
    pub fn new(cfg: &ServiceConfig) -> Self {
        Self {
            client: HttpClient::new(cfg.connect_timeout),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            storage_url: cfg.storage_url.trim_end_matches('/').to_string(),
            timeout: cfg.request_timeout,
            token: None,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, req: HttpRequest) -> HttpRequest {
        let req = req.timeout(self.timeout);
        match &self.token {
            Some(token) => req.bearer(token),
            None => req,
        }
    }

    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, StepError> {
        Ok(self.client.request(self.authorized(req)).await?)
    }

    async fn call(&self, req: HttpRequest) -> Result<Reply<Value>, StepError> {
        let res = self.send(req).await?;
        let value = envelope::decode(&res)?;
        Ok(Reply {
            status: res.status,
            value,
        })
    }

    /// Authenticate and keep the token for every later call.
    pub async fn login(&mut self, creds: &Credentials) -> Result<Reply<String>, StepError> {
        let req = HttpRequest::post_json(
            self.url("/user/login"),
            &json!({ "email": creds.email, "password": creds.password }),
        )?;
        let reply = self.call(req).await?;
        let Some(token) = envelope::token(&reply.value) else {
            return Err(StepError::protocol(reply.status, "login response carries no token"));
        };
        self.token = Some(token.clone());
        Ok(reply.map(|_| token))
    }

    pub async fn resource_detail(&self, id: ResourceId) -> Result<Reply<Resource>, StepError> {
        let reply = self
            .call(HttpRequest::get(self.url(&format!("/song/getSongDetail/{id}"))))
            .await?;
        if !reply.value.is_object() {
            return Err(StepError::protocol(reply.status, "resource detail is not an object"));
        }
        Ok(reply.map(|v| Resource::from_value(&v)))
    }

    pub async fn recommended(&self) -> Result<Reply<Vec<Resource>>, StepError> {
        let reply = self
            .call(HttpRequest::get(self.url("/song/getRecommendedSongs")))
            .await?;
        list(reply)
    }

    pub async fn user_id(&self) -> Result<Reply<i64>, StepError> {
        let reply = self
            .call(HttpRequest::get(self.url("/user/getUserInfo")))
            .await?;
        match envelope::id_field(&reply.value, &USER_ID_KEYS) {
            Some(id) => Ok(reply.map(|_| id)),
            None => Err(StepError::protocol(reply.status, "user info carries no user id")),
        }
    }

    /// First page of the user's own uploads, including ones pending moderation.
    pub async fn own_uploads(&self, user_id: i64) -> Result<Reply<Vec<Resource>>, StepError> {
        let url = self.url(&format!(
            "/song/getUserOriginalSongs/{user_id}?pageNum=1&pageSize=10&auditStatus=0"
        ));
        let reply = self.call(HttpRequest::get(url)).await?;
        list(reply)
    }

    pub async fn upload(&self, form: Multipart) -> Result<Reply<ResourceId>, StepError> {
        let req = form.into_request(self.url("/song/uploadOriginalSong"));
        let reply = self.call(req).await?;
        match envelope::created_id(&reply.value) {
            Some(id) => Ok(reply.map(|_| id)),
            None => Err(StepError::protocol(reply.status, "upload response carries no id")),
        }
    }

    pub async fn collect(&self, id: ResourceId) -> Result<Reply<()>, StepError> {
        let url = self.url(&format!("/favorite/collectSong?songId={id}"));
        let reply = self.call(HttpRequest::post(url, Bytes::new())).await?;
        Ok(reply.map(|_| ()))
    }

    pub async fn comment(&self, id: ResourceId, content: &str) -> Result<Reply<()>, StepError> {
        let req = HttpRequest::post_json(
            self.url("/comment/addSongComment"),
            &json!({ "songId": id, "content": content }),
        )?;
        let reply = self.call(req).await?;
        Ok(reply.map(|_| ()))
    }

    /// Absolute URL for a locator: `http(s)://` is taken verbatim, anything else is
    /// relative to the storage base.
    #[must_use]
    pub fn locator_url(&self, locator: &str) -> String {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            locator.to_string()
        } else {
            format!("{}/{}", self.storage_url, locator.trim_start_matches('/'))
        }
    }

    /// Fetch a locator from storage, optionally only its first `range` bytes.
    ///
    /// Storage is not behind the service's auth, so no token is sent.
    pub async fn download(
        &self,
        locator: &str,
        range: Option<u64>,
    ) -> Result<Reply<Bytes>, StepError> {
        let mut req = HttpRequest::get(self.locator_url(locator)).timeout(self.timeout);
        if let Some(len) = range.filter(|len| *len > 0) {
            req = req.range(0, len - 1);
        }
        let res = self.client.request(req).await?;
        if !res.is_success() {
            return Err(StepError::Http {
                status: res.status,
                body: res.body_snippet(100),
            });
        }
        Ok(Reply {
            status: res.status,
            value: res.body,
        })
    }
}

fn list(reply: Reply<Value>) -> Result<Reply<Vec<Resource>>, StepError> {
    let Some(items) = envelope::items(&reply.value) else {
        return Err(StepError::protocol(reply.status, "expected a list of resources"));
    };
    let resources = items.iter().map(Resource::from_value).collect();
    Ok(Reply {
        status: reply.status,
        value: resources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> ServiceApi {
        ServiceApi::new(&ServiceConfig {
            base_url: "http://svc:8080/".to_string(),
            storage_url: "http://store:9000/".to_string(),
            ..ServiceConfig::default()
        })
    }

    #[test]
    fn locators_resolve_against_storage() {
        let api = api();
        assert_eq!(
            api.locator_url("vibe-music-data/songs/a.mp3"),
            "http://store:9000/vibe-music-data/songs/a.mp3"
        );
        assert_eq!(api.locator_url("/x.mp3"), "http://store:9000/x.mp3");
        assert_eq!(
            api.locator_url("https://cdn.example.com/a.mp3"),
            "https://cdn.example.com/a.mp3"
        );
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(api().url("/user/login"), "http://svc:8080/user/login");
    }

    #[test]
    fn requests_carry_token_and_deadline_after_login() {
        let mut api = api();
        let anon = api.authorized(HttpRequest::get("http://svc/a"));
        assert!(anon.headers.iter().all(|(k, _)| k != "authorization"));
        assert_eq!(anon.timeout, ServiceConfig::default().request_timeout);

        api.token = Some("t0k".to_string());
        let authed = api.authorized(HttpRequest::get("http://svc/a"));
        assert!(
            authed
                .headers
                .iter()
                .any(|(k, v)| k == "authorization" && v == "Bearer t0k")
        );
    }

    #[test]
    fn resource_from_value_tolerates_missing_fields() {
        let r = Resource::from_value(&json!({"song_id": 3}));
        assert_eq!(r.id, Some(3));
        assert_eq!(r.locator, None);
    }
}
