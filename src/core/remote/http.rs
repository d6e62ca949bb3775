//! REST client for the remote source
//!
//! Endpoints:
//! - `GET /api/projects?ids=..` - batch metadata
//! - `GET /api/projects/{name}` - single metadata
//! - `GET /api/pages/{name}/search/titles?followingId=..` - paginated listing;
//!   the next page's cursor comes back in the `X-following-id` header
//!
//! Error responses carry a JSON body `{ "name": "...", "message": "..." }`;
//! the name decides the [`RemoteError`] kind.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{COOKIE, USER_AGENT};
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use super::{CollectionMeta, Pages, RemoteError, RemotePage, RemoteSource};

const FOLLOWING_ID_HEADER: &str = "x-following-id";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ErrorBody {
    name: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ProjectList {
    projects: Vec<CollectionMeta>,
}

/// Remote source backed by the REST API
pub struct HttpSource {
    client: Client,
    base_url: Url,
    sid: Option<String>,
    user_agent: String,
}

impl HttpSource {
    /// Create a client for `base_url`, authenticating with the session id
    /// `sid` when given
    pub fn new(base_url: Url, sid: Option<String>, user_agent: &str) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            sid,
            user_agent: user_agent.to_string(),
        })
    }

    /// Build `<base>/api/<segments...>`, escaping each segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidResponse("base URL cannot have a path".into()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    /// Send a GET request and turn error responses into [`RemoteError`]s
    fn get(
        &self,
        url: Url,
        query: &[(&str, &str)],
        collection: &str,
    ) -> Result<Response, RemoteError> {
        debug!("GET {}", url);
        let mut request = self
            .client
            .get(url)
            .query(query)
            .header(USER_AGENT, &self.user_agent);
        if let Some(sid) = &self.sid {
            request = request.header(COOKIE, format!("connect.sid={}", sid));
        }

        let response = request.send().map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().unwrap_or_default();
        Err(match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => RemoteError::from_name(&body.name, collection, status.as_u16(), body.message),
            Err(_) => RemoteError::Http {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string(),
            },
        })
    }

    fn fetch_titles(
        &self,
        name: &str,
        following_id: Option<&str>,
    ) -> Result<(Vec<RemotePage>, Option<String>), RemoteError> {
        let url = self.endpoint(&["pages", name, "search", "titles"])?;
        let query: Vec<(&str, &str)> = following_id
            .map(|id| vec![("followingId", id)])
            .unwrap_or_default();

        let response = self.get(url, &query, name)?;
        let next = response
            .headers()
            .get(FOLLOWING_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from);
        let pages: Vec<RemotePage> = response
            .json()
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        Ok((pages, next))
    }
}

impl RemoteSource for HttpSource {
    fn list_collections(&self, ids: &[String]) -> Result<Vec<CollectionMeta>, RemoteError> {
        let url = self.endpoint(&["projects"])?;
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();

        let list: ProjectList = self
            .get(url, &query, "")?
            .json()
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        Ok(list.projects)
    }

    fn get_collection(&self, name: &str) -> Result<CollectionMeta, RemoteError> {
        let url = self.endpoint(&["projects", name])?;
        self.get(url, &[], name)?
            .json()
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    fn stream_links<'a>(&'a self, name: &str) -> Result<Pages<'a>, RemoteError> {
        Ok(Box::new(TitlePages {
            source: self,
            name: name.to_string(),
            following_id: None,
            done: false,
        }))
    }

    /// The title search endpoint pages by its own cursor, not by `updated`
    fn ordered_by_updated(&self) -> bool {
        false
    }
}

/// Iterator over the pages of a title search
struct TitlePages<'a> {
    source: &'a HttpSource,
    name: String,
    following_id: Option<String>,
    done: bool,
}

impl Iterator for TitlePages<'_> {
    type Item = Result<Vec<RemotePage>, RemoteError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self
            .source
            .fetch_titles(&self.name, self.following_id.as_deref())
        {
            Ok((pages, next)) => {
                self.done = next.is_none();
                self.following_id = next;
                Some(Ok(pages))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Aborted(e.to_string())
    } else {
        RemoteError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(base_url: &str) -> HttpSource {
        HttpSource::new(Url::parse(base_url).unwrap(), None, "linkcache-test").unwrap()
    }

    #[test]
    fn test_endpoint_escapes_names() {
        let source = source("https://scrapbox.io");
        let url = source
            .endpoint(&["pages", "my project", "search", "titles"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://scrapbox.io/api/pages/my%20project/search/titles"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let source = source("http://localhost:8080/mirror/");
        let url = source.endpoint(&["projects", "alpha"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/mirror/api/projects/alpha");
    }

    #[test]
    fn test_listing_is_not_ordered() {
        let source = source("https://scrapbox.io");
        assert!(!source.ordered_by_updated());
    }

    #[test]
    fn test_project_metadata_shape() {
        let json = r#"{
            "id": "5a1b",
            "name": "alpha",
            "displayName": "Alpha",
            "publicVisible": true,
            "isMember": false,
            "updated": 1700000000,
            "plan": "personal"
        }"#;
        let meta: CollectionMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.id, "5a1b");
        assert_eq!(meta.display_name, "Alpha");
        assert!(meta.public_visible);
        assert_eq!(meta.updated, 1_700_000_000);
    }
}
