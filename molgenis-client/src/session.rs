//! The authenticated session shared by every call of a client.

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::error::{Error, Result};

/// Header carrying the session token.
pub const TOKEN_HEADER: &str = "x-molgenis-token";

#[derive(Debug, Clone)]
pub struct Session {
    api_url: Url,
    headers: HeaderMap,
    pub(crate) verbose: bool,
    pub(crate) warnings: bool,
    pub(crate) added_rows: u64,
    pub(crate) last_added_id: Option<String>,
}

impl Session {
    pub(crate) fn new(api_url: Url, token: &str, verbose: bool, warnings: bool) -> Result<Self> {
        let mut headers = login_headers();
        headers.insert(
            HeaderName::from_static(TOKEN_HEADER),
            HeaderValue::from_str(token)?,
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );

        Ok(Self {
            api_url,
            headers,
            verbose,
            warnings,
            added_rows: 0,
            last_added_id: None,
        })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Headers attached to every authenticated request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Headers for a multipart upload; the transport sets the content type itself.
    pub(crate) fn upload_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        headers.remove(header::CONTENT_TYPE);
        headers
    }

    /// `api_url` extended by `segments`, each percent-encoded as a single path segment.
    pub(crate) fn endpoint(&self, segments: &[&str], trailing_slash: bool) -> Result<Url> {
        endpoint(&self.api_url, segments, trailing_slash)
    }
}

/// Headers of the unauthenticated login call.
pub(crate) fn login_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers
}

pub(crate) fn endpoint(api_url: &Url, segments: &[&str], trailing_slash: bool) -> Result<Url> {
    let mut url = api_url.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| Error::InvalidUrl(format!("{} cannot be a base", api_url)))?;
        // NB: the api url ends in a slash, which shows up as an empty last segment
        path.pop_if_empty();
        path.extend(segments);
        if trailing_slash {
            path.push("");
        }
    }
    Ok(url)
}
