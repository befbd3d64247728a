//! HTTPS fetcher talking to the peer daemon API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;

use super::{FetchRequest, FetchedFile, Fetcher};
use crate::config::FetchConfig;
use crate::error::FetchError;

/// Bearer-authenticated HTTPS GET of `/api/instance/path/{ns}/{kind}/{name}/resource/file`.
pub struct HttpFetcher {
    client: reqwest::Client,
    port: u16,
    token: Option<String>,
}

impl HttpFetcher {
    pub fn new(cfg: &FetchConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(cfg.accept_invalid_certs);
        if cfg.timeout > Duration::ZERO {
            builder = builder.timeout(cfg.timeout);
        }
        Ok(Self {
            client: builder.build()?,
            port: cfg.port,
            token: cfg.token.clone(),
        })
    }

    fn url(&self, req: &FetchRequest) -> String {
        format!(
            "https://{}:{}/api/instance/path/{}/{}/{}/resource/file",
            req.peer,
            self.port,
            req.path.namespace,
            req.path.kind.as_str(),
            req.path.name
        )
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedFile, FetchError> {
        let mut request = self
            .client
            .get(self.url(req))
            .query(&[("rid", req.rid.as_str()), ("name", req.name.as_str())]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let mut file = parse_headers(resp.headers())?;
        file.content = resp.bytes().await?.to_vec();
        Ok(file)
    }
}

/// Reads `Last-Modified`, `User`, `Group` and `Perm`.
///
/// Non-numeric owners are ignored; the file keeps the installer's ownership.
pub(crate) fn parse_headers(headers: &HeaderMap) -> Result<FetchedFile, FetchError> {
    let text = |name: &'static str| -> Result<Option<String>, FetchError> {
        match headers.get(name) {
            None => Ok(None),
            Some(v) => v
                .to_str()
                .map(|s| Some(s.trim().to_string()))
                .map_err(|_| FetchError::Header {
                    name,
                    value: String::from_utf8_lossy(v.as_bytes()).into_owned(),
                }),
        }
    };

    let mtime = match text("last-modified")? {
        Some(v) => Some(
            DateTime::parse_from_rfc2822(&v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| FetchError::Header {
                    name: "last-modified",
                    value: v,
                })?,
        ),
        None => None,
    };
    let owner = |name: &'static str| -> Result<Option<u32>, FetchError> {
        Ok(text(name)?.and_then(|v| match v.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::debug!(header = name, value = %v, "ignoring non-numeric owner");
                None
            }
        }))
    };
    let mode = match text("perm")? {
        Some(v) => Some(u32::from_str_radix(&v, 8).map_err(|_| FetchError::Header {
            name: "perm",
            value: v,
        })?),
        None => None,
    };

    Ok(FetchedFile {
        content: Vec::new(),
        mtime,
        uid: owner("user")?,
        gid: owner("group")?,
        mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::model::ObjectPath;
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;

    #[test]
    fn parses_metadata_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "last-modified",
            HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"),
        );
        headers.insert("user", HeaderValue::from_static("1000"));
        headers.insert("group", HeaderValue::from_static("wheel"));
        headers.insert("perm", HeaderValue::from_static("0640"));

        let file = parse_headers(&headers).unwrap();
        assert_eq!(
            file.mtime,
            Some(Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap())
        );
        assert_eq!(file.uid, Some(1000));
        assert_eq!(file.gid, None);
        assert_eq!(file.mode, Some(0o640));
    }

    #[test]
    fn rejects_bad_perm() {
        let mut headers = HeaderMap::new();
        headers.insert("perm", HeaderValue::from_static("rw-r--r--"));
        let err = parse_headers(&headers).unwrap_err();
        assert_eq!(err.as_label(), "fetch_header");
    }

    #[test]
    fn url_addresses_the_peer_api() {
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let req = FetchRequest {
            peer: "n2".into(),
            path: ObjectPath::svc("web"),
            rid: "fs#1".into(),
            name: "/etc/web.conf".into(),
            checksum: String::new(),
        };
        assert_eq!(
            fetcher.url(&req),
            "https://n2:1215/api/instance/path/root/svc/web/resource/file"
        );
    }
}
