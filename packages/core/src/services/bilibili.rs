use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;

use crate::error::AppError;
use crate::fetcher::{FetchError, FetchResult, MetricsFetcher};
use crate::types::{StatCounters, VideoInfo, VideoStat};

pub const DEFAULT_API_URL: &str = "https://api.bilibili.com";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REFERER: &str = "https://www.bilibili.com";

/// Shared bilibili web API client. Built once at startup; clones share
/// the underlying connection pool.
#[derive(Clone)]
pub struct BilibiliClient {
    base_url: String,
    http: Client,
}

impl BilibiliClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(BROWSER_USER_AGENT),
        );
        headers.insert(header::REFERER, header::HeaderValue::from_static(REFERER));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Config(format!("cannot build HTTP client: {}", err)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Deserialize)]
struct ViewResponse {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<ViewData>,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    title: String,
    pic: String,
    #[serde(default)]
    desc: String,
    owner: ViewOwner,
    stat: StatCounters,
}

#[derive(Debug, Deserialize)]
struct ViewOwner {
    name: String,
}

impl BilibiliClient {
    /// `GET /x/web-interface/view?bvid=...`, which carries both the info
    /// snapshot and the live counters.
    async fn fetch_view(&self, bvid: &str) -> FetchResult<ViewData> {
        let url = format!("{}/x/web-interface/view", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("bvid", bvid)])
            .send()
            .await
            .map_err(|err| FetchError::Network {
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Network {
                message: format!("bilibili returned HTTP {}", response.status()),
            });
        }

        let body = response
            .json::<ViewResponse>()
            .await
            .map_err(|err| FetchError::Format {
                message: format!("failed to parse view response: {}", err),
            })?;

        if body.code != 0 {
            return Err(FetchError::Upstream {
                code: body.code,
                message: body.message,
            });
        }

        body.data.ok_or_else(|| FetchError::Format {
            message: "view response has no data".to_string(),
        })
    }
}

#[async_trait]
impl MetricsFetcher for BilibiliClient {
    async fn fetch_info(&self, bvid: &str) -> FetchResult<VideoInfo> {
        let view = self.fetch_view(bvid).await?;
        Ok(VideoInfo {
            bvid: bvid.to_string(),
            title: view.title,
            pic: view.pic.replace("http://", "https://"),
            owner_name: view.owner.name,
            desc: view.desc,
        })
    }

    async fn fetch_stat(&self, bvid: &str) -> FetchResult<VideoStat> {
        let view = self.fetch_view(bvid).await?;
        Ok(VideoStat::captured_now(bvid, view.stat))
    }

    fn provider_name(&self) -> &str {
        "bilibili"
    }
}
