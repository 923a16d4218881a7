use std::future::Future;

use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use reqwest::{
    header::{HeaderMap, RANGE},
    Client, StatusCode,
};
use url::Url;

use crate::{
    error::{OfflineError, OfflineResult},
    range::ByteRange,
};

pub type ByteStream = BoxStream<'static, OfflineResult<Bytes>>;

/// Byte-range reads against media resources.
///
/// Shared by every index probe of a build, possibly from several tasks at once, so
/// implementations take care of their own synchronization.
pub trait DataSource: Send + Sync + 'static {
    /// Opens `url`, restricted to `range` when one is given.
    fn open(
        &self,
        url: &Url,
        range: Option<ByteRange>,
    ) -> impl Future<Output = OfflineResult<ByteStream>> + Send;
}

/// [`DataSource`] over HTTP(S).
#[derive(Debug, Clone, Default)]
pub struct HttpDataSource {
    client: Client,
    headers: HeaderMap,
}

impl HttpDataSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            headers: HeaderMap::new(),
        }
    }

    /// Headers sent with every read.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

impl DataSource for HttpDataSource {
    async fn open(&self, url: &Url, range: Option<ByteRange>) -> OfflineResult<ByteStream> {
        let mut request = self.client.get(url.clone()).headers(self.headers.clone());
        if let Some(range) = range {
            let Some(header) = range.to_http_range() else {
                return Ok(futures::stream::empty().boxed());
            };
            request = request.header(RANGE, header);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!("Reading {url} failed with {status}");
            return Err(OfflineError::HttpError(status));
        }

        // A server ignoring the Range header sends the whole resource from byte 0
        let ignored_range = response.status() != StatusCode::PARTIAL_CONTENT;
        let stream = response.bytes_stream().map_err(OfflineError::from);
        let mut to_skip = match range {
            Some(range) if range.offset > 0 && ignored_range => {
                tracing::debug!("{url} ignored the byte range, skipping {} bytes", range.offset);
                range.offset
            }
            _ => 0,
        };
        if to_skip == 0 {
            return Ok(stream.boxed());
        }

        Ok(stream
            .map_ok(move |chunk| {
                let skip = to_skip.min(chunk.len() as u64);
                to_skip -= skip;
                chunk.slice(skip as usize..)
            })
            .try_filter(|chunk| futures::future::ready(!chunk.is_empty()))
            .boxed())
    }
}
