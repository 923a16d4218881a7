//! Discovers the segment index of representations whose manifest entry does not carry one,
//! by reading the initialization and index ranges of the media resource.

mod executor;
pub(crate) mod sidx;
mod source;

pub use executor::{InlineExecutor, ProbeExecutor, TokioExecutor};
pub use source::{ByteStream, DataSource, HttpDataSource};

use std::{future::Future, sync::Arc};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    error::{OfflineError, OfflineResult},
    index::{ChunkIndex, RangedUri},
    manifest::Representation,
};

pub struct ContainerIndexProber<D> {
    data_source: Arc<D>,
    cancel: CancellationToken,
}

impl<D> ContainerIndexProber<D>
where
    D: DataSource,
{
    pub fn new(data_source: Arc<D>, cancel: CancellationToken) -> Self {
        Self {
            data_source,
            cancel,
        }
    }

    /// Builds the unit of work loading the chunk index of `representation` from `base_url`.
    ///
    /// The returned future owns everything it touches, so any [`ProbeExecutor`] can run it.
    /// It resolves to `Ok(None)` when the container has no index, and to
    /// [`OfflineError::Interrupted`] as soon as the cancellation token fires, never to a
    /// partial index.
    pub fn probe(
        &self,
        representation: &Representation,
        base_url: &Url,
    ) -> impl Future<Output = OfflineResult<Option<ChunkIndex>>> + Send + 'static {
        let data_source = self.data_source.clone();
        let cancel = self.cancel.clone();
        let base_url = base_url.clone();
        let initialization = representation.initialization_uri();
        let index = representation.index_uri();

        async move {
            if cancel.is_cancelled() {
                return Err(OfflineError::Interrupted);
            }

            let requests = match (initialization, index) {
                (Some(initialization), Some(index)) => match initialization.attempt_merge(&index) {
                    Some(merged) => vec![merged],
                    None => vec![initialization, index],
                },
                (Some(initialization), None) => vec![initialization],
                (None, Some(index)) => vec![index],
                (None, None) => return Ok(None),
            };

            for request in requests {
                let data = read_range(data_source.as_ref(), &cancel, &base_url, &request).await?;
                tracing::debug!(
                    "Read {} bytes of {} at {}",
                    data.len(),
                    base_url,
                    request.range.offset
                );
                if let Some(chunk_index) = sidx::find_chunk_index(&data, request.range.offset)? {
                    return Ok(Some(chunk_index));
                }
            }
            Ok(None)
        }
    }
}

async fn read_range<D>(
    data_source: &D,
    cancel: &CancellationToken,
    base_url: &Url,
    request: &RangedUri,
) -> OfflineResult<Bytes>
where
    D: DataSource,
{
    let url = request.resolve(base_url)?;
    let mut stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(OfflineError::Interrupted),
        stream = data_source.open(&url, request.byte_range()) => stream?,
    };

    let mut data = BytesMut::new();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OfflineError::Interrupted),
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else {
            break;
        };
        data.extend_from_slice(&chunk?);

        if let Some(length) = request.range.length {
            if data.len() as u64 >= length {
                data.truncate(length as usize);
                break;
            }
        }
    }
    Ok(data.freeze())
}
