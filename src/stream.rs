//! Streaming OCR: yield each page as soon as the model answers.
//!
//! Pages are still processed one at a time, so items arrive in page order.
//! The stream ends after the last selected page; a failed page is yielded as
//! an `Err` item and does not end the stream. Nothing here applies
//! [`crate::config::FailurePolicy`]: the consumer decides whether to stop.

use crate::config::OcrConfig;
use crate::error::{OcrError, PageError};
use crate::extract::ocr_page;
use crate::output::{Document, OcrResult};
use crate::pipeline::client::InferenceClient;
use crate::pipeline::render::{self, PageImage, RenderOptions};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

/// A boxed stream of page outcomes.
pub type OcrStream = Pin<Box<dyn Stream<Item = Result<OcrResult, PageError>> + Send>>;

/// Start OCR on `document` and return a stream of per-page outcomes.
///
/// # Errors
/// Fails up front, before any page is produced, when the document cannot be
/// opened or the page selection is empty.
pub async fn ocr_stream(
    document: Document,
    config: &OcrConfig,
    client: Arc<dyn InferenceClient>,
) -> Result<OcrStream, OcrError> {
    info!("Starting streaming OCR: {}", document.name);
    let feed = render::spawn_rasterizer(document, RenderOptions::from_config(config)).await?;
    Ok(page_stream(feed.into_stream(), config.clone(), client))
}

fn page_stream<S>(pages: S, config: OcrConfig, client: Arc<dyn InferenceClient>) -> OcrStream
where
    S: Stream<Item = Result<PageImage, PageError>> + Send + 'static,
{
    let s = pages.then(move |page| {
        let config = config.clone();
        let client = Arc::clone(&client);
        async move {
            match page {
                Ok(page) => ocr_page(page, &config, client.as_ref()).await.outcome,
                Err(e) => Err(e),
            }
        }
    });
    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::extract::tests::{pages, ScriptedClient};

    #[tokio::test]
    async fn yields_every_page_in_order() {
        let client = Arc::new(ScriptedClient::default().with(
            2,
            Err(InferenceError::Status {
                status: 500,
                body: "oops".into(),
            }),
        ));
        let stream = page_stream(
            futures::stream::iter(pages(3)),
            OcrConfig::default(),
            client.clone(),
        );
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().text, "page 1");
        assert!(matches!(
            items[1],
            Err(PageError::HttpStatus { page: 2, status: 500, .. })
        ));
        assert_eq!(items[2].as_ref().unwrap().page_num, 3);
        assert_eq!(client.calls(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_requests() {
        let client = Arc::new(ScriptedClient::default());
        let mut stream = page_stream(
            futures::stream::iter(pages(5)),
            OcrConfig::default(),
            client.clone(),
        );
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.page_num, 1);
        drop(stream);
        assert_eq!(client.calls(), vec![1]);
    }
}
