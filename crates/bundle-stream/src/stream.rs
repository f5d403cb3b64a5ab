//! The stream entry point.
//!
//! [`bundle_stream`] returns immediately with a [`BundleStream`]; the work
//! happens on a spawned tokio task. Files arrive only after every output
//! target generated successfully. A failure anywhere ends the stream with a
//! single `Err` item and no files.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::bundler::Bundler;
use crate::eval;
use crate::events::{EventReceiver, EventSender};
use crate::file::OutputFile;
use crate::options::{StreamOptions, assemble_options};
use crate::orchestrator;
use crate::{Error, Result};

/// Files produced by one invocation, plus its lifecycle events.
#[derive(Debug)]
pub struct BundleStream {
    files: UnboundedReceiverStream<Result<OutputFile>>,
    events: Option<EventReceiver>,
}

impl BundleStream {
    /// Take the event receiver. Returns `None` after the first call.
    ///
    /// Events are buffered, so they can be read after the file stream ends.
    pub fn take_events(&mut self) -> Option<EventReceiver> {
        self.events.take()
    }

    /// Drain the stream, stopping at the first error.
    pub async fn into_files(mut self) -> Result<Vec<OutputFile>> {
        let mut files = Vec::new();
        while let Some(file) = self.files.next().await {
            files.push(file?);
        }
        Ok(files)
    }
}

impl Stream for BundleStream {
    type Item = Result<OutputFile>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.files).poll_next(cx)
    }
}

/// Start one bundling invocation.
///
/// Accepts [`StreamOptions`] or anything convertible into it; a path or
/// string is shorthand for a config file.
///
/// # Panics
///
/// Must be called from within a tokio runtime.
pub fn bundle_stream(options: impl Into<StreamOptions>) -> BundleStream {
    let options = options.into();
    let (file_tx, file_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = EventSender::channel();

    tokio::spawn(async move {
        // A panicking bundler or evaluator must still terminate the stream.
        let result = match tokio::spawn(execute(options, events_tx)).await {
            Ok(result) => result,
            Err(join_err) => Err(Error::TaskFailed(join_err.to_string())),
        };

        match result {
            Ok(batches) => {
                for file in batches.into_iter().flatten() {
                    tracing::trace!("pushing {}", file.path().display());
                    if file_tx.send(Ok(file)).is_err() {
                        tracing::debug!("stream dropped before all files were delivered");
                        break;
                    }
                }
            }
            Err(err) => {
                tracing::debug!("bundle stream failed: {}", err);
                let _ = file_tx.send(Err(err));
            }
        }
    });

    BundleStream {
        files: UnboundedReceiverStream::new(file_rx),
        events: Some(events_rx),
    }
}

async fn execute(options: StreamOptions, events: EventSender) -> Result<Vec<Vec<OutputFile>>> {
    let StreamOptions {
        bundler,
        evaluator,
        file_metadata,
        config,
        build,
    } = options;

    let bundler = bundler.or_else(default_bundler).ok_or_else(|| {
        Error::InvalidConfig(
            "no bundler available; enable the `rolldown` feature or supply one".to_string(),
        )
    })?;
    let evaluator = evaluator.or_else(eval::default_evaluator);

    let build = assemble_options(
        config.as_deref(),
        build,
        bundler.as_ref(),
        evaluator,
        &events,
    )
    .await?;

    orchestrator::run(bundler.as_ref(), &build, &file_metadata, &events).await
}

fn default_bundler() -> Option<Arc<dyn Bundler>> {
    #[cfg(feature = "rolldown")]
    {
        Some(Arc::new(crate::rolldown_backend::RolldownBundler))
    }

    #[cfg(not(feature = "rolldown"))]
    {
        None
    }
}
