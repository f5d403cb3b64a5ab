//! Bundle orchestration.
//!
//! Runs the build phase once, announces the handle, then generates every
//! output target concurrently. Results are collected in descriptor order, so
//! the slowest target never reorders the output.

use std::sync::Arc;

use futures::future::try_join_all;

use crate::Result;
use crate::bundler::Bundler;
use crate::events::{EventSender, StreamEvent};
use crate::file::{OutputFile, convert};
use crate::options::{BuildOptions, FileMetadata};

/// Build once and generate every configured output target.
///
/// Returns one batch of files per output descriptor, in descriptor order.
/// Any build or generation failure fails the whole operation and no files
/// are returned.
pub async fn run(
    bundler: &dyn Bundler,
    options: &BuildOptions,
    metadata: &FileMetadata,
    events: &EventSender,
) -> Result<Vec<Vec<OutputFile>>> {
    let handle = bundler.build(options).await?;
    tracing::debug!("Build phase complete");
    events.emit(StreamEvent::Bundle(Arc::clone(&handle)));

    let descriptors = options.outputs();
    tracing::debug!("Generating {} output target(s)", descriptors.len());

    let entry = options.entry_path();
    let generations = descriptors.iter().enumerate().map(|(index, descriptor)| {
        let handle = Arc::clone(&handle);
        let merged = options.with_output(descriptor);
        async move {
            let artifact = handle.generate(&merged).await?;
            tracing::trace!(
                target_index = index,
                files = artifact.len(),
                "Output target generated"
            );
            Ok::<_, crate::Error>(convert(artifact, metadata, entry, descriptor))
        }
    });

    try_join_all(generations).await
}
