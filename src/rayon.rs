//! Parallel frame rendering.
//!
//! This module provides [`parallel_render_frames`] which distributes frame
//! decoding, overlay drawing and PNG encoding across threads using
//! [`rayon`](::rayon). Each frame is written under its position-derived name,
//! so the encoder sees the same input whichever thread finishes first.
//!
//! The pipeline switches to this path automatically when the `rayon`
//! feature is enabled; this module contains only the internal
//! implementation.

use std::sync::{Arc, Mutex};

use ::rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};

use crate::configuration::RenderOptions;
use crate::error::RenderError;
use crate::pipeline::FramePipeline;

/// Render every frame of the pipeline's sequence on the rayon pool.
///
/// All frames are attempted unless cancelled; the error reported is the
/// first one in sequence order.
pub(crate) fn parallel_render_frames(
    pipeline: &FramePipeline<'_>,
    options: &RenderOptions,
) -> Result<usize, RenderError> {
    let entries = pipeline.sequence().entries();
    let tracker = Mutex::new(pipeline.tracker(Arc::clone(&options.progress)));

    let results: Vec<Result<(), RenderError>> = entries
        .par_iter()
        .enumerate()
        .map(|(position, entry)| {
            if options.is_cancelled() {
                return Err(RenderError::Cancelled);
            }
            pipeline.render_frame(position, entry)?;
            if let Ok(mut tracker) = tracker.lock() {
                tracker.advance(Some(entry.index));
            }
            Ok(())
        })
        .collect();

    results.into_iter().collect::<Result<Vec<()>, RenderError>>()?;
    Ok(entries.len())
}
