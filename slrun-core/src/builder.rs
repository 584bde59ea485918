// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Image builder.
//!
//! Replaces a function's image: best-effort removal of the previous image
//! under the same tag, then a build from the packaged source tree.

use std::io;
use std::time::Instant;

use crate::engine::ContainerEngine;
use crate::error::BuildError;
use crate::packager::BuildContext;
use crate::types::{FunctionId, ImageTag};
use crate::FunctionConfig;

/// Builds function images through a container engine.
pub struct ImageBuilder<'a> {
    engine: &'a dyn ContainerEngine,
    image_prefix: &'a str,
}

impl<'a> ImageBuilder<'a> {
    pub fn new(engine: &'a dyn ContainerEngine, image_prefix: &'a str) -> Self {
        Self {
            engine,
            image_prefix,
        }
    }

    /// Image tag this builder targets for a function.
    pub fn image_tag(&self, id: &FunctionId) -> ImageTag {
        ImageTag::for_function(self.image_prefix, id)
    }

    /// Build (or rebuild) the image for `function` and return its tag.
    ///
    /// A packaging failure is reported as [`BuildError::Context`] even when
    /// the engine also failed because the upload was cut short. On any
    /// failure the caller must not record an image for the function.
    pub async fn build(&self, function: &FunctionConfig) -> Result<ImageTag, BuildError> {
        let id = &function.name;
        let image = self.image_tag(id);
        let started = Instant::now();

        tracing::info!(
            function = %id,
            image = %image,
            build_dir = %function.build_dir.display(),
            "Building function image"
        );

        match self.engine.remove_image(&image).await {
            Ok(()) => tracing::debug!(image = %image, "Removed previous image"),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                return Err(BuildError::Engine {
                    function: id.clone(),
                    source: e,
                })
            }
        }

        let (stream, packaging) = BuildContext::package(&function.build_dir).into_parts();
        let built = self.engine.build_image(&image, stream).await;
        let packaged = packaging.finish().await;

        let summary = match (built, packaged) {
            // The engine gave up first and dropped the upload.
            (Err(source), Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                return Err(BuildError::Engine {
                    function: id.clone(),
                    source,
                })
            }
            (_, Err(source)) => {
                return Err(BuildError::Context {
                    function: id.clone(),
                    path: function.build_dir.clone(),
                    source,
                })
            }
            (Err(source), Ok(_)) => {
                return Err(BuildError::Engine {
                    function: id.clone(),
                    source,
                })
            }
            (Ok(()), Ok(summary)) => summary,
        };

        tracing::info!(
            function = %id,
            image = %image,
            entries = summary.entries,
            context_bytes = summary.bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built function image"
        );

        Ok(image)
    }
}
