//! Sequential batch driver: prompt → base image → extended canvas → inpainted image.

use crate::api::{
    AspectRatio, GeneratedImage, GenerationRequest, ImageProvider, InpaintProvider, InpaintRequest,
};
use crate::canvas::{self, CanvasOptions};
use crate::error::{Result, WidefillError};
use crate::prompts::PromptRecord;
use std::path::{Path, PathBuf};

/// Name of the debug subdirectory for canvases and masks.
pub const DEBUG_DIR: &str = "debug";

/// Batch run settings.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Directory for final images; debug files go to `<output_dir>/debug`.
    pub output_dir: PathBuf,
    pub aspect_ratio: AspectRatio,
    /// Maximum number of successfully saved images.
    pub limit: Option<usize>,
    pub canvas: CanvasOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("generated_images"),
            aspect_ratio: AspectRatio::default(),
            limit: None,
            canvas: CanvasOptions::default(),
        }
    }
}

/// Pipeline step in which a record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Requesting or decoding the base image.
    Generate,
    /// Building the extended canvas and mask.
    Extend,
    /// Requesting or decoding the inpainted image.
    Inpaint,
    /// Writing files.
    Save,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generate => write!(f, "generate"),
            Self::Extend => write!(f, "extend"),
            Self::Inpaint => write!(f, "inpaint"),
            Self::Save => write!(f, "save"),
        }
    }
}

/// What happened to a single record.
#[derive(Debug)]
pub enum RecordOutcome {
    Saved { line: usize, path: PathBuf },
    Skipped { line: usize },
    Failed {
        line: usize,
        stage: Stage,
        error: WidefillError,
    },
}

impl RecordOutcome {
    /// Line number of the record.
    pub fn line(&self) -> usize {
        match self {
            Self::Saved { line, .. } | Self::Skipped { line } | Self::Failed { line, .. } => *line,
        }
    }
}

/// Result of a whole run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// One entry per record visited, in input order.
    pub outcomes: Vec<RecordOutcome>,
    /// True if iteration stopped early because the limit was reached.
    pub limit_reached: bool,
}

impl BatchSummary {
    pub fn saved(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Saved { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// File locations for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub image: PathBuf,
    pub canvas: PathBuf,
    pub mask: PathBuf,
}

impl OutputPaths {
    /// `<dir>/<line>.png`, `<dir>/debug/<line>_canvas.png`, `<dir>/debug/<line>_mask.png`.
    pub fn for_line(output_dir: &Path, line: usize) -> Self {
        let debug = output_dir.join(DEBUG_DIR);
        Self {
            image: output_dir.join(format!("{line}.png")),
            canvas: debug.join(format!("{line}_canvas.png")),
            mask: debug.join(format!("{line}_mask.png")),
        }
    }
}

/// Runs records through generation, canvas extension and inpainting.
pub struct Pipeline<'a> {
    generator: &'a dyn ImageProvider,
    inpainter: &'a dyn InpaintProvider,
    options: BatchOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        generator: &'a dyn ImageProvider,
        inpainter: &'a dyn InpaintProvider,
        options: BatchOptions,
    ) -> Self {
        Self {
            generator,
            inpainter,
            options,
        }
    }

    /// Processes `records` in order, one at a time.
    ///
    /// Only setup errors are returned; per-record failures are logged and
    /// recorded in the summary.
    pub async fn run(&self, records: impl IntoIterator<Item = PromptRecord>) -> Result<BatchSummary> {
        let output_dir = &self.options.output_dir;
        std::fs::create_dir_all(output_dir.join(DEBUG_DIR))?;

        let mut summary = BatchSummary::default();
        let mut saved = 0usize;

        for record in records {
            if record.is_empty() {
                tracing::info!(line = record.line, "skipping empty line {}", record.line);
                summary.outcomes.push(RecordOutcome::Skipped { line: record.line });
                continue;
            }

            if let Some(limit) = self.options.limit {
                if saved >= limit {
                    tracing::info!(limit, "reached limit of {limit} images, stopping");
                    summary.limit_reached = true;
                    break;
                }
            }

            tracing::info!(line = record.line, "processing line {}: {}", record.line, record.preview());

            let outcome = match self.process(&record).await {
                Ok(path) => {
                    saved += 1;
                    tracing::info!(
                        line = record.line,
                        path = %path.display(),
                        "saved {} image {}",
                        self.options.aspect_ratio,
                        record.line
                    );
                    RecordOutcome::Saved {
                        line: record.line,
                        path,
                    }
                }
                Err((stage, error)) => {
                    tracing::warn!(
                        line = record.line,
                        %stage,
                        "error processing line {}: {error}",
                        record.line
                    );
                    RecordOutcome::Failed {
                        line: record.line,
                        stage,
                        error,
                    }
                }
            };
            summary.outcomes.push(outcome);
        }

        Ok(summary)
    }

    async fn process(
        &self,
        record: &PromptRecord,
    ) -> std::result::Result<PathBuf, (Stage, WidefillError)> {
        let ratio = self.options.aspect_ratio;
        let paths = OutputPaths::for_line(&self.options.output_dir, record.line);
        let at = |stage: Stage| move |e: WidefillError| (stage, e);

        let request = GenerationRequest::new(&record.prompt).with_aspect_ratio(ratio);
        let size = request.size_string().unwrap_or_default();
        tracing::info!(line = record.line, "[1/3] generating base image with {} ({size})", self.generator.name());
        let base = self
            .generator
            .generate(&request)
            .await
            .and_then(|img| {
                log_result(record.line, &img);
                img.decode()
            })
            .map_err(at(Stage::Generate))?;

        tracing::info!(line = record.line, "[2/3] extending canvas to {ratio} and creating mask");
        let (extended, mask) =
            canvas::extend_with_mask(&base, ratio, &self.options.canvas).map_err(at(Stage::Extend))?;
        drop(base);

        save_debug(&extended.canvas, &mask, &paths).map_err(at(Stage::Save))?;

        tracing::info!(line = record.line, "[3/3] filling edges with {}", self.inpainter.name());
        let inpaint_request = InpaintRequest::from_canvas(&extended.canvas, &mask, &record.prompt)
            .map_err(at(Stage::Inpaint))?;
        // Keeps the service's color type, alpha included.
        let result = self
            .inpainter
            .inpaint(&inpaint_request)
            .await
            .and_then(|img| {
                log_result(record.line, &img);
                img.decode_dynamic()
            })
            .map_err(at(Stage::Inpaint))?;

        result
            .save_with_format(&paths.image, image::ImageFormat::Png)
            .map_err(|e| (Stage::Save, WidefillError::from(e)))?;

        Ok(paths.image)
    }
}

fn log_result(line: usize, image: &GeneratedImage) {
    let meta = &image.metadata;
    tracing::debug!(
        line,
        provider = %image.provider,
        model = meta.model.as_deref().unwrap_or("-"),
        request_id = meta.request_id.as_deref().unwrap_or("-"),
        duration_ms = meta.duration_ms.unwrap_or_default(),
        bytes = image.data.len(),
        "received image"
    );
}

fn save_debug(canvas: &image::RgbImage, mask: &image::GrayImage, paths: &OutputPaths) -> Result<()> {
    canvas.save_with_format(&paths.canvas, image::ImageFormat::Png)?;
    mask.save_with_format(&paths.mask, image::ImageFormat::Png)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_paths() {
        let paths = OutputPaths::for_line(Path::new("out"), 7);
        assert_eq!(paths.image, PathBuf::from("out/7.png"));
        assert_eq!(paths.canvas, PathBuf::from("out/debug/7_canvas.png"));
        assert_eq!(paths.mask, PathBuf::from("out/debug/7_mask.png"));
    }

    #[test]
    fn test_summary_counts() {
        let summary = BatchSummary {
            outcomes: vec![
                RecordOutcome::Saved {
                    line: 1,
                    path: PathBuf::from("1.png"),
                },
                RecordOutcome::Skipped { line: 2 },
                RecordOutcome::Failed {
                    line: 3,
                    stage: Stage::Inpaint,
                    error: WidefillError::Timeout(std::time::Duration::from_secs(1)),
                },
            ],
            limit_reached: false,
        };
        assert_eq!(summary.saved(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(
            summary.outcomes.iter().map(RecordOutcome::line).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Generate.to_string(), "generate");
        assert_eq!(Stage::Inpaint.to_string(), "inpaint");
    }
}
