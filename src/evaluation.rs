use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info, warn};
use ndarray::{concatenate, Array2, ArrayView2, Axis};

use crate::config::{EvalConfig, Metric};
use crate::dataset;
use crate::error::{Error, Result};
use crate::frechet::frechet_distance;
use crate::inception_score::{inception_score, InceptionScore};
use crate::models::{Extraction, FeatureExtractor, TextImageEncoder};
use crate::preprocessing;
use crate::report::{MetricOutcome, Report};
use crate::similarity::{SimilarityResult, SimilarityScorer};
use crate::state::ModelHandle;
use crate::statistics::GaussianStats;

#[derive(Debug, Clone)]
pub struct EvaluationInputs
{
    pub generated: PathBuf,
    /// Needed only for the Fréchet distance.
    pub reference: Option<PathBuf>,
    /// Paired with the generated images in sorted order; needed only for CLIP similarity.
    pub prompts: Option<Vec<String>>,
}

/// Runs the metrics of one evaluation.
///
/// Work has a map-then-reduce shape: per-image decoding and resizing fans out
/// over rayon, the network runs chunk by chunk, and only then are the whole
/// batch's statistics reduced into a metric.
pub struct Evaluator
{
    config: EvalConfig,
    extractor: ModelHandle<dyn FeatureExtractor>,
    encoder: ModelHandle<dyn TextImageEncoder>,
}

impl Evaluator
{
    pub fn new(
        config: EvalConfig,
        extractor: ModelHandle<dyn FeatureExtractor>,
        encoder: ModelHandle<dyn TextImageEncoder>,
    ) -> Result<Self>
    {
        config.validate()?;
        Ok(Evaluator { config, extractor, encoder })
    }

    pub fn config(&self) -> &EvalConfig
    {
        &self.config
    }

    /// Runs the extractor over `paths` in chunks of `batch_size`, preserving order.
    pub fn extract(&self, extractor: &dyn FeatureExtractor, paths: &[PathBuf]) -> Result<Extraction>
    {
        if paths.is_empty() {
            return Ok(Extraction {
                features: Array2::zeros((0, extractor.feature_dims())),
                probabilities: Array2::zeros((0, extractor.num_classes())),
            });
        }

        let size = extractor.input_size();
        let normalization = extractor.normalization();
        let mut features = Vec::new();
        let mut probabilities = Vec::new();
        for (i, chunk) in paths.chunks(self.config.batch_size).enumerate()
        {
            let batch = preprocessing::prepare_batch(chunk, size, &normalization)?;
            let extraction = extractor.extract(batch)?;
            features.push(extraction.features);
            probabilities.push(extraction.probabilities);
            info!("Processed {}/{} images", i * self.config.batch_size + chunk.len(), paths.len());
        }

        let features = concatenate(Axis(0), &features.iter().map(|f| f.view()).collect::<Vec<_>>())?;
        let probabilities = concatenate(Axis(0), &probabilities.iter().map(|p| p.view()).collect::<Vec<_>>())?;
        Ok(Extraction { features, probabilities })
    }

    pub fn fid(&self, generated: ArrayView2<f32>, reference: ArrayView2<f32>) -> Result<f64>
    {
        let generated = GaussianStats::from_features(generated.mapv(f64::from).view())?;
        let reference = GaussianStats::from_features(reference.mapv(f64::from).view())?;
        frechet_distance(&generated, &reference, self.config.eigen_tolerance)
    }

    pub fn inception_score(&self, probabilities: ArrayView2<f32>) -> Result<InceptionScore>
    {
        inception_score(
            probabilities.mapv(f64::from).view(),
            self.config.splits,
            self.config.distribution_tolerance,
        )
    }

    pub fn clip_similarity(&self, images: &[PathBuf], prompts: &[String]) -> Result<SimilarityResult>
    {
        let encoder = self.encoder.get()?;
        let mut scorer = SimilarityScorer::new(encoder, self.config.batch_size);
        scorer.score_pairs(images, prompts)
    }

    /// Evaluates every configured metric.
    ///
    /// Returns an error only for failures that make the whole run meaningless:
    /// a model that cannot be loaded, or an input directory that cannot be read.
    /// Anything else is recorded against the metric it broke while the others
    /// still complete.
    pub fn run(&self, inputs: &EvaluationInputs) -> Result<Report>
    {
        let generated = dataset::list_images(&inputs.generated)?;
        let reference = match (&inputs.reference, self.config.wants(Metric::Fid)) {
            (Some(dir), true) => Some(dataset::list_images(dir)?),
            _ => None,
        };
        info!("Generated: {} images", generated.len());
        if let Some(reference) = &reference {
            info!("Reference: {} images", reference.len());
        }

        let mut report = Report::new(generated.len(), reference.as_ref().map(Vec::len));

        let wants_fid = self.config.wants(Metric::Fid);
        let wants_is = self.config.wants(Metric::InceptionScore);
        if wants_fid || wants_is {
            let extractor = self.extractor.get()?;
            let generated_extraction = self.extract(extractor.as_ref(), &generated);

            if wants_fid {
                report.fid = match (&generated_extraction, &reference) {
                    (_, None) => MetricOutcome::skipped("no reference images given"),
                    (Err(e), _) => MetricOutcome::failed(e),
                    (Ok(generated), Some(reference)) => {
                        let result = self.extract(extractor.as_ref(), reference)
                            .and_then(|reference| self.fid(generated.features.view(), reference.features.view()));
                        MetricOutcome::from_result(result)
                    }
                };
            }

            if wants_is {
                report.inception_score = match &generated_extraction {
                    Err(e) => MetricOutcome::failed(e),
                    Ok(generated) => MetricOutcome::from_result(self.inception_score(generated.probabilities.view())),
                };
            }
        }

        if self.config.wants(Metric::ClipSimilarity) {
            report.clip_similarity = match &inputs.prompts {
                None => MetricOutcome::skipped("no prompts given"),
                Some(prompts) => match self.clip_similarity(&generated, prompts) {
                    Err(e) if e.is_fatal() => return Err(e),
                    result => MetricOutcome::from_result(result),
                },
            };
        }

        log_outcome("FID", &report.fid);
        log_outcome("Inception Score", &report.inception_score);
        log_outcome("CLIP similarity", &report.clip_similarity);
        Ok(report)
    }
}

fn log_outcome<T>(name: &str, outcome: &MetricOutcome<T>)
{
    match outcome {
        MetricOutcome::Completed { .. } => info!("{} complete", name),
        MetricOutcome::Failed { error } => error!("{} failed: {}", name, error),
        MetricOutcome::Skipped { reason } => warn!("{} skipped: {}", name, reason),
    }
}

/// Evaluator over the pretrained ONNX models named in `config`.
/// Nothing is loaded until a metric needs it.
pub fn onnx_evaluator(config: EvalConfig) -> Result<Evaluator>
{
    let inception_path = config.inception_model.clone();
    let threads = config.intra_threads;
    let extractor: ModelHandle<dyn FeatureExtractor> = ModelHandle::new(
        "Inception-v3",
        move || Ok(Arc::new(crate::inception::Inception::new(&inception_path, threads)?) as Arc<dyn FeatureExtractor>),
    );

    let visual: PathBuf = config.clip_visual_model.clone();
    let text: PathBuf = config.clip_text_model.clone();
    let scale = config.clip_logit_scale;
    let encoder: ModelHandle<dyn TextImageEncoder> = ModelHandle::new(
        "CLIP",
        move || Ok(Arc::new(crate::clip::Clip::new(&visual, &text, scale, threads)?) as Arc<dyn TextImageEncoder>),
    );

    Evaluator::new(config, extractor, encoder)
}

/// Convenience for callers holding a prompt file rather than a list.
pub fn inputs_with_prompt_file(generated: &Path, reference: Option<&Path>, prompts: Option<&Path>) -> Result<EvaluationInputs>
{
    let prompts = prompts.map(dataset::load_prompts).transpose()?;
    Ok(EvaluationInputs {
        generated: generated.to_path_buf(),
        reference: reference.map(Path::to_path_buf),
        prompts,
    })
}
