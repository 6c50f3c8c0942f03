use anyhow::Context;
use tracing::debug;

use crate::{Dataset, LabeledFeatures, PipelineConfig, PredictedInterval, Segmenter};

/// Runs one configuration end to end: fits every component on `train`, then
/// predicts, reconciles and scores `eval`.
pub(crate) fn run_pipeline(
    config: &mut PipelineConfig,
    train: &Dataset,
    eval: &Dataset,
) -> anyhow::Result<f64> {
    anyhow::ensure!(!train.events.is_empty(), "training split has no events");
    anyhow::ensure!(!eval.events.is_empty(), "evaluation split has no events");

    config
        .preprocessor
        .precompute(train)
        .context("preprocessor precompute")?;
    config
        .segmentation
        .precompute(train)
        .context("segmentation precompute")?;
    config.fetcher.precompute(train).context("fetcher precompute")?;
    config
        .features
        .precompute(train)
        .context("feature extractor precompute")?;
    config
        .classifier
        .precompute(train)
        .context("classifier precompute")?;

    let train_events = config.preprocessor.apply(&train.events)?;
    let eval_events = config.preprocessor.apply(&eval.events)?;

    let mut segmenter = Segmenter::new(config.segmentation.as_ref());

    let mut samples = Vec::new();
    for window in segmenter.windows(&train_events) {
        let window = window?;
        let activity = config.fetcher.fetch(&window, &train.activities);
        let features = config
            .features
            .extract(&window)
            .with_context(|| format!("extracting features of training window {}", window.seq))?;
        samples.push(LabeledFeatures::new(features, activity));
    }
    debug!(windows = samples.len(), "segmented training data");
    config
        .classifier
        .train(&samples)
        .context("training classifier")?;

    segmenter.reset();
    let mut predictions = Vec::new();
    for window in segmenter.windows(&eval_events) {
        let window = window?;
        let features = config
            .features
            .extract(&window)
            .with_context(|| format!("extracting features of window {}", window.seq))?;
        let activity = config
            .classifier
            .classify(&features)
            .with_context(|| format!("classifying window {}", window.seq))?;
        predictions.push(PredictedInterval::from_window(&window, activity));
    }
    debug!(windows = predictions.len(), "classified evaluation data");

    let timeline = config.combiner.combine(&predictions)?;
    // Scored against the raw evaluation events so every trial shares the
    // same denominator, whatever its preprocessor dropped.
    let quality = config
        .metric
        .score(&timeline, &eval.activities, &eval.events)
        .context("scoring timeline")?;
    anyhow::ensure!(quality.is_finite(), "metric returned non-finite score {quality}");
    Ok(quality)
}
