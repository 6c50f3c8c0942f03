use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, ensure, Context};
use tract_onnx::prelude::*;
use tracing::debug;

use crate::{Activity, Dataset, FeatureVector};

/// A training sample: the features of one window and its ground-truth label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledFeatures {
    pub features: FeatureVector,
    pub activity: Activity,
}

impl LabeledFeatures {
    pub fn new(features: FeatureVector, activity: Activity) -> Self {
        Self { features, activity }
    }
}

/// Predicts an activity from a window's features.
///
/// Each trial gets its own freshly built instance, so training state is never
/// shared between trials.
pub trait Classifier: Send {
    fn name(&self) -> &str;

    fn precompute(&mut self, _dataset: &Dataset) -> anyhow::Result<()> {
        Ok(())
    }

    fn train(&mut self, samples: &[LabeledFeatures]) -> anyhow::Result<()>;

    fn classify(&self, features: &FeatureVector) -> anyhow::Result<Activity>;
}

fn squared_distance(a: &[f32], b: &[f32]) -> anyhow::Result<f32> {
    ensure!(
        a.len() == b.len(),
        "feature length mismatch: {} vs {}",
        a.len(),
        b.len()
    );
    Ok(a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum())
}

/// Always predicts the most frequent training label (lowest id on ties).
#[derive(Debug, Clone, Default)]
pub struct MajorityClass {
    label: Option<Activity>,
}

impl MajorityClass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Classifier for MajorityClass {
    fn name(&self) -> &str {
        "majority_class"
    }

    fn train(&mut self, samples: &[LabeledFeatures]) -> anyhow::Result<()> {
        let mut counts: BTreeMap<Activity, usize> = BTreeMap::new();
        for s in samples {
            *counts.entry(s.activity).or_default() += 1;
        }
        self.label = counts
            .into_iter()
            .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then(b.cmp(a)))
            .map(|(activity, _)| activity);
        ensure!(self.label.is_some(), "no training windows");
        Ok(())
    }

    fn classify(&self, _features: &FeatureVector) -> anyhow::Result<Activity> {
        self.label.context("majority_class used before training")
    }
}

/// Predicts the activity whose mean training feature vector is closest.
#[derive(Debug, Clone, Default)]
pub struct NearestCentroid {
    centroids: Vec<(Activity, FeatureVector)>,
}

impl NearestCentroid {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Classifier for NearestCentroid {
    fn name(&self) -> &str {
        "nearest_centroid"
    }

    fn train(&mut self, samples: &[LabeledFeatures]) -> anyhow::Result<()> {
        ensure!(!samples.is_empty(), "no training windows");
        let dim = samples[0].features.len();

        let mut sums: BTreeMap<Activity, (FeatureVector, usize)> = BTreeMap::new();
        for s in samples {
            ensure!(
                s.features.len() == dim,
                "feature length mismatch: {} vs {}",
                s.features.len(),
                dim
            );
            let (sum, n) = sums.entry(s.activity).or_insert_with(|| (vec![0.0; dim], 0));
            sum.iter_mut().zip(&s.features).for_each(|(acc, x)| *acc += x);
            *n += 1;
        }

        self.centroids = sums
            .into_iter()
            .map(|(activity, (sum, n))| {
                (activity, sum.into_iter().map(|v| v / n as f32).collect())
            })
            .collect();
        debug!(classes = self.centroids.len(), "trained centroids");
        Ok(())
    }

    fn classify(&self, features: &FeatureVector) -> anyhow::Result<Activity> {
        let mut best: Option<(Activity, f32)> = None;
        for (activity, centroid) in &self.centroids {
            let d = squared_distance(features, centroid)?;
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((*activity, d));
            }
        }
        best.map(|(activity, _)| activity)
            .context("nearest_centroid used before training")
    }
}

/// Majority vote among the `k` nearest training samples. Ties go to the
/// activity with the single nearest sample.
#[derive(Debug, Clone)]
pub struct KNearest {
    k: usize,
    samples: Vec<LabeledFeatures>,
}

impl KNearest {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            samples: Vec::new(),
        }
    }
}

impl Classifier for KNearest {
    fn name(&self) -> &str {
        "k_nearest"
    }

    fn train(&mut self, samples: &[LabeledFeatures]) -> anyhow::Result<()> {
        ensure!(self.k > 0, "k must be positive");
        ensure!(!samples.is_empty(), "no training windows");
        self.samples = samples.to_vec();
        Ok(())
    }

    fn classify(&self, features: &FeatureVector) -> anyhow::Result<Activity> {
        ensure!(!self.samples.is_empty(), "k_nearest used before training");
        let mut distances = self
            .samples
            .iter()
            .map(|s| Ok((squared_distance(features, &s.features)?, s.activity)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        distances.sort_by(|a, b| a.0.total_cmp(&b.0));

        // activity -> (votes, rank of its nearest sample)
        let mut votes: BTreeMap<Activity, (usize, usize)> = BTreeMap::new();
        for (rank, (_, activity)) in distances.iter().take(self.k).enumerate() {
            votes.entry(*activity).or_insert((0, rank)).0 += 1;
        }
        votes
            .into_iter()
            .max_by(|(_, (va, ra)), (_, (vb, rb))| va.cmp(vb).then(rb.cmp(ra)))
            .map(|(activity, _)| activity)
            .context("no neighbours")
    }
}

/// Runs a pre-trained ONNX model over feature vectors and picks the class
/// with the highest score. Output index `i` maps to `labels[i]`, or to
/// `Activity(i)` when no labels are given.
///
/// The model is loaded when training starts, once the feature length is
/// known; the training samples themselves are otherwise unused.
pub struct OnnxClassifier {
    path: PathBuf,
    labels: Vec<Activity>,
    model: Option<(usize, TypedRunnableModel<TypedModel>)>,
}

impl OnnxClassifier {
    pub fn new<P: Into<PathBuf>>(path: P, labels: Vec<Activity>) -> Self {
        Self {
            path: path.into(),
            labels,
            model: None,
        }
    }

    fn load(&self, dim: usize) -> anyhow::Result<TypedRunnableModel<TypedModel>> {
        let model = tract_onnx::onnx()
            .model_for_path(&self.path)?
            .with_input_fact(0, f32::fact([1, dim]).into())?
            .into_optimized()?
            .into_runnable()?;
        Ok(model)
    }

    fn label(&self, idx: usize) -> Activity {
        self.labels
            .get(idx)
            .copied()
            .unwrap_or(Activity(idx as u32))
    }
}

/// Index of the largest score; the first one wins ties.
fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, s)| match best {
            Some((_, bs)) if *s <= bs => best,
            _ => Some((i, *s)),
        })
        .map(|(i, _)| i)
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        "onnx"
    }

    fn train(&mut self, samples: &[LabeledFeatures]) -> anyhow::Result<()> {
        let dim = samples
            .first()
            .map(|s| s.features.len())
            .context("no training windows")?;
        let model = self
            .load(dim)
            .with_context(|| format!("loading {}", self.path.display()))?;
        debug!(path = %self.path.display(), dim, "loaded onnx classifier");
        self.model = Some((dim, model));
        Ok(())
    }

    fn classify(&self, features: &FeatureVector) -> anyhow::Result<Activity> {
        let Some((dim, model)) = &self.model else {
            bail!("onnx classifier used before training");
        };
        ensure!(
            features.len() == *dim,
            "feature length mismatch: {} vs {}",
            features.len(),
            dim
        );
        let input = Tensor::from_shape(&[1, *dim], features.as_slice())?;
        let out = model.run(tvec!(input.into()))?.remove(0);
        let idx = argmax(out.as_slice::<f32>()?).context("model produced no scores")?;
        Ok(self.label(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(features: &[f32], activity: u32) -> LabeledFeatures {
        LabeledFeatures::new(features.to_vec(), Activity(activity))
    }

    fn training_set() -> Vec<LabeledFeatures> {
        vec![
            sample(&[0.0, 0.0], 1),
            sample(&[0.2, 0.0], 1),
            sample(&[1.0, 1.0], 2),
            sample(&[0.9, 1.1], 2),
            sample(&[1.1, 0.9], 2),
        ]
    }

    #[test]
    fn test_majority_class() {
        let mut clf = MajorityClass::new();
        assert!(clf.classify(&vec![]).is_err());
        clf.train(&training_set()).unwrap();
        assert_eq!(clf.classify(&vec![0.0, 0.0]).unwrap(), Activity(2));

        // Ties go to the lowest id.
        clf.train(&[sample(&[0.0], 3), sample(&[0.0], 1)]).unwrap();
        assert_eq!(clf.classify(&vec![0.0]).unwrap(), Activity(1));
        assert!(clf.train(&[]).is_err());
    }

    #[test]
    fn test_nearest_centroid() {
        let mut clf = NearestCentroid::new();
        assert!(clf.classify(&vec![0.0, 0.0]).is_err());
        clf.train(&training_set()).unwrap();
        assert_eq!(clf.classify(&vec![0.1, 0.1]).unwrap(), Activity(1));
        assert_eq!(clf.classify(&vec![0.8, 0.8]).unwrap(), Activity(2));
        assert!(clf.classify(&vec![0.1]).is_err());
    }

    #[test]
    fn test_nearest_centroid_rejects_ragged_samples() {
        let mut clf = NearestCentroid::new();
        assert!(clf.train(&[sample(&[0.0], 1), sample(&[0.0, 1.0], 2)]).is_err());
    }

    #[test]
    fn test_k_nearest() {
        let mut clf = KNearest::new(3);
        clf.train(&training_set()).unwrap();
        assert_eq!(clf.classify(&vec![0.0, 0.1]).unwrap(), Activity(1));
        assert_eq!(clf.classify(&vec![1.0, 1.0]).unwrap(), Activity(2));

        // With k = 2 each class gets one vote; the nearest sample decides.
        let mut clf = KNearest::new(2);
        clf.train(&[sample(&[0.0], 1), sample(&[1.0], 2)]).unwrap();
        assert_eq!(clf.classify(&vec![0.6]).unwrap(), Activity(2));
        assert_eq!(clf.classify(&vec![0.4]).unwrap(), Activity(1));
    }

    #[test]
    fn test_k_nearest_zero_k() {
        assert!(KNearest::new(0).train(&training_set()).is_err());
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
    }

    #[test]
    fn test_onnx_label_mapping() {
        let clf = OnnxClassifier::new("model.onnx", vec![Activity(4), Activity(9)]);
        assert_eq!(clf.label(1), Activity(9));
        assert_eq!(clf.label(5), Activity(5));
    }

    #[test]
    fn test_onnx_missing_model_fails_training() {
        let dir = tempfile::tempdir().unwrap();
        let mut clf = OnnxClassifier::new(dir.path().join("missing.onnx"), vec![]);
        assert!(clf.train(&training_set()).is_err());
        assert!(clf.classify(&vec![0.0, 0.0]).is_err());
    }
}
