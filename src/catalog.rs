//! Candidate components and the pipeline configurations built from them.
//!
//! A [`ComponentCatalog`] holds, for each of the five pipeline axes, a list
//! of named factories. Enumeration takes the Cartesian product in the fixed
//! axis order preprocessor, segmentation, activity fetcher, feature
//! extractor, classifier, with the classifier varying fastest. Every
//! configuration receives freshly built components.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    ActivityCombiner, ActivityFetcher, Classifier, EventAccuracy, FeatureExtractor,
    PipelineError, Preprocessor, QualityMetric, Result, SegmentationPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Preprocessor,
    Segmentation,
    ActivityFetcher,
    FeatureExtractor,
    Classifier,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Preprocessor => write!(f, "preprocessor"),
            Axis::Segmentation => write!(f, "segmentation"),
            Axis::ActivityFetcher => write!(f, "activity fetcher"),
            Axis::FeatureExtractor => write!(f, "feature extractor"),
            Axis::Classifier => write!(f, "classifier"),
        }
    }
}

pub type Factory<T> = Arc<dyn Fn() -> Box<T> + Send + Sync>;

/// A named way of building one component.
pub struct Candidate<T: ?Sized> {
    name: String,
    factory: Factory<T>,
}

impl<T: ?Sized> Candidate<T> {
    pub fn new<S, F>(name: S, factory: F) -> Self
    where
        S: Into<String>,
        F: Fn() -> Box<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(&self) -> Box<T> {
        (self.factory)()
    }
}

impl<T: ?Sized> Clone for Candidate<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            factory: self.factory.clone(),
        }
    }
}

/// Names the candidate chosen on each axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigIdentity {
    pub preprocessor: String,
    pub segmentation: String,
    pub fetcher: String,
    pub features: String,
    pub classifier: String,
}

impl fmt::Display for ConfigIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.preprocessor, self.segmentation, self.fetcher, self.features, self.classifier
        )
    }
}

/// One fully instantiated pipeline. Owned by exactly one trial.
pub struct PipelineConfig {
    pub identity: ConfigIdentity,
    pub preprocessor: Box<dyn Preprocessor>,
    pub segmentation: Box<dyn SegmentationPolicy>,
    pub fetcher: Box<dyn ActivityFetcher>,
    pub features: Box<dyn FeatureExtractor>,
    pub classifier: Box<dyn Classifier>,
    pub combiner: ActivityCombiner,
    pub metric: Arc<dyn QualityMetric>,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("identity", &self.identity)
            .field("combiner", &self.combiner)
            .field("metric", &self.metric.name())
            .finish()
    }
}

#[derive(Clone)]
pub struct ComponentCatalog {
    pub preprocessors: Vec<Candidate<dyn Preprocessor>>,
    pub segmentation: Vec<Candidate<dyn SegmentationPolicy>>,
    pub fetchers: Vec<Candidate<dyn ActivityFetcher>>,
    pub features: Vec<Candidate<dyn FeatureExtractor>>,
    pub classifiers: Vec<Candidate<dyn Classifier>>,
    pub combiner: ActivityCombiner,
    pub metric: Arc<dyn QualityMetric>,
}

impl Default for ComponentCatalog {
    fn default() -> Self {
        Self {
            preprocessors: Vec::new(),
            segmentation: Vec::new(),
            fetchers: Vec::new(),
            features: Vec::new(),
            classifiers: Vec::new(),
            combiner: ActivityCombiner::default(),
            metric: Arc::new(EventAccuracy),
        }
    }
}

impl ComponentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preprocessor<S, F>(mut self, name: S, factory: F) -> Self
    where
        S: Into<String>,
        F: Fn() -> Box<dyn Preprocessor> + Send + Sync + 'static,
    {
        self.preprocessors.push(Candidate::new(name, factory));
        self
    }

    pub fn with_segmentation<S, F>(mut self, name: S, factory: F) -> Self
    where
        S: Into<String>,
        F: Fn() -> Box<dyn SegmentationPolicy> + Send + Sync + 'static,
    {
        self.segmentation.push(Candidate::new(name, factory));
        self
    }

    pub fn with_fetcher<S, F>(mut self, name: S, factory: F) -> Self
    where
        S: Into<String>,
        F: Fn() -> Box<dyn ActivityFetcher> + Send + Sync + 'static,
    {
        self.fetchers.push(Candidate::new(name, factory));
        self
    }

    pub fn with_features<S, F>(mut self, name: S, factory: F) -> Self
    where
        S: Into<String>,
        F: Fn() -> Box<dyn FeatureExtractor> + Send + Sync + 'static,
    {
        self.features.push(Candidate::new(name, factory));
        self
    }

    pub fn with_classifier<S, F>(mut self, name: S, factory: F) -> Self
    where
        S: Into<String>,
        F: Fn() -> Box<dyn Classifier> + Send + Sync + 'static,
    {
        self.classifiers.push(Candidate::new(name, factory));
        self
    }

    pub fn with_combiner(mut self, combiner: ActivityCombiner) -> Self {
        self.combiner = combiner;
        self
    }

    pub fn with_metric(mut self, metric: Arc<dyn QualityMetric>) -> Self {
        self.metric = metric;
        self
    }

    /// Number of configurations enumeration will produce.
    pub fn combinations(&self) -> usize {
        self.preprocessors.len()
            * self.segmentation.len()
            * self.fetchers.len()
            * self.features.len()
            * self.classifiers.len()
    }

    fn check_axes(&self) -> Result<()> {
        let axes = [
            (Axis::Preprocessor, self.preprocessors.len()),
            (Axis::Segmentation, self.segmentation.len()),
            (Axis::ActivityFetcher, self.fetchers.len()),
            (Axis::FeatureExtractor, self.features.len()),
            (Axis::Classifier, self.classifiers.len()),
        ];
        match axes.iter().find(|(_, n)| *n == 0) {
            Some((axis, _)) => Err(PipelineError::EmptyCatalog { axis: *axis }),
            None => Ok(()),
        }
    }

    /// Builds every combination of candidates, classifier varying fastest.
    pub fn enumerate(&self) -> Result<Vec<PipelineConfig>> {
        self.check_axes()?;

        let mut configs = Vec::with_capacity(self.combinations());
        for pre in &self.preprocessors {
            for seg in &self.segmentation {
                for fetch in &self.fetchers {
                    for feat in &self.features {
                        for clf in &self.classifiers {
                            configs.push(PipelineConfig {
                                identity: ConfigIdentity {
                                    preprocessor: pre.name().to_string(),
                                    segmentation: seg.name().to_string(),
                                    fetcher: fetch.name().to_string(),
                                    features: feat.name().to_string(),
                                    classifier: clf.name().to_string(),
                                },
                                preprocessor: pre.build(),
                                segmentation: seg.build(),
                                fetcher: fetch.build(),
                                features: feat.build(),
                                classifier: clf.build(),
                                combiner: self.combiner,
                                metric: self.metric.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(configs)
    }
}
