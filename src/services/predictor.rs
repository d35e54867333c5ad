// src/services/predictor.rs

//! Prediction adapter.
//!
//! Turns a validated [`StudentAttributes`] into the fixed-order feature vector
//! the classifier was trained on, runs the classifier and reports the label
//! together with the probability of that label.

use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::models::prediction::{PredictionLabel, StudentAttributes};

/// Feature names in the column order the classifier expects.
pub const MODEL_FEATURES: [&str; 32] = [
    "school",
    "sex",
    "age",
    "address",
    "famsize",
    "Pstatus",
    "Medu",
    "Fedu",
    "Mjob",
    "Fjob",
    "reason",
    "guardian",
    "traveltime",
    "studytime",
    "failures",
    "schoolsup",
    "famsup",
    "paid",
    "activities",
    "nursery",
    "higher",
    "internet",
    "romantic",
    "famrel",
    "freetime",
    "goout",
    "Dalc",
    "Walc",
    "health",
    "absences",
    "G1",
    "G2",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Category(String),
}

impl From<i64> for FeatureValue {
    fn from(value: i64) -> Self {
        FeatureValue::Number(value as f64)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Category(value.to_string())
    }
}

/// One row of model input, ordered as [`MODEL_FEATURES`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<(&'static str, FeatureValue)>);

impl FeatureVector {
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|(n, _)| *n)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("missing model features: {0:?}")]
    MissingFeature(Vec<String>),
    #[error("feature '{0}' has a value of the wrong kind")]
    InvalidFeature(String),
    #[error("model unavailable: {0}")]
    Unavailable(String),
}

/// An opaque binary classifier. The positive class is PASS.
pub trait Classifier: Send + Sync {
    fn predict(&self, input: &FeatureVector) -> Result<bool, PredictError>;

    /// Probability of the positive class, for classifiers that expose one.
    fn predict_proba(&self, _input: &FeatureVector) -> Result<Option<f64>, PredictError> {
        Ok(None)
    }
}

/// Merges the collected attributes over the configured defaults.
///
/// Fails with `MissingFeature` if any model feature is still absent.
pub fn build_model_input(
    attrs: &StudentAttributes,
    defaults: &BTreeMap<String, FeatureValue>,
) -> Result<FeatureVector, PredictError> {
    let mut payload: HashMap<&str, FeatureValue> = defaults
        .iter()
        .map(|(k, v)| (k.as_str(), v.clone()))
        .collect();

    let collected: [(&str, FeatureValue); 19] = [
        ("school", attrs.school.as_str().into()),
        ("sex", attrs.gender.as_str().into()),
        ("age", attrs.age.into()),
        ("address", attrs.address.as_str().into()),
        ("famsize", attrs.family_size.as_str().into()),
        ("Pstatus", attrs.parental_status.as_str().into()),
        ("Medu", attrs.mother_education.into()),
        ("Fedu", attrs.father_education.into()),
        ("guardian", attrs.guardian.as_str().into()),
        ("traveltime", attrs.travel_time.into()),
        ("studytime", attrs.study_time.into()),
        ("failures", attrs.failures.into()),
        ("famsup", attrs.family_support.as_str().into()),
        ("activities", attrs.activities.as_str().into()),
        ("internet", attrs.internet_access.as_str().into()),
        ("health", attrs.health.into()),
        ("absences", attrs.absences.into()),
        ("G1", attrs.g1.into()),
        ("G2", attrs.g2.into()),
    ];
    payload.extend(collected);

    let missing: Vec<String> = MODEL_FEATURES
        .iter()
        .filter(|name| !payload.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PredictError::MissingFeature(missing));
    }

    Ok(FeatureVector(
        MODEL_FEATURES
            .iter()
            .filter_map(|name| payload.remove(name).map(|value| (*name, value)))
            .collect(),
    ))
}

/// Logistic regression exported as JSON.
///
/// ```json
/// { "intercept": -8.1,
///   "numeric": { "G2": 0.55 },
///   "categorical": { "higher": { "yes": 0.4 } },
///   "threshold": 0.5 }
/// ```
///
/// Categorical levels without a coefficient are the reference level (weight 0).
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticModel {
    intercept: f64,
    #[serde(default)]
    numeric: HashMap<String, f64>,
    #[serde(default)]
    categorical: HashMap<String, HashMap<String, f64>>,
    #[serde(default = "default_threshold")]
    threshold: f64,
}

fn default_threshold() -> f64 {
    0.5
}

impl LogisticModel {
    pub fn from_json(raw: &str) -> Result<Self, PredictError> {
        serde_json::from_str(raw).map_err(|e| PredictError::Unavailable(e.to_string()))
    }

    fn probability(&self, input: &FeatureVector) -> Result<f64, PredictError> {
        let mut z = self.intercept;

        for (name, coef) in &self.numeric {
            match input.get(name) {
                Some(FeatureValue::Number(value)) => z += coef * value,
                Some(FeatureValue::Category(_)) => {
                    return Err(PredictError::InvalidFeature(name.clone()));
                }
                None => return Err(PredictError::MissingFeature(vec![name.clone()])),
            }
        }

        for (name, levels) in &self.categorical {
            match input.get(name) {
                Some(FeatureValue::Category(level)) => {
                    z += levels.get(level).copied().unwrap_or(0.0);
                }
                Some(FeatureValue::Number(_)) => {
                    return Err(PredictError::InvalidFeature(name.clone()));
                }
                None => return Err(PredictError::MissingFeature(vec![name.clone()])),
            }
        }

        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

impl Classifier for LogisticModel {
    fn predict(&self, input: &FeatureVector) -> Result<bool, PredictError> {
        Ok(self.probability(input)? >= self.threshold)
    }

    fn predict_proba(&self, input: &FeatureVector) -> Result<Option<f64>, PredictError> {
        self.probability(input).map(Some)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub label: PredictionLabel,
    /// Probability of `label`, in [0, 1].
    pub confidence: Option<f64>,
}

/// Owns the classifier for the lifetime of the process.
///
/// The model file is read on first use (or eagerly via [`Predictor::load`]);
/// a failed load is retried on the next call.
pub struct Predictor {
    model_path: Option<PathBuf>,
    defaults: BTreeMap<String, FeatureValue>,
    classifier: RwLock<Option<Arc<dyn Classifier>>>,
}

impl Predictor {
    pub fn new(model_path: impl Into<PathBuf>, defaults: BTreeMap<String, FeatureValue>) -> Self {
        Self {
            model_path: Some(model_path.into()),
            defaults,
            classifier: RwLock::new(None),
        }
    }

    /// A predictor around an already constructed classifier.
    pub fn with_classifier(
        classifier: Arc<dyn Classifier>,
        defaults: BTreeMap<String, FeatureValue>,
    ) -> Self {
        Self {
            model_path: None,
            defaults,
            classifier: RwLock::new(Some(classifier)),
        }
    }

    pub async fn is_loaded(&self) -> bool {
        self.classifier.read().await.is_some()
    }

    pub async fn load(&self) -> Result<Arc<dyn Classifier>, PredictError> {
        if let Some(classifier) = self.classifier.read().await.as_ref() {
            return Ok(classifier.clone());
        }

        let mut guard = self.classifier.write().await;
        if let Some(classifier) = guard.as_ref() {
            return Ok(classifier.clone());
        }

        let path = self
            .model_path
            .as_ref()
            .ok_or_else(|| PredictError::Unavailable("no model configured".to_string()))?;
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PredictError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let classifier: Arc<dyn Classifier> = Arc::new(LogisticModel::from_json(&raw)?);

        tracing::info!("Loaded prediction model from {}", path.display());
        *guard = Some(classifier.clone());
        Ok(classifier)
    }

    pub async fn predict(&self, attrs: &StudentAttributes) -> Result<Prediction, PredictError> {
        let classifier = self.load().await?;
        let input = build_model_input(attrs, &self.defaults)?;

        let positive = classifier.predict(&input)?;
        let confidence = classifier.predict_proba(&input)?.map(|p| {
            let p = p.clamp(0.0, 1.0);
            if positive { p } else { 1.0 - p }
        });

        Ok(Prediction {
            label: if positive {
                PredictionLabel::Pass
            } else {
                PredictionLabel::Fail
            },
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_support::{TEST_MODEL_JSON, sample_attributes};

    fn defaults() -> BTreeMap<String, FeatureValue> {
        Config::default().prediction_defaults
    }

    struct NoProbability;

    impl Classifier for NoProbability {
        fn predict(&self, _input: &FeatureVector) -> Result<bool, PredictError> {
            Ok(false)
        }
    }

    #[test]
    fn model_input_follows_feature_order() {
        let input = build_model_input(&sample_attributes(), &defaults()).unwrap();
        assert_eq!(input.len(), MODEL_FEATURES.len());
        assert!(input.names().eq(MODEL_FEATURES.iter().copied()));
        assert_eq!(input.get("sex"), Some(&FeatureValue::Category("F".into())));
        assert_eq!(input.get("G2"), Some(&FeatureValue::Number(15.0)));
        assert_eq!(input.get("Walc"), Some(&FeatureValue::Number(2.0)));
    }

    #[test]
    fn missing_default_is_reported() {
        let mut defaults = defaults();
        defaults.remove("Mjob");
        defaults.remove("goout");

        match build_model_input(&sample_attributes(), &defaults) {
            Err(PredictError::MissingFeature(missing)) => {
                assert_eq!(missing, vec!["Mjob".to_string(), "goout".to_string()]);
            }
            other => panic!("expected MissingFeature, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn confidence_is_probability_of_returned_label() {
        let model = Arc::new(LogisticModel::from_json(TEST_MODEL_JSON).unwrap());
        let predictor = Predictor::with_classifier(model.clone(), defaults());

        let strong = sample_attributes();
        let prediction = predictor.predict(&strong).await.unwrap();
        assert_eq!(prediction.label, PredictionLabel::Pass);
        let confidence = prediction.confidence.unwrap();
        assert!(confidence >= 0.5 && confidence <= 1.0);

        let mut weak = sample_attributes();
        weak.g1 = 2;
        weak.g2 = 1;
        weak.failures = 3;
        let prediction = predictor.predict(&weak).await.unwrap();
        assert_eq!(prediction.label, PredictionLabel::Fail);

        let input = build_model_input(&weak, &defaults()).unwrap();
        let p_pass = model.predict_proba(&input).unwrap().unwrap();
        let confidence = prediction.confidence.unwrap();
        assert!((confidence - (1.0 - p_pass)).abs() < 1e-12);
        assert!(confidence >= 0.5 && confidence <= 1.0);
    }

    #[tokio::test]
    async fn classifiers_without_probabilities_give_no_confidence() {
        let predictor = Predictor::with_classifier(Arc::new(NoProbability), defaults());
        let prediction = predictor.predict(&sample_attributes()).await.unwrap();
        assert_eq!(prediction.label, PredictionLabel::Fail);
        assert_eq!(prediction.confidence, None);
    }

    #[tokio::test]
    async fn failed_load_is_retried_on_next_use() {
        let dir = std::env::temp_dir().join(format!("sp-model-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("retry_model.json");
        let _ = std::fs::remove_file(&path);

        let predictor = Predictor::new(&path, defaults());
        assert!(matches!(
            predictor.predict(&sample_attributes()).await,
            Err(PredictError::Unavailable(_))
        ));
        assert!(!predictor.is_loaded().await);

        std::fs::write(&path, TEST_MODEL_JSON).unwrap();
        assert!(predictor.predict(&sample_attributes()).await.is_ok());
        assert!(predictor.is_loaded().await);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn wrong_kind_of_feature_is_rejected() {
        let model = LogisticModel::from_json(r#"{"intercept": 0, "numeric": {"sex": 1.0}}"#)
            .unwrap();
        let input = build_model_input(&sample_attributes(), &defaults()).unwrap();
        assert!(matches!(
            model.predict(&input),
            Err(PredictError::InvalidFeature(name)) if name == "sex"
        ));
    }
}
