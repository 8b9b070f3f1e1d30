//! Append-only time series of agent state.
//!
//! Callers append in dispatch order, which keeps time non-decreasing; the
//! recorder itself does not check.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sample {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Sample {
    pub fn values(&self) -> &[f64] {
        match self {
            Self::Scalar(v) => std::slice::from_ref(v),
            Self::Vector(v) => v,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Vector(_) => None,
        }
    }
}

impl From<f64> for Sample {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<Vec<f64>> for Sample {
    fn from(v: Vec<f64>) -> Self {
        Self::Vector(v)
    }
}

impl From<&[f64]> for Sample {
    fn from(v: &[f64]) -> Self {
        Self::Vector(v.to_vec())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    samples: Vec<(f64, Sample)>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, time: f64, sample: impl Into<Sample>) {
        self.samples.push((time, sample.into()));
    }

    pub fn export(&self) -> &[(f64, Sample)] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<(f64, Sample)> {
        self.samples
    }

    pub fn last(&self) -> Option<&(f64, Sample)> {
        self.samples.last()
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|(t, _)| *t)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A trace labelled with the agent it belongs to, as exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTrace {
    pub series: String,
    pub trace: Trace,
}

impl NamedTrace {
    pub fn new(series: impl Into<String>, trace: Trace) -> Self {
        Self {
            series: series.into(),
            trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_export() {
        let mut t = Trace::new();
        t.append(1.0, 0.5);
        t.append(2.0, vec![1.0, 2.0]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.export()[0], (1.0, Sample::Scalar(0.5)));
        assert_eq!(t.export()[1].1.values(), &[1.0, 2.0]);
        assert_eq!(t.times().collect::<Vec<_>>(), vec![1.0, 2.0]);
        assert_eq!(t.last().and_then(|(_, s)| s.as_scalar()), None);
    }

    #[test]
    fn test_samples_serialize_untagged() {
        let mut t = Trace::new();
        t.append(0.5, 3.0);
        t.append(1.5, vec![1.0]);
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"{"samples":[[0.5,3.0],[1.5,[1.0]]]}"#);
        let back: Trace = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
