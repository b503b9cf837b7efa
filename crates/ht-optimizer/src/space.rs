//! Parameter grids and their translation into a discrete numeric search domain.
//!
//! A [`ParamGrid`] is what the user hands in: either a mapping from parameter
//! name to a candidate list or a distribution, or a list of explicit
//! `{name, type, domain}` bound descriptors. [`translate`] turns it into the
//! ordered [`ParameterBound`]s the surrogate optimizer works on, plus a
//! [`CategoricalIndex`] that remembers which dimensions were re-indexed from
//! non-numeric values.

use rand::{Rng, RngCore};
use rand_distr::{Distribution as _, Normal, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use ht_types::{HtError, HtResult, ParamValue, SpaceError};

/// How the optimizer treats a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundKind {
    /// Finite ordered set of numeric candidates.
    Discrete,
    /// Closed interval `[domain[0], domain[1]]`.
    Continuous,
}

impl fmt::Display for BoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discrete => write!(f, "discrete"),
            Self::Continuous => write!(f, "continuous"),
        }
    }
}

impl BoundKind {
    fn parse(parameter: &str, raw: &str) -> HtResult<Self> {
        match raw {
            "discrete" => Ok(Self::Discrete),
            "continuous" => Ok(Self::Continuous),
            other => Err(SpaceError::InvalidDomain {
                parameter: parameter.to_string(),
                message: format!("unsupported bound type `{other}`"),
            }
            .into()),
        }
    }
}

/// One normalized search dimension as seen by the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBound {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: BoundKind,
    pub domain: Vec<f64>,
}

impl ParameterBound {
    /// Smallest and largest coordinate of the dimension.
    pub fn range(&self) -> (f64, f64) {
        self.domain
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            })
    }
}

// ---------------------------------------------------------------------------
// Distributions
// ---------------------------------------------------------------------------

/// A probability distribution that can stand in for a candidate list.
///
/// The translator draws `n` i.i.d. values from it to build a discrete domain.
pub trait ParamDistribution: fmt::Debug + Send + Sync {
    fn sample(&self, n: usize, rng: &mut dyn RngCore) -> HtResult<Vec<ParamValue>>;
}

/// Built-in distributions, also accepted in JSON grids as
/// `{"distribution": "uniform", "low": 0.0, "high": 1.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "snake_case")]
pub enum Distribution {
    /// Uniform on `[low, high)`.
    Uniform { low: f64, high: f64 },
    /// Log-uniform on `[low, high)`, both strictly positive.
    LogUniform { low: f64, high: f64 },
    Normal { mean: f64, std: f64 },
    /// Uniform integers on `[low, high)`.
    RandInt { low: i64, high: i64 },
}

impl Distribution {
    fn invalid(&self, message: impl Into<String>) -> SpaceError {
        SpaceError::InvalidDomain {
            parameter: "distribution".to_string(),
            message: message.into(),
        }
    }
}

impl ParamDistribution for Distribution {
    fn sample(&self, n: usize, rng: &mut dyn RngCore) -> HtResult<Vec<ParamValue>> {
        let values = match *self {
            Self::Uniform { low, high } => {
                if !(low < high) {
                    return Err(self.invalid("uniform requires low < high").into());
                }
                if !(high - low).is_finite() {
                    return Err(self.invalid("uniform requires a finite width").into());
                }
                let dist = Uniform::new(low, high);
                (0..n).map(|_| ParamValue::Float(dist.sample(&mut *rng))).collect()
            }
            Self::LogUniform { low, high } => {
                if !(low > 0.0 && low < high && high.is_finite()) {
                    return Err(self.invalid("log_uniform requires 0 < low < high < inf").into());
                }
                let dist = Uniform::new(low.ln(), high.ln());
                (0..n)
                    .map(|_| ParamValue::Float(dist.sample(&mut *rng).exp()))
                    .collect()
            }
            Self::Normal { mean, std } => {
                if !(mean.is_finite() && std.is_finite()) {
                    return Err(self.invalid("normal requires a finite mean and std").into());
                }
                let dist = Normal::new(mean, std)
                    .map_err(|e| self.invalid(format!("normal: {e}")))?;
                (0..n).map(|_| ParamValue::Float(dist.sample(&mut *rng))).collect()
            }
            Self::RandInt { low, high } => {
                if low >= high {
                    return Err(self.invalid("rand_int requires low < high").into());
                }
                (0..n)
                    .map(|_| ParamValue::Int(rng.gen_range(low..high)))
                    .collect()
            }
        };
        Ok(values)
    }
}

// ---------------------------------------------------------------------------
// Grid description
// ---------------------------------------------------------------------------

/// Candidate values for one parameter.
#[derive(Debug, Clone)]
pub enum DomainSpec {
    Values(Vec<ParamValue>),
    Distribution(Arc<dyn ParamDistribution>),
}

impl DomainSpec {
    pub fn values<V: Into<ParamValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::Values(values.into_iter().map(Into::into).collect())
    }

    pub fn distribution(dist: impl ParamDistribution + 'static) -> Self {
        Self::Distribution(Arc::new(dist))
    }

    fn from_json(parameter: &str, value: &serde_json::Value) -> HtResult<Self> {
        match value {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    ParamValue::from_json(item).ok_or_else(|| {
                        SpaceError::InvalidDomain {
                            parameter: parameter.to_string(),
                            message: format!("candidate {item} is not a scalar"),
                        }
                        .into()
                    })
                })
                .collect::<HtResult<Vec<_>>>()
                .map(Self::Values),
            serde_json::Value::Object(_) => {
                let dist: Distribution =
                    serde_json::from_value(value.clone()).map_err(|e| SpaceError::InvalidDomain {
                        parameter: parameter.to_string(),
                        message: format!("not a recognised distribution: {e}"),
                    })?;
                Ok(Self::distribution(dist))
            }
            other => Err(SpaceError::InvalidDomain {
                parameter: parameter.to_string(),
                message: format!("domain {other} is neither a list nor a distribution"),
            }
            .into()),
        }
    }
}

/// An explicit `{name, type, domain}` descriptor.
#[derive(Debug, Clone)]
pub struct BoundSpec {
    pub name: String,
    pub kind: BoundKind,
    pub domain: DomainSpec,
}

/// User-facing search space.
#[derive(Debug, Clone)]
pub enum ParamGrid {
    /// Parameter name to candidates, in insertion order.
    Mapping(Vec<(String, DomainSpec)>),
    /// Explicit bound descriptors, in list order.
    Bounds(Vec<BoundSpec>),
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::Mapping(Vec::new())
    }

    /// Add a finite candidate list to a mapping grid.
    pub fn add_values<V: Into<ParamValue>>(
        self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.add_domain(name, DomainSpec::values(values))
    }

    /// Add a distribution-valued parameter to a mapping grid.
    pub fn add_distribution(
        self,
        name: impl Into<String>,
        dist: impl ParamDistribution + 'static,
    ) -> Self {
        self.add_domain(name, DomainSpec::distribution(dist))
    }

    pub fn add_domain(self, name: impl Into<String>, domain: DomainSpec) -> Self {
        match self {
            Self::Mapping(mut entries) => {
                entries.push((name.into(), domain));
                Self::Mapping(entries)
            }
            Self::Bounds(mut bounds) => {
                bounds.push(BoundSpec {
                    name: name.into(),
                    kind: BoundKind::Discrete,
                    domain,
                });
                Self::Bounds(bounds)
            }
        }
    }

    /// Number of search parameters.
    pub fn len(&self) -> usize {
        match self {
            Self::Mapping(entries) => entries.len(),
            Self::Bounds(bounds) => bounds.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse a grid from JSON: an object is a mapping, an array is a bound list.
    pub fn from_json(value: &serde_json::Value) -> HtResult<Self> {
        match value {
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(name, domain)| Ok((name.clone(), DomainSpec::from_json(name, domain)?)))
                .collect::<HtResult<Vec<_>>>()
                .map(Self::Mapping),
            serde_json::Value::Array(items) => items
                .iter()
                .map(bound_from_json)
                .collect::<HtResult<Vec<_>>>()
                .map(Self::Bounds),
            other => Err(SpaceError::InvalidGridType {
                found: json_kind(other).to_string(),
            }
            .into()),
        }
    }
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self::new()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn bound_from_json(value: &serde_json::Value) -> HtResult<BoundSpec> {
    let incomplete = |missing: &str| SpaceError::IncompleteBound {
        missing: missing.to_string(),
        bound: value.to_string(),
    };
    let object = value.as_object().ok_or_else(|| incomplete("name"))?;

    let name = object
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| incomplete("name"))?
        .to_string();
    let kind = object
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| incomplete("type"))?;
    let domain = object.get("domain").ok_or_else(|| incomplete("domain"))?;

    let kind = BoundKind::parse(&name, kind)?;
    let domain = DomainSpec::from_json(&name, domain)?;

    Ok(BoundSpec { name, kind, domain })
}

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

/// Original values of the dimensions that were re-indexed to `0..len`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalIndex {
    entries: BTreeMap<String, Vec<ParamValue>>,
}

impl CategoricalIndex {
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&[ParamValue]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Map an optimizer coordinate back to the original value.
    ///
    /// The coordinate is rounded to the nearest index; `None` when the
    /// parameter is not categorical or the index falls outside the list.
    pub fn decode(&self, name: &str, coordinate: f64) -> Option<&ParamValue> {
        let values = self.entries.get(name)?;
        let index = coordinate.round();
        if index < 0.0 || !index.is_finite() {
            return None;
        }
        values.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, name: String, values: Vec<ParamValue>) {
        self.entries.insert(name, values);
    }
}

/// Output of [`translate`]: optimizer dimensions plus decoding table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslatedSpace {
    pub bounds: Vec<ParameterBound>,
    pub categorical: CategoricalIndex,
}

impl TranslatedSpace {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bounds.iter().map(|b| b.name.as_str())
    }

    pub fn dimensions(&self) -> usize {
        self.bounds.len()
    }
}

/// Translate a grid into discrete numeric bounds.
///
/// Distribution domains are sampled down to `n_samples` candidates using
/// `rng`, the only source of randomness in this step.
pub fn translate(
    grid: &ParamGrid,
    n_samples: usize,
    rng: &mut dyn RngCore,
) -> HtResult<TranslatedSpace> {
    let specs: Vec<(&str, BoundKind, &DomainSpec)> = match grid {
        ParamGrid::Mapping(entries) => entries
            .iter()
            .map(|(name, domain)| (name.as_str(), BoundKind::Discrete, domain))
            .collect(),
        ParamGrid::Bounds(bounds) => bounds
            .iter()
            .map(|b| (b.name.as_str(), b.kind, &b.domain))
            .collect(),
    };

    let mut seen = HashSet::new();
    let mut space = TranslatedSpace::default();

    for (name, kind, domain) in specs {
        if !seen.insert(name) {
            return Err(SpaceError::InvalidDomain {
                parameter: name.to_string(),
                message: "parameter is defined more than once".to_string(),
            }
            .into());
        }

        let (kind, values) = match domain {
            DomainSpec::Values(values) => (kind, values.clone()),
            DomainSpec::Distribution(dist) => {
                let values = dist.sample(n_samples, rng).map_err(|e| match e {
                    HtError::Space(SpaceError::InvalidDomain { message, .. }) => {
                        SpaceError::InvalidDomain {
                            parameter: name.to_string(),
                            message,
                        }
                        .into()
                    }
                    other => other,
                })?;
                (BoundKind::Discrete, values)
            }
        };

        if values.is_empty() {
            return Err(SpaceError::InvalidDomain {
                parameter: name.to_string(),
                message: "domain has no candidates".to_string(),
            }
            .into());
        }

        if values.iter().any(|v| !v.is_numeric()) {
            let domain = (0..values.len()).map(|i| i as f64).collect();
            space.categorical.insert(name.to_string(), values);
            space.bounds.push(ParameterBound {
                name: name.to_string(),
                kind: BoundKind::Discrete,
                domain,
            });
            continue;
        }

        let domain: Vec<f64> = values.iter().filter_map(ParamValue::as_f64).collect();
        if kind == BoundKind::Continuous && !(domain.len() == 2 && domain[0] <= domain[1]) {
            return Err(SpaceError::InvalidDomain {
                parameter: name.to_string(),
                message: "continuous bounds need exactly [low, high] with low <= high".to_string(),
            }
            .into());
        }

        space.bounds.push(ParameterBound {
            name: name.to_string(),
            kind,
            domain,
        });
    }

    Ok(space)
}
