//! Request parameters and their conversion to wire format
//!
//! Callers build [`Params`] from plain Rust values. Before a request is sent the parameters
//! go through one pipeline: rank normalization, multiple-choice validation, rank ranges,
//! pagination shortcuts, date parsing, observation field filters, and finally conversion to
//! `(key, value)` string pairs with empty values dropped.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

use crate::constants::{DATETIME_PARAMS, MULTIPLE_CHOICE_PARAMS, RANKS, RANK_EQUIVALENTS, RANK_PARAMS};
use crate::error::{InatError, Result};

/// A single parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    List(Vec<ParamValue>),
    Null,
}

impl ParamValue {
    /// Wire representation; `None` for null values
    pub fn to_wire(&self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Self::DateTime(dt) => Some(dt.to_rfc3339()),
            Self::List(items) => Some(
                items
                    .iter()
                    .filter_map(ParamValue::to_wire)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Self::Null => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Str(s) => s.is_empty(),
            Self::List(items) => items.iter().all(ParamValue::is_empty),
            _ => false,
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Str(s) => parse_bool_str(s),
            Self::Null => false,
            other => !other.is_empty(),
        }
    }

    /// String values, flattening one level of list
    fn strings(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.iter().filter_map(ParamValue::to_wire).collect(),
            other => other.to_wire().into_iter().collect(),
        }
    }
}

fn parse_bool_str(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for ParamValue {
            fn from(value: $t) -> Self {
                Self::Int(value as i64)
            }
        })*
    };
}

from_int!(i32, i64, u32, u64, usize);

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<DateTime<FixedOffset>> for ParamValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::DateTime(value)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value.fixed_offset())
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue> + Clone> From<&[T]> for ParamValue {
    fn from(values: &[T]) -> Self {
        Self::List(values.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Request parameters keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Params::insert`]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Filter on an observation field value, sent as `field:<name>`
    pub fn observation_field(self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.set(format!("field:{name}"), value)
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Add every parameter from `other`, replacing existing keys
    pub fn extend(&mut self, other: Params) {
        self.0.extend(other.0);
    }

    /// Validate and convert to wire `(key, value)` pairs, sorted by key
    pub fn preprocess(&self) -> Result<Vec<(String, String)>> {
        let mut params = self.0.clone();
        normalize_rank_params(&mut params);
        validate_multiple_choice(&params)?;
        convert_rank_range(&mut params)?;
        convert_pagination(&mut params)?;
        convert_datetimes(&mut params)?;
        convert_observation_fields(&mut params);

        Ok(params
            .into_iter()
            .filter(|(key, value)| key.starts_with("field:") || !value.is_empty())
            .filter_map(|(key, value)| value.to_wire().map(|v| (key, v)))
            .collect())
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Normalize a taxonomic rank name, accepting aliases (`sp`, `ssp`, `var`, ...) and unique
/// prefixes. Returns `None` for names that match no rank.
pub fn normalize_rank(rank: &str) -> Option<&'static str> {
    let cleaned: String = rank
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | '.') && !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if cleaned.is_empty() {
        return None;
    }
    if let Some(rank) = RANK_EQUIVALENTS.get(cleaned.as_str()) {
        return Some(rank);
    }
    if let Some(rank) = RANKS.iter().find(|r| **r == cleaned) {
        return Some(rank);
    }

    let mut matches = RANKS.iter().filter(|r| r.starts_with(&cleaned));
    match (matches.next(), matches.next()) {
        (Some(rank), None) => Some(rank),
        _ => None,
    }
}

/// All ranks between `min_rank` and `max_rank`, inclusive
pub fn rank_range(min_rank: Option<&str>, max_rank: Option<&str>) -> Result<Vec<&'static str>> {
    let index = |rank: Option<&str>, default: usize| -> Result<usize> {
        match rank {
            None => Ok(default),
            Some(rank) => normalize_rank(rank)
                .and_then(|r| RANKS.iter().position(|known| *known == r))
                .ok_or_else(|| InatError::Validation(format!("Invalid rank: {rank}"))),
        }
    };
    let start = index(min_rank, 0)?;
    let end = index(max_rank, RANKS.len() - 1)?;
    if start > end {
        return Err(InatError::Validation(format!(
            "min_rank ({}) is above max_rank ({})",
            RANKS[start], RANKS[end]
        )));
    }
    Ok(RANKS[start..=end].to_vec())
}

/// Check `order_by` against the values a specific endpoint accepts
pub fn validate_order_by(params: &Params, choices: &[&str]) -> Result<()> {
    match params.get("order_by") {
        Some(value) => check_choices("order_by", value, choices).map_err(InatError::Validation),
        None => Ok(()),
    }
}

/// Comma-join IDs for a multi-ID URL path segment
pub fn join_ids(ids: &[u64]) -> Result<String> {
    if ids.is_empty() {
        return Err(InatError::Validation("At least one ID is required".into()));
    }
    Ok(ids
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(","))
}

/// Parse a comma-separated ID string, rejecting anything that is not an integer
pub fn parse_ids(ids: &str) -> Result<Vec<u64>> {
    ids.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| InatError::Validation(format!("Invalid ID(s): {ids}")))
        })
        .collect()
}

fn normalize_rank_params(params: &mut BTreeMap<String, ParamValue>) {
    let normalize = |value: &ParamValue| match value {
        ParamValue::Str(s) => normalize_rank(s).map_or_else(|| value.clone(), ParamValue::from),
        other => other.clone(),
    };
    for key in RANK_PARAMS {
        if let Some(value) = params.get_mut(*key) {
            let normalized = match &*value {
                ParamValue::List(items) => ParamValue::List(items.iter().map(normalize).collect()),
                other => normalize(other),
            };
            *value = normalized;
        }
    }
}

fn validate_multiple_choice(params: &BTreeMap<String, ParamValue>) -> Result<()> {
    let errors: Vec<String> = MULTIPLE_CHOICE_PARAMS
        .iter()
        .filter_map(|(key, choices)| {
            let value = params.get(*key)?;
            check_choices(key, value, choices).err()
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(InatError::Validation(errors.join("\n")))
    }
}

fn check_choices(key: &str, value: &ParamValue, choices: &[&str]) -> std::result::Result<(), String> {
    let values: Vec<String> = value.strings().iter().map(|v| v.replace(' ', "_")).collect();
    if values.iter().all(|v| choices.contains(&v.as_str())) {
        return Ok(());
    }
    Err(format!(
        "Parameter \"{key}\" must have one of the following values: {}\n\tValue provided: {}",
        choices.join(", "),
        values.join(",")
    ))
}

fn convert_rank_range(params: &mut BTreeMap<String, ParamValue>) -> Result<()> {
    let min = params.remove("min_rank").filter(|v| !v.is_empty());
    let max = params.remove("max_rank").filter(|v| !v.is_empty());
    if min.is_none() && max.is_none() {
        return Ok(());
    }
    let min = min.and_then(|v| v.to_wire());
    let max = max.and_then(|v| v.to_wire());
    let ranks = rank_range(min.as_deref(), max.as_deref())?;
    params.insert("rank".into(), ranks.into());
    Ok(())
}

fn convert_pagination(params: &mut BTreeMap<String, ParamValue>) -> Result<()> {
    if params.remove("count_only").is_some_and(|v| v.is_truthy()) {
        params.insert("per_page".into(), ParamValue::Int(0));
    }
    if params.remove("reverse").is_some_and(|v| v.is_truthy()) {
        params.insert("order".into(), "descending".into());
    }
    if let Some(page) = params.get("page") {
        let number = match page {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Str(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        match number {
            Some(n) if n >= 1 => {}
            _ => {
                return Err(InatError::Validation(format!(
                    "Parameter \"page\" must be a positive integer\n\tValue provided: {}",
                    page.to_wire().unwrap_or_default()
                )))
            }
        }
    }
    Ok(())
}

fn convert_datetimes(params: &mut BTreeMap<String, ParamValue>) -> Result<()> {
    for key in DATETIME_PARAMS {
        if let Some(ParamValue::Str(s)) = params.get(*key) {
            if s.is_empty() {
                continue;
            }
            let parsed = parse_datetime(s).ok_or_else(|| {
                InatError::Validation(format!(
                    "Parameter \"{key}\" must be a date or datetime\n\tValue provided: {s}"
                ))
            })?;
            params.insert(key.to_string(), parsed);
        }
    }
    Ok(())
}

/// Parse the date and datetime formats callers commonly pass as strings
fn parse_datetime(value: &str) -> Option<ParamValue> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(ParamValue::DateTime(dt));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ParamValue::Str(dt.format("%Y-%m-%dT%H:%M:%S").to_string()));
        }
    }
    for format in ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(ParamValue::Date(date));
        }
    }
    None
}

/// `observation_fields` becomes one `field:<name>` parameter per field; a list of names
/// filters on fields having any value.
fn convert_observation_fields(params: &mut BTreeMap<String, ParamValue>) {
    let Some(fields) = params.remove("observation_fields") else {
        return;
    };
    for name in fields.strings() {
        match name.split_once('=') {
            Some((name, value)) => params.insert(format!("field:{name}"), value.into()),
            None => params.insert(format!("field:{name}"), ParamValue::Str(String::new())),
        };
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .0
            .iter()
            .filter_map(|(k, v)| v.to_wire().map(|v| format!("{k}={v}")))
            .collect();
        write!(f, "{}", pairs.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(params: Params) -> Vec<(String, String)> {
        params.preprocess().unwrap()
    }

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn test_value_conversion() {
        let params = Params::new()
            .set("captive", false)
            .set("taxon_id", vec![1, 2, 3])
            .set("d1", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
            .set("per_page", 0)
            .set("q", "")
            .set("place_id", Option::<u64>::None);

        assert_eq!(
            wire(params),
            vec![
                pair("captive", "false"),
                pair("d1", "2024-05-01"),
                pair("per_page", "0"),
                pair("taxon_id", "1,2,3"),
            ]
        );
    }

    #[test]
    fn test_rank_normalization() {
        assert_eq!(normalize_rank("sp"), Some("species"));
        assert_eq!(normalize_rank("Sub-Species"), Some("subspecies"));
        assert_eq!(normalize_rank("var."), Some("variety"));
        assert_eq!(normalize_rank("fam"), Some("family"));
        assert_eq!(normalize_rank("sub"), None);
        assert_eq!(normalize_rank("nonsense"), None);

        let params = Params::new().set("rank", vec!["ssp", "Genus"]);
        assert_eq!(wire(params), vec![pair("rank", "subspecies,genus")]);
    }

    #[test]
    fn test_rank_range() {
        let params = Params::new().set("min_rank", "genus").set("max_rank", "family");
        assert_eq!(
            wire(params),
            vec![pair("rank", "genus,subtribe,tribe,supertribe,subfamily,family")]
        );

        let ranks = rank_range(Some("kingdom"), None).unwrap();
        assert_eq!(ranks, vec!["kingdom"]);
        assert!(rank_range(Some("family"), Some("genus")).is_err());
    }

    #[test]
    fn test_multiple_choice_errors_are_collected() {
        let err = Params::new()
            .set("quality_grade", "excellent")
            .set("order", "sideways")
            .set("geoprivacy", "open")
            .preprocess()
            .unwrap_err();

        let InatError::Validation(message) = err else {
            panic!("expected validation error");
        };
        assert!(message.contains("Parameter \"order\" must have one of the following values: asc, desc"));
        assert!(message.contains("\tValue provided: excellent"));
        assert!(!message.contains("geoprivacy"));
    }

    #[test]
    fn test_multiple_choice_normalizes_spaces() {
        let params = Params::new().set("quality_grade", vec!["needs id", "research"]);
        assert!(params.preprocess().is_ok());
    }

    #[test]
    fn test_pagination_shortcuts() {
        let params = Params::new().set("count_only", true).set("reverse", true);
        assert_eq!(
            wire(params),
            vec![pair("order", "descending"), pair("per_page", "0")]
        );

        assert!(Params::new().set("page", 0).preprocess().is_err());
        assert!(Params::new().set("page", "two").preprocess().is_err());
        assert!(Params::new().set("page", 2).preprocess().is_ok());
    }

    #[test]
    fn test_datetime_strings() {
        let params = Params::new()
            .set("d1", "2024-01-15")
            .set("created_d1", "Jan 15, 2024")
            .set("updated_since", "2024-01-15T08:30:00-05:00")
            .set("observed_on_string", "2024-01-15 08:30:00");

        assert_eq!(
            wire(params),
            vec![
                pair("created_d1", "2024-01-15"),
                pair("d1", "2024-01-15"),
                pair("observed_on_string", "2024-01-15T08:30:00"),
                pair("updated_since", "2024-01-15T08:30:00-05:00"),
            ]
        );

        assert!(Params::new().set("d1", "last tuesday").preprocess().is_err());
    }

    #[test]
    fn test_observation_fields() {
        let params = Params::new()
            .set("observation_fields", vec!["Habitat", "Count=3"])
            .observation_field("Sex", "female");

        assert_eq!(
            wire(params),
            vec![
                pair("field:Count", "3"),
                pair("field:Habitat", ""),
                pair("field:Sex", "female"),
            ]
        );
    }

    #[test]
    fn test_order_by_validation() {
        let params = Params::new().set("order_by", "votes");
        assert!(validate_order_by(&params, &["created_at", "votes"]).is_ok());
        assert!(validate_order_by(&params, &["created"]).is_err());
        assert!(validate_order_by(&Params::new(), &["created"]).is_ok());
    }

    #[test]
    fn test_ids() {
        assert_eq!(join_ids(&[1, 2, 3]).unwrap(), "1,2,3");
        assert!(join_ids(&[]).is_err());
        assert_eq!(parse_ids("1, 2,3").unwrap(), vec![1, 2, 3]);
        assert!(parse_ids("1,two").is_err());
    }
}
