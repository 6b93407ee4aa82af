use serde::{Deserialize, Serialize};

/// Value type a job declares for one of its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Text,
    Integer,
    Flag,
}

/// One entry of a job's declared, ordered parameter schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub kind: ParamKind,
}

impl ParameterDef {
    pub fn new<S: Into<String>>(name: S, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A typed parameter value supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Flag(bool),
}

/// Ordered parameter values for one run.
///
/// Accessors are positional and typed, returning `None` for a missing or
/// mismatched value. The crate-wide policy is substitution: job bodies call
/// `unwrap_or` with a documented default instead of failing the run over
/// absent or mistyped input.
#[derive(Debug, Clone, Default)]
pub struct JobParams {
    values: Vec<ParamValue>,
}

impl JobParams {
    pub fn new(values: Vec<ParamValue>) -> Self {
        Self { values }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ParamValue> {
        self.values.get(index)
    }

    pub fn text(&self, index: usize) -> Option<&str> {
        match self.values.get(index) {
            Some(ParamValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn integer(&self, index: usize) -> Option<i64> {
        match self.values.get(index) {
            Some(ParamValue::Integer(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn flag(&self, index: usize) -> Option<bool> {
        match self.values.get(index) {
            Some(ParamValue::Flag(v)) => Some(*v),
            _ => None,
        }
    }
}

impl From<Vec<ParamValue>> for JobParams {
    fn from(values: Vec<ParamValue>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_typed_access() {
        let params = JobParams::new(vec![
            ParamValue::Text("alice".to_string()),
            ParamValue::Integer(3),
            ParamValue::Flag(true),
        ]);

        assert_eq!(params.text(0), Some("alice"));
        assert_eq!(params.integer(1), Some(3));
        assert_eq!(params.flag(2), Some(true));
    }

    #[test]
    fn test_missing_or_mismatched_yields_none() {
        let params = JobParams::new(vec![ParamValue::Integer(7)]);

        // Wrong type at position 0
        assert_eq!(params.text(0), None);
        // Out of range
        assert_eq!(params.integer(5), None);
        // Substitution policy at the call site
        assert_eq!(params.text(0).unwrap_or("Mystery User"), "Mystery User");
    }

    #[test]
    fn test_empty_params() {
        let params = JobParams::none();
        assert!(params.is_empty());
        assert_eq!(params.get(0), None);
    }
}
