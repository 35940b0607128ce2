// =============================================================================
// Fallback — value-or-default result for best-effort collaborator calls
// =============================================================================
//
// Every call into an external collaborator (market data, sentiment, discovery,
// model training) resolves to a `Fallback<T>`.  A degraded value carries the
// reason it was substituted so the decision loop can log it and tests can
// assert on it.  Nothing wrapped in a `Fallback` ever propagates an error.
// =============================================================================

use std::fmt::Display;

use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum Fallback<T> {
    /// The collaborator answered normally.
    Fresh(T),
    /// The collaborator failed and `value` is the defined default.
    Degraded { value: T, reason: String },
}

impl<T> Fallback<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self::Degraded {
            value,
            reason: reason.into(),
        }
    }

    /// Map a fallible call onto its fallback, logging the failure once.
    pub fn from_result<E: Display>(result: Result<T, E>, default: T, what: &str) -> Self {
        match result {
            Ok(value) => Self::Fresh(value),
            Err(e) => {
                warn!(source = what, error = %e, "collaborator failed, using fallback value");
                Self::Degraded {
                    value: default,
                    reason: format!("{what}: {e}"),
                }
            }
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Fresh(v) => v,
            Self::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Fresh(v) => v,
            Self::Degraded { value, .. } => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Fresh(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_result_is_fresh() {
        let fb: Fallback<f64> = Fallback::from_result(Ok::<_, String>(0.8), 0.5, "model");
        assert!(!fb.is_degraded());
        assert_eq!(*fb.value(), 0.8);
        assert_eq!(fb.reason(), None);
    }

    #[test]
    fn err_result_degrades_to_default_with_reason() {
        let fb = Fallback::from_result(Err::<f64, _>("too few samples"), 0.5, "model");
        assert!(fb.is_degraded());
        assert_eq!(fb.reason(), Some("model: too few samples"));
        assert_eq!(fb.into_value(), 0.5);
    }
}
