use std::fmt;

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    Warning(Warning),
    Error(ValidationError),
}

/// Warnings don't prevent startup; the affected feature runs degraded
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// Neither radio devices nor an online device are configured
    NoDevices,
    /// `[aggregate]` is enabled but `[online]` is not
    AggregateWithoutOnline,
    UnknownProvider {
        provider: String,
    },
    InvalidUnits {
        units: String,
    },
    MissingApiKey {
        provider: String,
    },
}

/// Error type for validation failures
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }

    pub(crate) fn error(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic::Error(ValidationError {
            field_path: field_path.into(),
            message: message.into(),
        })
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NoDevices => write!(f, "no devices configured, nothing will be published"),
            Warning::AggregateWithoutOnline => write!(
                f,
                "aggregate.enabled requires online.enabled, aggregation is disabled"
            ),
            Warning::UnknownProvider { provider } => write!(
                f,
                "unknown weather provider '{}', the online device will not refresh",
                provider
            ),
            Warning::InvalidUnits { units } => {
                write!(f, "invalid units '{}', using metric", units)
            }
            Warning::MissingApiKey { provider } => write!(
                f,
                "no api_key for {}, the online device will not refresh",
                provider
            ),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Warning(warning) => write!(f, "Warning: {}", warning),
            Diagnostic::Error(error) => write!(
                f,
                "Validation error in '{}': {}",
                error.field_path, error.message
            ),
        }
    }
}

/// Format all diagnostics for display, one per line
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("{}\n", d))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let diagnostics = vec![
            Diagnostic::Warning(Warning::InvalidUnits {
                units: "kelvin".to_string(),
            }),
            Diagnostic::error("devices[1]", "duplicate device key 'X_1'"),
        ];
        assert_eq!(
            format_diagnostics(&diagnostics),
            "Warning: invalid units 'kelvin', using metric\n\
             Validation error in 'devices[1]': duplicate device key 'X_1'\n"
        );
        assert!(diagnostics[0].is_warning());
        assert!(diagnostics[1].is_error());
    }
}
