//! Macros for reducing boilerplate code

/// Implements Display and FromStr for label-style enums
///
/// Used for enums that travel through config files, env vars and log
/// fields as short lowercase labels (`"cached"`, `"json"`, `"capability"`).
/// Parsing is case-insensitive; display is always the canonical label.
///
/// # Example
///
/// ```rust
/// use audilink_common::impl_label_conversions;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// pub enum Outcome {
///     Cached,
///     Refreshed,
/// }
///
/// impl_label_conversions!(Outcome {
///     Cached => "cached",
///     Refreshed => "refreshed",
/// });
///
/// assert_eq!(Outcome::Cached.to_string(), "cached");
/// assert_eq!("REFRESHED".parse::<Outcome>(), Ok(Outcome::Refreshed));
/// ```
#[macro_export]
macro_rules! impl_label_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    //! Unit tests for utils::macros.
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestSource {
        Cached,
        FullLogin,
    }

    impl_label_conversions!(TestSource {
        Cached => "cached",
        FullLogin => "full_login",
    });

    #[test]
    fn test_display_conversion() {
        assert_eq!(TestSource::Cached.to_string(), "cached");
        assert_eq!(TestSource::FullLogin.to_string(), "full_login");
    }

    #[test]
    fn test_fromstr_is_case_insensitive() {
        assert_eq!(TestSource::from_str("cached").unwrap(), TestSource::Cached);
        assert_eq!(TestSource::from_str("FULL_LOGIN").unwrap(), TestSource::FullLogin);
        assert_eq!(TestSource::from_str("  Cached ").unwrap(), TestSource::Cached);
    }

    /// Validates the error message for unknown labels.
    ///
    /// Assertions:
    /// - Ensures the error names the enum and echoes the rejected input.
    #[test]
    fn test_fromstr_invalid() {
        let err = TestSource::from_str("refreshed").unwrap_err();
        assert!(err.contains("TestSource"));
        assert!(err.contains("refreshed"));
    }
}
