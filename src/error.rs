use std::fmt;

/// Custom error type for dispatcher operations
/// Implements Clone for sending through channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// API key is missing for the completion endpoint
    MissingApiKey(String)
  , /// HTTP transport error
    HttpError(String)
  , /// Configuration store returned an error response
    StoreError(String)
  , /// Failed to parse a response
    ParseError(String)
  , /// Named prompt template is absent from the snapshot
    TemplateNotFound(String)
  , /// Every candidate backend failed
    AllBackendsFailed
    {   attempted: Vec<String>
      , last_failure: String
    }
  , /// Invalid configuration
    InvalidConfiguration(String)
  , /// Dispatcher task is gone
    Disconnected
  , /// Generic error
    Other(String)
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::MissingApiKey(what) => {
              write!(f, "Missing API key for: {}", what)
            }
          , Error::HttpError(msg) => {
              write!(f, "HTTP error: {}", msg)
            }
          , Error::StoreError(msg) => {
              write!(f, "Configuration store error: {}", msg)
            }
          , Error::ParseError(msg) => {
              write!(f, "Parse error: {}", msg)
            }
          , Error::TemplateNotFound(key) => {
              write!(f, "Prompt template not found: {}", key)
            }
          , Error::AllBackendsFailed { attempted, last_failure } => {
              write!(f,
                "All {} backends failed ({}); last failure: {}",
                attempted.len(),
                attempted.join(", "),
                last_failure
              )
            }
          , Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::Disconnected => {
              write!(f, "Dispatcher disconnected")
            }
          , Error::Other(msg) => {
              write!(f, "Error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error
{   fn from(s: String) -> Self
    {   Error::Other(s)
    }
}

impl From<&str> for Error
{   fn from(s: &str) -> Self
    {   Error::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn all_backends_failed_lists_attempted_names()
    {   let err = Error::AllBackendsFailed
        {   attempted: vec!["a".to_string(), "b".to_string()]
          , last_failure: "HTTP 503".to_string()
        };
        assert_eq!(
          err.to_string(),
          "All 2 backends failed (a, b); last failure: HTTP 503"
        );
    }

    #[test]
    fn string_converts_to_other()
    {   let err: Error = "boom".into();
        assert_eq!(err, Error::Other("boom".to_string()));
    }
}
