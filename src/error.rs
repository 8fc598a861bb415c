use thiserror::Error;

/// Everything that can abort a run. The section name and the offending token
/// travel with the error so the CLI diagnostics can point at the culprit.
#[derive(Debug, Error)]
pub enum ViprError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("usage: {0}")]
  Usage(&'static str),
  #[error("{section}: expected {expected}, read instead {found}")]
  Expected { section: &'static str, expected: String, found: String },
  #[error("{section}: bad number '{token}'")]
  BadNumber { section: &'static str, token: String },
  #[error("certificate format version {major}.{minor} unsupported")]
  Version { major: u32, minor: u32 },
  #[error("{section}: {msg}")]
  Semantic { section: &'static str, msg: String },
  #[error("{0}")]
  Logical(String),
}

pub type Result<T> = std::result::Result<T, ViprError>;

impl ViprError {
  pub fn expected(section: &'static str, expected: impl Into<String>, found: impl Into<String>) -> Self {
    ViprError::Expected { section, expected: expected.into(), found: found.into() }
  }

  pub fn semantic(section: &'static str, msg: impl Into<String>) -> Self {
    ViprError::Semantic { section, msg: msg.into() }
  }
}
