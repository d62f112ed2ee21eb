use thiserror::Error;

pub type GraphResult<T, E = CodeGraphError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum CodeGraphError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("tree-sitter error: {0}")]
    TreeSitter(#[from] tree_sitter::LanguageError),

    #[error("empty program has no root node")]
    EmptyProgram,

    #[error("language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("analysis `{name}` is not available for {lang}")]
    UnknownAnalysis { lang: String, name: String },

    #[error("syntax error at line {row}, column {col}")]
    Syntax { row: usize, col: usize },

    #[error("parser returned no tree")]
    ParseFailed,

    #[error("{0}")]
    Msg(String),
}

impl From<&str> for CodeGraphError {
    fn from(s: &str) -> Self {
        CodeGraphError::Msg(s.to_owned())
    }
}

impl From<String> for CodeGraphError {
    fn from(s: String) -> Self {
        CodeGraphError::Msg(s)
    }
}

#[test]
fn io_conversion_retains_message() {
    let e = std::io::Error::other("boom!");
    let err: CodeGraphError = e.into();
    assert!(matches!(err, CodeGraphError::Io(_)));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn syntax_error_carries_position() {
    let err = CodeGraphError::Syntax { row: 3, col: 7 };
    assert_eq!(err.to_string(), "syntax error at line 3, column 7");
}

#[test]
fn simple_string_into_msg() {
    let err: CodeGraphError = "plain msg".into();
    assert!(matches!(err, CodeGraphError::Msg(s) if s == "plain msg"));
}
