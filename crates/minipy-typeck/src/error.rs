use std::fmt;

use minipy_ast::Span;

/// A type error. Checking is fail-fast, so at most one of these surfaces
/// per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeError {
    pub message: String,
    pub span: Option<Span>,
}

impl TypeError {
    pub fn new(message: impl Into<String>) -> TypeError {
        TypeError {
            message: message.into(),
            span: None,
        }
    }

    pub fn at(message: impl Into<String>, span: Span) -> TypeError {
        TypeError {
            message: message.into(),
            span: Some(span),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "[{}:{}] {}", span.start, span.end, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TypeError {}
