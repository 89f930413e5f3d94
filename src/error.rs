use std::fmt;

#[derive(Debug)]
pub enum CssDiffError {
    Fetch(String),
    Parse(String),
    ComputedStyle {
        element: String,
        message: String,
    },
    MissingDocumentElement(String),
    Io(std::io::Error),
}

impl fmt::Display for CssDiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CssDiffError::Fetch(message) => write!(f, "fetch error: {}", message),
            CssDiffError::Parse(message) => write!(f, "parse error: {}", message),
            CssDiffError::ComputedStyle { element, message } => {
                write!(f, "computed style error at <{}>: {}", element, message)
            }
            CssDiffError::MissingDocumentElement(backend) => {
                write!(f, "backend {} produced no document element", backend)
            }
            CssDiffError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for CssDiffError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CssDiffError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CssDiffError {
    fn from(value: std::io::Error) -> Self {
        CssDiffError::Io(value)
    }
}
