use std::fmt;

#[derive(Debug)]
pub enum OrderError {
    Configuration(String),
    IOError(String),
    DatabaseError(String),
    ValidationError(String),
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            OrderError::IOError(msg) => write!(f, "I/O error: {msg}"),
            OrderError::DatabaseError(msg) => write!(f, "database error: {msg}"),
            OrderError::ValidationError(msg) => write!(f, "validation error: {msg}"),
        }
    }
}

impl std::error::Error for OrderError {}

impl From<std::io::Error> for OrderError {
    fn from(err: std::io::Error) -> Self {
        OrderError::IOError(err.to_string())
    }
}

impl From<sea_orm::DbErr> for OrderError {
    fn from(err: sea_orm::DbErr) -> Self {
        OrderError::DatabaseError(err.to_string())
    }
}
