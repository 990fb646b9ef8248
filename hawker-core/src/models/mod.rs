use std::error::Error;
use std::fmt;

pub mod leases;
pub mod listings;

/// A stored enum column held a value the models do not know about.
#[derive(Debug)]
pub struct UnknownVariant {
    pub column: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} value {:?}", self.column, self.value)
    }
}

impl Error for UnknownVariant {}
