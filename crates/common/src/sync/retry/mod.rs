// Retry timing shared by the classifier and the drain loop

pub mod backoff;
pub mod constants;

pub use backoff::BackoffPolicy;
