//! Invocation handlers, one per Lambda function. Each takes its
//! dependencies explicitly so the binaries can build AWS clients once.

pub mod receiver;
pub mod reporter;
pub mod sensor;
