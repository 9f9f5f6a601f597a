pub mod clock;
pub mod config;
pub mod constants;
pub mod digest;
pub mod errors;
pub mod logging;
pub mod model;
pub mod permutation;
pub mod protocol;
