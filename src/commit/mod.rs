pub mod apply;
pub mod assertions;
pub mod executor;
pub mod tx;
