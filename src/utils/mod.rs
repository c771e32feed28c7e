pub mod cluster;

pub mod convert;
