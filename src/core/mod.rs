pub mod domain;
pub mod kgrid;
pub mod sample;
pub mod settings;
