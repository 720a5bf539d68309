// src/effects/mod.rs

pub mod compressor;
