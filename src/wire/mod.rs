//! # Wire Format Module
//!
//! Dependency-free encoding of measurement records for the collection endpoint.
//!
//! This module handles:
//! - The recursive `Value` grammar (null, numbers, booleans, strings, ordered maps, lists)
//! - Compact JSON text encoding with quote, backslash and control-character escaping
//! - Decoding persisted payloads back into `Value` trees

pub mod value;
pub mod encoder;
pub mod decoder;

pub use decoder::decode;
pub use encoder::{encode, to_bytes};
pub use value::{Scalar, Value};
