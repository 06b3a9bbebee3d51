//! Shared utility functions for search-forge.
//!
//! This module provides common utilities used across multiple modules,
//! including JSON extraction from oracle responses.

pub mod json_extraction;

pub use json_extraction::{
    extract_json_candidate, find_matching_brace, find_matching_bracket, parse_json_payload,
};
