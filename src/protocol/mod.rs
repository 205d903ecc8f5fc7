//! Protocol constants and header helpers shared by the encoder and decoder.
//!
//! - **[constants]** - Header names, metadata keys and wire literals
//! - **headers** - Parsing and formatting of framing-relevant header values

pub mod constants;
mod headers;

pub use headers::{
    basic_auth_value, ends_with_token, format_header_values, format_host, has_token,
    is_body_less_status, parse_chunk_size, parse_content_codings, parse_content_length,
    ContentCoding,
};
