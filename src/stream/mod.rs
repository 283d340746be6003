//! Incremental parsing of streamed search responses.
//!
//! The search endpoint answers with a chunked body of `data: {json}` records
//! separated by newlines. Chunks are arbitrary: a record, or a single UTF-8
//! character, can be split across any number of them.
//!
//! # Example
//!
//! ```
//! use mediathek_core::stream::{LineFramer, ParsedRecord, StreamEvent, Utf8ChunkDecoder, parse_record};
//!
//! let mut decoder = Utf8ChunkDecoder::new();
//! let mut framer = LineFramer::new();
//! let mut lines = framer.push(&decoder.decode(b"data: {\"do"));
//! lines.extend(framer.push(&decoder.decode(b"ne\": true}\n")));
//!
//! assert_eq!(lines.len(), 1);
//! assert_eq!(parse_record(&lines[0]), ParsedRecord::Event(StreamEvent::Done));
//! ```

mod error;
mod framer;
mod ingestor;
mod record;

pub use error::SearchError;
pub use framer::{LineFramer, Utf8ChunkDecoder};
pub use ingestor::{
    DEFAULT_SEARCH_TIMEOUT, SearchOutcome, SearchStatus, SearchUpdate, StreamEnd, StreamIngestor,
};
pub use record::{DATA_PREFIX, ParsedRecord, StreamEvent, parse_record};
