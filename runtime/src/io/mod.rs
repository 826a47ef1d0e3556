//! Work source and result sinks.

pub mod result_sink;
pub mod work_source;

pub use result_sink::{CsvSink, JsonlSink, ResultSink};
pub use work_source::{read_work_file, read_work_items};
