pub mod counter_source;
pub mod log_sink;
pub mod scale;

pub use counter_source::CounterSource;
pub use log_sink::LogSink;
pub use scale::Scale;
