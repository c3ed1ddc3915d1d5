mod file;

pub use file::{FileSource, SourceError};

/// Capability a downstream packetizer/transport drives a sample producer
/// through. Pull-based: the consumer calls `load_next_sample` and then reads
/// the current sample; nothing advances on its own.
pub trait SampleSource {
    fn start(&mut self);
    fn stop(&mut self);
    fn load_next_sample(&mut self);
    /// Current sample's Annex-B bitstream. Replaced wholesale by the next
    /// successful tick.
    fn sample(&self) -> &[u8];
    fn sample_time_us(&self) -> u64;
    fn sample_duration_us(&self) -> u64;
    /// Self-contained decodable prefix (cached SPS, PPS, IDR) for a consumer
    /// joining mid-stream.
    fn initial_nalus(&self) -> Vec<u8>;
}
