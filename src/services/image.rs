use bytes::Bytes;

use crate::error::Result;

/// Seam for image transforms. Actual codecs are deployment-specific; the
/// pipeline treats every call as best-effort and records the outcome.
pub trait ImageProcessor: Send + Sync {
    /// Recompress or resize the payload
    fn optimize(&self, data: &Bytes, mime: &str) -> Result<Bytes>;

    /// Stamp a watermark onto the payload
    fn watermark(&self, data: &Bytes, mime: &str) -> Result<Bytes>;

    /// Produce a thumbnail at the given dimensions
    fn thumbnail(&self, data: &Bytes, mime: &str, width: u32, height: u32) -> Result<Bytes>;
}

/// Processor that returns payloads unchanged. Used where transforms are
/// handled out of band (e.g. by a CDN) and in tests.
pub struct PassthroughProcessor;

impl ImageProcessor for PassthroughProcessor {
    fn optimize(&self, data: &Bytes, _mime: &str) -> Result<Bytes> {
        Ok(data.clone())
    }

    fn watermark(&self, data: &Bytes, _mime: &str) -> Result<Bytes> {
        Ok(data.clone())
    }

    fn thumbnail(&self, data: &Bytes, _mime: &str, _width: u32, _height: u32) -> Result<Bytes> {
        Ok(data.clone())
    }
}
