//! W3C Trace Context helpers

use rand::RngCore;

/// Generate a fresh W3C `traceparent` header value of the form
/// `00-<16-byte-hex>-<8-byte-hex>-01` (sampled flag always set).
pub fn new_traceparent() -> String {
    let mut trace_id = [0u8; 16];
    let mut span_id = [0u8; 8];
    let mut rng = rand::rng();
    rng.fill_bytes(&mut trace_id);
    rng.fill_bytes(&mut span_id);
    format!("00-{}-{}-01", hex::encode(trace_id), hex::encode(span_id))
}
