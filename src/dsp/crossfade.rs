//! Linear crossfade shared by bed looping and narration stitching.

/// Gains `(outgoing, incoming)` at step `i` of an `len`-step crossfade.
///
/// The pair always sums to exactly 1. `len == 0` is a hard cut.
#[inline]
pub fn gains(i: usize, len: usize) -> (f32, f32) {
    if len == 0 {
        return (0.0, 1.0);
    }
    let incoming = (i.min(len) as f64 / len as f64) as f32;
    (1.0 - incoming, incoming)
}

/// Blend `incoming` over the first `incoming.len()` samples of `outgoing`,
/// in place.
pub fn blend(outgoing: &mut [f32], incoming: &[f32]) {
    let len = outgoing.len().min(incoming.len());
    for i in 0..len {
        let (g_out, g_in) = gains(i, len);
        outgoing[i] = outgoing[i] * g_out + incoming[i] * g_in;
    }
}
