//! Start/end framing around one chain's worth of encoded pixels.

/// Four zero bytes reset the chain's latch state.
pub const START_FRAME: [u8; 4] = [0x00; 4];

/// End-frame filler byte.
pub const END_FRAME_BYTE: u8 = 0xFF;

/// Number of `0xFF` bytes needed to clock `pixel_count` pixels through.
///
/// `ceil(n / 16)` is the documented safe upper bound for the chain's shift
/// registers and is part of the wire contract.
pub fn end_frame_len(pixel_count: usize) -> usize {
    pixel_count.div_ceil(16)
}

/// Exact byte length of a wrapped buffer holding `pixel_count` pixels.
pub fn framed_len(pixel_count: usize) -> usize {
    START_FRAME.len() + 4 * pixel_count + end_frame_len(pixel_count)
}

/// Wrap encoded pixels with the start and end frames.
pub fn wrap<I>(pixels: I) -> Vec<u8>
where
    I: IntoIterator<Item = [u8; 4]>,
    I::IntoIter: ExactSizeIterator,
{
    let pixels = pixels.into_iter();
    let count = pixels.len();
    let mut buf = Vec::with_capacity(framed_len(count));
    buf.extend_from_slice(&START_FRAME);
    for pixel in pixels {
        buf.extend_from_slice(&pixel);
    }
    buf.resize(buf.len() + end_frame_len(count), END_FRAME_BYTE);
    buf
}
