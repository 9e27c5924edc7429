/// Maximum payload carried by a fast packet sequence
pub const MAX_FAST_PACKET_LEN: usize = 223;

/// Fragment a payload into CAN frames for transmission
///
/// Payloads of up to 8 bytes fit a single frame and are passed through
/// unchanged. Longer payloads are split into a fast packet sequence:
/// the first frame carries the sequence/frame counter byte, the total
/// length byte and 6 data bytes; every following frame carries the counter
/// byte and 7 data bytes, with the last frame padded to 8 bytes with 0xFF.
///
/// # Arguments
/// * `data` - The complete payload (at most [`MAX_FAST_PACKET_LEN`] bytes)
/// * `sequence` - Fast packet sequence counter (low 3 bits used)
pub fn fragment(data: &[u8], sequence: u8) -> Vec<Vec<u8>> {
    if data.len() <= 8 {
        return vec![data.to_vec()];
    }

    let seq = (sequence & 0x7) << 5;
    let mut frames = Vec::new();

    let mut first = Vec::with_capacity(8);
    first.push(seq);
    first.push(data.len() as u8);
    first.extend_from_slice(&data[..6]);
    frames.push(first);

    for (index, chunk) in data[6..].chunks(7).enumerate() {
        let mut frame = Vec::with_capacity(8);
        frame.push(seq | ((index as u8 + 1) & 0x1F));
        frame.extend_from_slice(chunk);
        while frame.len() < 8 {
            frame.push(0xFF);
        }
        frames.push(frame);
    }

    frames
}
