//! Built-in LZF encoder and decoder.
//!
//! An LZF stream is a sequence of chunks, each starting with a control byte:
//! - `ctrl < 32`: a literal run of `ctrl + 1` bytes follows.
//! - `ctrl >= 32`: a back-reference. The top three bits hold the length (with an extra
//!   length byte when they are all set), the low five bits and the next byte hold the
//!   distance back into the output.

use super::LzfError;

/// Longest literal run a single control byte can describe.
const MAX_LITERAL: usize = 32;
/// Furthest back a reference can point.
const MAX_DISTANCE: usize = 1 << 13;
/// Longest match a single back-reference can copy.
const MAX_MATCH: usize = (7 + 255) + 2;
const MIN_MATCH: usize = 3;
const HASH_LOG: u32 = 14;
/// Most output bytes a single input byte can produce: a 3 byte reference copies 264 bytes.
pub const MAX_EXPANSION: usize = MAX_MATCH / 3;

/// Inflates an LZF stream into exactly `expected_len` bytes.
///
/// Decoding stops with [LzfError::OutputOverflow] as soon as a chunk would write past
/// `expected_len`.
pub fn decompress(input: &[u8], expected_len: usize) -> Result<Vec<u8>, LzfError> {
    let capacity = expected_len.min(input.len().saturating_mul(MAX_EXPANSION));
    let mut output = Vec::with_capacity(capacity);
    let mut pos = 0;

    while pos < input.len() {
        let ctrl = input[pos] as usize;
        let chunk_start = pos;
        pos += 1;

        if ctrl < 32 {
            let run = ctrl + 1;
            let literal = input
                .get(pos..pos + run)
                .ok_or_else(|| LzfError::CorruptStream {
                    offset: chunk_start,
                    reason: format!(
                        "literal run of {run} bytes but only {} bytes left",
                        input.len() - pos
                    ),
                })?;
            if output.len() + run > expected_len {
                return Err(LzfError::OutputOverflow {
                    expected: expected_len,
                });
            }
            output.extend_from_slice(literal);
            pos += run;
        } else {
            let mut length = ctrl >> 5;
            if length == 7 {
                length += next_byte(input, &mut pos, chunk_start)? as usize;
            }
            let distance = ((ctrl & 0x1f) << 8) + next_byte(input, &mut pos, chunk_start)? as usize + 1;
            let mut reference =
                output
                    .len()
                    .checked_sub(distance)
                    .ok_or_else(|| LzfError::CorruptStream {
                        offset: chunk_start,
                        reason: format!(
                            "back-reference {distance} bytes behind an output of {} bytes",
                            output.len()
                        ),
                    })?;
            if output.len() + length + 2 > expected_len {
                return Err(LzfError::OutputOverflow {
                    expected: expected_len,
                });
            }

            // source and destination may overlap, bytes written here can be read again
            for _ in 0..length + 2 {
                let byte = output[reference];
                output.push(byte);
                reference += 1;
            }
        }
    }

    if output.len() != expected_len {
        return Err(LzfError::LengthMismatch {
            expected: expected_len,
            actual: output.len(),
        });
    }
    Ok(output)
}

fn next_byte(input: &[u8], pos: &mut usize, chunk_start: usize) -> Result<u8, LzfError> {
    let byte = input
        .get(*pos)
        .copied()
        .ok_or_else(|| LzfError::CorruptStream {
            offset: chunk_start,
            reason: "back-reference truncated".to_string(),
        })?;
    *pos += 1;
    Ok(byte)
}

/// Compresses `input` into an LZF stream.
///
/// Matches are found through a single-slot hash table over 3-byte prefixes, so the
/// result is not optimal but is always accepted by [decompress] and other LZF decoders.
/// Incompressible input grows by one byte per 32.
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() + input.len() / MAX_LITERAL + 1);
    let mut table = vec![usize::MAX; 1 << HASH_LOG];
    let mut literal_start = 0;
    let mut pos = 0;

    while pos + MIN_MATCH <= input.len() {
        let slot = hash(&input[pos..pos + MIN_MATCH]);
        let candidate = table[slot];
        table[slot] = pos;

        let is_match = candidate != usize::MAX
            && pos - candidate <= MAX_DISTANCE
            && input[candidate..candidate + MIN_MATCH] == input[pos..pos + MIN_MATCH];
        if !is_match {
            pos += 1;
            continue;
        }

        let max_len = (input.len() - pos).min(MAX_MATCH);
        let mut len = MIN_MATCH;
        while len < max_len && input[candidate + len] == input[pos + len] {
            len += 1;
        }

        push_literals(&mut output, &input[literal_start..pos]);
        push_reference(&mut output, pos - candidate - 1, len);

        for skipped in pos + 1..pos + len {
            if skipped + MIN_MATCH <= input.len() {
                table[hash(&input[skipped..skipped + MIN_MATCH])] = skipped;
            }
        }
        pos += len;
        literal_start = pos;
    }

    push_literals(&mut output, &input[literal_start..]);
    output
}

fn hash(bytes: &[u8]) -> usize {
    let v = u32::from(bytes[0]) << 16 | u32::from(bytes[1]) << 8 | u32::from(bytes[2]);
    (v.wrapping_mul(2_654_435_761) >> (32 - HASH_LOG)) as usize
}

fn push_literals(output: &mut Vec<u8>, literals: &[u8]) {
    for run in literals.chunks(MAX_LITERAL) {
        output.push((run.len() - 1) as u8);
        output.extend_from_slice(run);
    }
}

/// `offset` is the distance minus one, `len` the number of bytes to copy.
fn push_reference(output: &mut Vec<u8>, offset: usize, len: usize) {
    let encoded_len = len - 2;
    let high = (offset >> 8) as u8;
    let low = (offset & 0xff) as u8;
    if encoded_len < 7 {
        output.push(((encoded_len as u8) << 5) | high);
    } else {
        output.push((7 << 5) | high);
        output.push((encoded_len - 7) as u8);
    }
    output.push(low);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_only() {
        assert_eq!(decompress(&[2, b'a', b'b', b'c'], 3).unwrap(), b"abc");
        assert_eq!(decompress(&[], 0).unwrap(), b"");
    }

    #[test]
    fn overlapping_back_reference() {
        // one literal byte repeated by a reference one byte behind
        assert_eq!(decompress(&[0, b'a', 0x20, 0x00], 4).unwrap(), b"aaaa");
        // long form: 7 + 1 extra gives 10 copied bytes
        assert_eq!(decompress(&[0, b'a', 0xE0, 0x01, 0x00], 11).unwrap(), [b'a'; 11]);
    }

    #[test]
    fn mixed_stream() {
        let stream = [2, b'a', b'b', b'c', 0x80, 0x02, 0, b'X'];
        assert_eq!(decompress(&stream, 10).unwrap(), b"abcabcabcX");
    }

    #[test]
    fn back_reference_with_high_distance_bits() {
        let literals: Vec<u8> = (0..320u32).map(|i| (i * 7 % 251) as u8).collect();
        let mut stream = Vec::new();
        for run in literals.chunks(32) {
            stream.push(31);
            stream.extend_from_slice(run);
        }
        // distance 300: offset 299 = 0x12b
        stream.extend_from_slice(&[0x21, 0x2b]);

        let output = decompress(&stream, 323).unwrap();
        assert_eq!(&output[..320], &literals[..]);
        assert_eq!(&output[320..], &literals[20..23]);
    }

    #[test]
    fn truncated_literal() {
        let result = decompress(&[5, b'a'], 6);
        assert!(matches!(
            result,
            Err(LzfError::CorruptStream { offset: 0, .. })
        ));
    }

    #[test]
    fn truncated_back_reference() {
        let result = decompress(&[0, b'a', 0xE0], 10);
        assert!(matches!(
            result,
            Err(LzfError::CorruptStream { offset: 2, .. })
        ));
    }

    #[test]
    fn reference_before_start() {
        let result = decompress(&[0x20, 0x00], 3);
        assert!(matches!(
            result,
            Err(LzfError::CorruptStream { offset: 0, .. })
        ));
    }

    #[test]
    fn length_mismatch() {
        assert_eq!(
            decompress(&[2, b'a', b'b', b'c'], 4),
            Err(LzfError::LengthMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn output_overflow_stops_early() {
        assert_eq!(
            decompress(&[2, b'a', b'b', b'c'], 2),
            Err(LzfError::OutputOverflow { expected: 2 })
        );
        assert_eq!(
            decompress(&[0, b'a', 0x20, 0x00], 2),
            Err(LzfError::OutputOverflow { expected: 2 })
        );

        // 10_000 long references would inflate to over 2.6 MB
        let mut stream = vec![0, b'a'];
        for _ in 0..10_000 {
            stream.extend_from_slice(&[0xE0, 0xFF, 0x00]);
        }
        assert_eq!(
            decompress(&stream, 12),
            Err(LzfError::OutputOverflow { expected: 12 })
        );
    }

    #[test]
    fn compress_repetitive_data() {
        let data = b"point cloud data point cloud data point cloud data point cloud data".repeat(20);
        let compressed = compress(&data);
        assert!(compressed.len() < data.len() / 4);
        assert_eq!(decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn compress_long_runs() {
        // longer than a single back-reference can describe
        let data = vec![0u8; 10_000];
        let compressed = compress(&data);
        assert!(compressed.len() < 200);
        assert_eq!(decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn compress_incompressible_data() {
        let mut state = 0x2545_f491_u32;
        let data: Vec<u8> = (0..5000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        let compressed = compress(&data);
        assert!(compressed.len() <= data.len() + data.len() / 32 + 1);
        assert_eq!(decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn compress_short_inputs() {
        for data in [&b""[..], b"a", b"ab", b"abc", b"aaaa"] {
            let compressed = compress(data);
            assert_eq!(decompress(&compressed, data.len()).unwrap(), data);
        }
    }
}
