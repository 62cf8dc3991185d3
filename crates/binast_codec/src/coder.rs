//! The range coder.
//!
//! This is Dmitry Subbotin's carry-less range coder: 32-bit `low`/`range`
//! registers, byte-at-a-time renormalisation, no carry propagation. A byte
//! is emitted whenever the top byte of the coding interval has settled
//! (`low` and `low + range` agree in their top eight bits); when the range
//! underflows [`BOT`] without settling, it is clamped to the distance to
//! the next 16-bit boundary, trading a fraction of a bit of efficiency for
//! the guarantee that emitted bytes never need correction.
//!
//! The decoder tracks the encoder's `(low, range)` state exactly and runs
//! the identical renormalisation loop, so it consumes precisely one byte
//! per byte the encoder produced: after [`RangeEncoder::finish`] flushes
//! the four bytes of `low`, an encoded section is self-delimiting given the
//! token sequence, and the next section begins on a byte boundary.
//!
//! Symbols are coded as frequency bands `[cum, cum + freq)` out of a
//! distribution total, which must not exceed [`MAX_TOTAL`]; the model
//! layer rescales its distributions to honour that bound. A zero frequency
//! is never legal.

use std::io::{Read, Write};

use binast_base::{read_u8, Error, Result};

/// Renormalisation threshold: the top byte is settled below this.
const TOP: u32 = 1 << 24;

/// Range underflow bound, and the cap on distribution totals.
pub const MAX_TOTAL: u32 = 1 << 16;

/// Encodes frequency bands into a byte stream.
pub struct RangeEncoder<'a, W: Write + ?Sized> {
    out: &'a mut W,
    low: u32,
    range: u32,
}

impl<'a, W: Write + ?Sized> RangeEncoder<'a, W> {
    /// Creates an encoder writing to `out`.
    pub fn new(out: &'a mut W) -> Self {
        RangeEncoder {
            out,
            low: 0,
            range: u32::MAX,
        }
    }

    /// Narrows the interval to the band `[cum, cum + freq)` of `total`.
    ///
    /// The caller guarantees `freq > 0`, `cum + freq <= total` and
    /// `total <= MAX_TOTAL`; the model layer establishes all three.
    pub fn encode(&mut self, cum: u32, freq: u32, total: u32) -> Result<()> {
        debug_assert!(freq > 0 && cum + freq <= total && total <= MAX_TOTAL);
        let r = self.range / total;
        self.low = self.low.wrapping_add(r * cum);
        // The last band absorbs the division remainder.
        self.range = if cum + freq == total {
            self.range - r * cum
        } else {
            r * freq
        };
        self.normalize()
    }

    /// Flushes the four bytes of `low`, byte-aligning the stream.
    pub fn finish(mut self) -> Result<()> {
        for _ in 0..4 {
            self.out.write_all(&[(self.low >> 24) as u8])?;
            self.low <<= 8;
        }
        Ok(())
    }

    fn normalize(&mut self) -> Result<()> {
        loop {
            if (self.low ^ self.low.wrapping_add(self.range)) < TOP {
                // Top byte settled; fall through and emit it.
            } else if self.range < MAX_TOTAL {
                self.range = self.low.wrapping_neg() & (MAX_TOTAL - 1);
            } else {
                return Ok(());
            }
            self.out.write_all(&[(self.low >> 24) as u8])?;
            self.low <<= 8;
            self.range <<= 8;
        }
    }
}

/// Decodes frequency bands from a byte stream, mirroring [`RangeEncoder`].
pub struct RangeDecoder<'a, R: Read + ?Sized> {
    inp: &'a mut R,
    low: u32,
    range: u32,
    code: u32,
}

impl<'a, R: Read + ?Sized> RangeDecoder<'a, R> {
    /// Creates a decoder, priming `code` with four bytes from `inp`.
    pub fn new(inp: &'a mut R) -> Result<Self> {
        let mut code = 0u32;
        for _ in 0..4 {
            code = (code << 8) | u32::from(read_u8(inp)?);
        }
        Ok(RangeDecoder {
            inp,
            low: 0,
            range: u32::MAX,
            code,
        })
    }

    /// Returns the cumulative-frequency target the next symbol falls in,
    /// clamped to `total - 1`.
    ///
    /// The caller locates the band `[cum, cum + freq)` containing the
    /// target and confirms it with [`RangeDecoder::advance`].
    pub fn target(&mut self, total: u32) -> Result<u32> {
        if total == 0 || total > MAX_TOTAL {
            return Err(Error::model(
                "range coder",
                format!("distribution total {total} out of range"),
            ));
        }
        let r = self.range / total;
        Ok((self.code.wrapping_sub(self.low) / r).min(total - 1))
    }

    /// Replays the encoder's narrowing for the located band.
    pub fn advance(&mut self, cum: u32, freq: u32, total: u32) -> Result<()> {
        debug_assert!(freq > 0 && cum + freq <= total && total <= MAX_TOTAL);
        let r = self.range / total;
        self.low = self.low.wrapping_add(r * cum);
        self.range = if cum + freq == total {
            self.range - r * cum
        } else {
            r * freq
        };
        self.normalize()
    }

    fn normalize(&mut self) -> Result<()> {
        loop {
            if (self.low ^ self.low.wrapping_add(self.range)) < TOP {
                // Top byte settled; consume the byte the encoder emitted.
            } else if self.range < MAX_TOTAL {
                self.range = self.low.wrapping_neg() & (MAX_TOTAL - 1);
            } else {
                return Ok(());
            }
            self.code = (self.code << 8) | u32::from(read_u8(self.inp)?);
            self.low <<= 8;
            self.range <<= 8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Encodes a symbol sequence under (cum, freq, total) triples derived
    /// from `weights`, then decodes it back.
    fn roundtrip(weights: &[u32], symbols: &[usize]) -> Vec<u8> {
        let total: u32 = weights.iter().sum();
        let cums: Vec<u32> = weights
            .iter()
            .scan(0, |acc, w| {
                let c = *acc;
                *acc += w;
                Some(c)
            })
            .collect();

        let mut buf = Vec::new();
        let mut enc = RangeEncoder::new(&mut buf);
        for &s in symbols {
            enc.encode(cums[s], weights[s], total).unwrap();
        }
        enc.finish().unwrap();

        let mut inp = buf.as_slice();
        let mut dec = RangeDecoder::new(&mut inp).unwrap();
        for &s in symbols {
            let target = dec.target(total).unwrap();
            let found = cums
                .iter()
                .rposition(|&c| c <= target)
                .expect("target below every band");
            assert_eq!(found, s, "decoded the wrong symbol");
            dec.advance(cums[found], weights[found], total).unwrap();
        }
        assert!(inp.is_empty(), "decoder left {} bytes unread", inp.len());
        buf
    }

    #[test]
    fn empty_stream_is_four_flush_bytes() {
        let bytes = roundtrip(&[1], &[]);
        assert_eq!(bytes.len(), 4);
    }

    #[test]
    fn single_symbol_distribution_codes_for_free() {
        // One band covering the whole total narrows nothing.
        let bytes = roundtrip(&[7], &[0; 1000]);
        assert_eq!(bytes.len(), 4);
    }

    #[test]
    fn uniform_symbols_roundtrip() {
        let symbols: Vec<usize> = (0..500).map(|i| i % 4).collect();
        roundtrip(&[1, 1, 1, 1], &symbols);
    }

    #[test]
    fn skewed_symbols_cost_less_than_uniform_coding() {
        let symbols: Vec<usize> = (0..4000).map(|i| usize::from(i % 100 == 0)).collect();
        let bytes = roundtrip(&[99, 1], &symbols);
        // 4000 highly-predictable symbols must code well under one bit each.
        assert!(bytes.len() < 200, "got {} bytes", bytes.len());
    }

    #[test]
    fn random_sequences_roundtrip() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..50 {
            let n = rng.gen_range(1..12);
            let weights: Vec<u32> = (0..n).map(|_| rng.gen_range(1..2000)).collect();
            let len = rng.gen_range(0..400);
            let symbols: Vec<usize> = (0..len).map(|_| rng.gen_range(0..n)).collect();
            roundtrip(&weights, &symbols);
        }
    }

    #[test]
    fn maximal_total_roundtrips() {
        let weights = [MAX_TOTAL - 1, 1];
        let symbols = [0, 1, 0, 1, 1, 0];
        roundtrip(&weights, &symbols);
    }

    #[test]
    fn truncated_stream_is_a_format_mismatch() {
        let err = RangeDecoder::new(&mut [0u8, 1].as_slice()).unwrap_err();
        assert!(matches!(err, Error::FormatMismatch(_)));
    }

    #[test]
    fn zero_total_is_a_model_mismatch() {
        let buf = [0u8; 4];
        let mut inp = buf.as_slice();
        let mut dec = RangeDecoder::new(&mut inp).unwrap();
        assert!(matches!(dec.target(0), Err(Error::ModelMismatch { .. })));
    }
}
