// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! FLAC subframe decoding per RFC 9639 §9.2: CONSTANT, VERBATIM, FIXED
//! predictors of order 0-4, and LPC predictors of order 1-32.

use waveframe_core::error::{Error, Result};
use waveframe_core::io::bitstream::BitstreamReader;

const FIXED_COEFFICIENTS: [&[i64]; 5] = [
    &[],
    &[1],
    &[2, -1],
    &[3, -3, 1],
    &[4, -6, 4, -1],
];

/// Streamable-subset LPC order ceiling at sample rates <= 48 kHz (RFC 9639
/// §9.2.6); higher orders are only valid outside the streamable subset.
const STREAMABLE_MAX_LPC_ORDER: u32 = 12;
const STREAMABLE_MAX_RATE_FOR_ORDER_LIMIT: u32 = 48_000;

/// True if an LPC subframe of `order` at `sample_rate` stays within the
/// streamable subset. Non-subset streams still decode; this is informational
/// only, surfaced through [`DecodedSubframe::within_streamable_subset`].
fn is_streamable_lpc_order(order: u32, sample_rate: u32) -> bool {
    sample_rate > STREAMABLE_MAX_RATE_FOR_ORDER_LIMIT || order <= STREAMABLE_MAX_LPC_ORDER
}

/// Result of decoding one subframe: the reconstructed samples plus whether
/// an LPC predictor order exceeded the streamable-subset ceiling.
pub struct DecodedSubframe {
    pub samples: Vec<i64>,
    pub within_streamable_subset: bool,
}

#[derive(Debug, Clone, Copy)]
enum SubframeKind {
    Constant,
    Verbatim,
    Fixed(u32),
    Lpc(u32),
}

fn decode_subframe_type(code: u32) -> Result<SubframeKind> {
    match code {
        0b000000 => Ok(SubframeKind::Constant),
        0b000001 => Ok(SubframeKind::Verbatim),
        0x08..=0x0C => Ok(SubframeKind::Fixed(code - 0x08)),
        0x20..=0x3F => Ok(SubframeKind::Lpc(code - 0x20 + 1)),
        _ => Err(Error::BadFormat("reserved subframe type code")),
    }
}

/// Decodes one subframe's `block_size` samples at `bit_depth` bits (already
/// widened by one for side channels by the caller), returning signed
/// residual-scale samples (i.e. not yet bit-depth-converted to i16).
pub fn decode_subframe(
    reader: &mut BitstreamReader,
    block_size: u32,
    bit_depth: u32,
    sample_rate: u32,
) -> Result<DecodedSubframe> {
    if reader.read_bit()? {
        return Err(Error::BadFormat("reserved subframe header bit is set"));
    }
    let type_code = reader.read_bits(6)?;
    let kind = decode_subframe_type(type_code)?;
    let has_wasted_bits = reader.read_bit()?;
    let wasted_bits = if has_wasted_bits { reader.read_unary()? + 1 } else { 0 };
    let effective_depth = bit_depth.saturating_sub(wasted_bits);
    if effective_depth == 0 {
        return Err(Error::BadFormat("wasted bits consumed entire sample depth"));
    }

    let mut within_streamable_subset = true;
    let mut samples = match kind {
        SubframeKind::Constant => {
            let value = reader.read_bits_signed(effective_depth)? as i64;
            vec![value; block_size as usize]
        }
        SubframeKind::Verbatim => {
            let mut out = Vec::with_capacity(block_size as usize);
            for _ in 0..block_size {
                out.push(reader.read_bits_signed(effective_depth)? as i64);
            }
            out
        }
        SubframeKind::Fixed(order) => decode_fixed(reader, order, block_size, effective_depth)?,
        SubframeKind::Lpc(order) => {
            within_streamable_subset = is_streamable_lpc_order(order, sample_rate);
            decode_lpc(reader, order, block_size, effective_depth)?
        }
    };

    if wasted_bits > 0 {
        for sample in samples.iter_mut() {
            *sample <<= wasted_bits;
        }
    }
    Ok(DecodedSubframe { samples, within_streamable_subset })
}

fn decode_fixed(reader: &mut BitstreamReader, order: u32, block_size: u32, depth: u32) -> Result<Vec<i64>> {
    let mut warmup = Vec::with_capacity(order as usize);
    for _ in 0..order {
        warmup.push(reader.read_bits_signed(depth)? as i64);
    }
    let residual = decode_residual(reader, block_size, order)?;

    let coeffs = FIXED_COEFFICIENTS[order as usize];
    let mut out = warmup;
    out.reserve(residual.len());
    for (i, &res) in residual.iter().enumerate() {
        let n = out.len();
        let mut predicted: i64 = 0;
        for (tap, &coeff) in coeffs.iter().enumerate() {
            predicted += coeff * out[n - 1 - tap];
        }
        out.push(predicted + res);
        let _ = i;
    }
    Ok(out)
}

fn decode_lpc(reader: &mut BitstreamReader, order: u32, block_size: u32, depth: u32) -> Result<Vec<i64>> {
    let mut warmup = Vec::with_capacity(order as usize);
    for _ in 0..order {
        warmup.push(reader.read_bits_signed(depth)? as i64);
    }
    let precision_code = reader.read_bits(4)?;
    if precision_code == 0b1111 {
        return Err(Error::BadFormat("reserved LPC precision code"));
    }
    let precision = precision_code + 1;
    let shift = reader.read_bits_signed(5)?;
    if shift < 0 {
        return Err(Error::BadFormat("negative LPC shift is reserved"));
    }
    let mut coeffs = Vec::with_capacity(order as usize);
    for _ in 0..order {
        coeffs.push(reader.read_bits_signed(precision)? as i64);
    }

    let residual = decode_residual(reader, block_size, order)?;

    let mut out = warmup;
    out.reserve(residual.len());
    for &res in residual.iter() {
        let n = out.len();
        let mut acc: i64 = 0;
        for (tap, &coeff) in coeffs.iter().enumerate() {
            acc += coeff * out[n - 1 - tap];
        }
        let predicted = acc >> shift;
        out.push(predicted + res);
    }
    Ok(out)
}

/// Decodes a residual block: a 2-bit coding method, 4-bit partition order,
/// then `2^order` Rice-coded (or raw-escaped) partitions.
fn decode_residual(reader: &mut BitstreamReader, block_size: u32, predictor_order: u32) -> Result<Vec<i64>> {
    let method = reader.read_bits(2)?;
    let param_bits = match method {
        0 => 4,
        1 => 5,
        _ => return Err(Error::BadFormat("reserved residual coding method")),
    };
    let escape_code = (1u32 << param_bits) - 1;
    let partition_order = reader.read_bits(4)?;
    if partition_order > 8 {
        return Err(Error::BadFormat("residual partition order exceeds maximum of 8"));
    }
    let partitions = 1u32 << partition_order;
    if partition_order > 0 && block_size % partitions != 0 {
        return Err(Error::BadFormat("block size not divisible by residual partition count"));
    }
    let samples_per_partition = block_size / partitions;
    if samples_per_partition <= predictor_order {
        return Err(Error::BadFormat("residual partition too small for predictor order"));
    }

    let mut out = Vec::with_capacity(block_size as usize - predictor_order as usize);
    for partition in 0..partitions {
        let partition_samples = if partition == 0 {
            samples_per_partition - predictor_order
        } else {
            samples_per_partition
        };
        let param = reader.read_bits(param_bits)?;
        if param == escape_code {
            let raw_bits = reader.read_bits(5)?;
            if raw_bits == 0 {
                out.extend(std::iter::repeat(0i64).take(partition_samples as usize));
            } else {
                for _ in 0..partition_samples {
                    out.push(reader.read_bits_signed(raw_bits)? as i64);
                }
            }
        } else {
            for _ in 0..partition_samples {
                out.push(reader.read_rice(param)? as i64);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_from_bits(bits: &[(u32, u32)]) -> BitstreamReader {
        // Packs (value, width) pairs MSB-first into bytes for test fixtures.
        let mut acc: u64 = 0;
        let mut acc_bits = 0u32;
        let mut bytes = Vec::new();
        for &(value, width) in bits {
            acc = (acc << width) | (value as u64 & ((1u64 << width) - 1).max(1));
            acc_bits += width;
            while acc_bits >= 8 {
                let shift = acc_bits - 8;
                bytes.push(((acc >> shift) & 0xFF) as u8);
                acc_bits -= 8;
            }
        }
        if acc_bits > 0 {
            bytes.push(((acc << (8 - acc_bits)) & 0xFF) as u8);
        }
        let mut r = BitstreamReader::new();
        r.feed(&bytes);
        r
    }

    #[test]
    fn decode_subframe_type_table() {
        assert!(matches!(decode_subframe_type(0).unwrap(), SubframeKind::Constant));
        assert!(matches!(decode_subframe_type(1).unwrap(), SubframeKind::Verbatim));
        assert!(matches!(decode_subframe_type(0x0A).unwrap(), SubframeKind::Fixed(2)));
        assert!(matches!(decode_subframe_type(0x22).unwrap(), SubframeKind::Lpc(3)));
        assert!(decode_subframe_type(0x07).is_err());
    }

    #[test]
    fn constant_subframe_fills_block() {
        // header: 0 (pad) | 000000 (constant) | 0 (no wasted bits) | value(8 bits, depth 8)
        let mut r = reader_from_bits(&[(0, 1), (0b000000, 6), (0, 1), (0x7F, 8)]);
        let decoded = decode_subframe(&mut r, 4, 8, 44_100).unwrap();
        assert_eq!(decoded.samples, vec![0x7F_i64; 4]);
    }

    #[test]
    fn fixed_order_zero_is_identity_plus_residual() {
        // order-0 fixed predictor: residual IS the sample sequence (no warmup).
        let mut r = reader_from_bits(&[
            (0, 1),
            (0x08, 6), // fixed order 0
            (0, 1),    // no wasted bits
            // residual: method=0 (4-bit rice params), partition_order=0
            (0, 2),
            (0, 4),
            (0, 4), // rice parameter 0 for the single partition
            // one rice-coded value, zigzag-folded 2 => value 1
            (0b001, 3), // unary 00 + terminator 1 => quotient 2, param=0 remainder none -> value folded=2 -> 1
        ]);
        let decoded = decode_subframe(&mut r, 1, 8, 44_100).unwrap();
        assert_eq!(decoded.samples.len(), 1);
        assert_eq!(decoded.samples[0], 1);
    }
}
