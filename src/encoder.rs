//! Error-correction encoding: version selection, bitstream assembly, Reed–Solomon and interleaving.

use crate::error::{QrError, Result};
use crate::qrcode::{QrCodeEcc, Version};
use crate::segment::{BitBuffer, QrSegment, SegmentPlans};

/// Knobs for [`encode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Requested error correction level.
    pub ecl: QrCodeEcc,
    /// Smallest version to consider.
    pub min_version: Version,
    /// Raise the level while the data still fits the chosen version.
    pub boost_ecl: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self { ecl: QrCodeEcc::Medium, min_version: Version::MIN, boost_ecl: false }
    }
}

/// Output of [`encode`]: everything the matrix builder needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedData {
    pub version: Version,
    /// Level actually used; lower than requested if the payload did not fit otherwise.
    pub ecl: QrCodeEcc,
    /// Data codewords before error correction, padded to capacity.
    pub data_codewords: Vec<u8>,
    /// Interleaved data and error correction codewords, in placement order.
    pub codewords: Vec<u8>,
}

/// Encodes segments into the final codeword sequence for the smallest fitting symbol.
///
/// Versions are scanned from `opts.min_version` up to 40 at the requested level. When nothing
/// fits, the level is lowered one step at a time; the error is only returned once version 40
/// at level Low is too small as well.
///
/// # Errors
///
/// [`QrError::CapacityExceeded`] when the payload cannot fit any symbol,
/// [`QrError::Internal`] if the assembled bitstream does not match the capacity tables.
pub fn encode(segs: &[QrSegment], opts: &EncodeOptions) -> Result<EncodedData> {
    encode_with(|_| segs, opts)
}

/// Segments and encodes `text`, using at each version the shortest segmentation for that
/// version's count-indicator widths.
///
/// Any text whose UTF-8 length fits a byte segment at some version and level fits here too.
///
/// # Errors
///
/// As [`encode`], plus [`QrError::EmptyInput`] for blank text.
pub fn encode_text(text: &str, opts: &EncodeOptions) -> Result<EncodedData> {
    let plans = SegmentPlans::new(text)?;
    encode_with(|version| plans.for_version(version), opts)
}

fn encode_with<'a, F>(segs_for: F, opts: &EncodeOptions) -> Result<EncodedData>
where
    F: Fn(Version) -> &'a [QrSegment],
{
    let mut ecl = opts.ecl;
    let (version, datausedbits) = loop {
        match find_version(&segs_for, ecl, opts.min_version) {
            Ok(found) => break found,
            Err(err) => match ecl.lower() {
                Some(lower) => {
                    tracing::warn!(
                        requested = %opts.ecl.letter(),
                        next = %lower.letter(),
                        "Payload too large for error correction level, lowering it"
                    );
                    ecl = lower;
                }
                None => return Err(err),
            },
        }
    };

    // Increase the error correction level while the data still fits
    for &newecl in &[QrCodeEcc::Medium, QrCodeEcc::Quartile, QrCodeEcc::High] {
        if opts.boost_ecl && newecl > ecl && datausedbits <= data_capacity_bits(version, newecl) {
            ecl = newecl;
        }
    }

    let segs = segs_for(version);
    let data_codewords = build_data_codewords(segs, version, ecl, datausedbits)?;
    let codewords = add_ecc_and_interleave(&data_codewords, version, ecl)?;
    tracing::debug!(
        version = version.value(),
        ecl = %ecl.letter(),
        segments = segs.len(),
        data_bits = datausedbits,
        codewords = codewords.len(),
        "Encoded payload"
    );
    Ok(EncodedData { version, ecl, data_codewords, codewords })
}

/// Finds the minimal version holding its segments at `ecl`, with the bits they use there.
fn find_version<'a, F>(
    segs_for: &F,
    ecl: QrCodeEcc,
    minversion: Version,
) -> Result<(Version, usize)>
where
    F: Fn(Version) -> &'a [QrSegment],
{
    let mut last_used = None;
    for version in minversion.up_to_max() {
        let datacapacitybits = data_capacity_bits(version, ecl);
        let dataused = QrSegment::get_total_bits(segs_for(version), version);
        if let Some(n) = dataused.filter(|&n| n <= datacapacitybits) {
            return Ok((version, n));
        }
        last_used = dataused;
    }
    Err(QrError::CapacityExceeded {
        data_bits: last_used,
        capacity_bits: data_capacity_bits(Version::MAX, ecl),
    })
}

/// Concatenates segments, terminator and padding into exactly `data_capacity_bits / 8` bytes.
fn build_data_codewords(
    segs: &[QrSegment],
    version: Version,
    ecl: QrCodeEcc,
    datausedbits: usize,
) -> Result<Vec<u8>> {
    let datacapacitybits = data_capacity_bits(version, ecl);
    let mut bb = BitBuffer::new();
    for seg in segs {
        bb.append_bits(seg.mode().mode_bits(), 4);
        bb.append_bits(seg.num_chars() as u32, seg.mode().num_char_count_bits(version));
        bb.append_buffer(seg.data());
    }
    if bb.len() != datausedbits {
        return Err(QrError::Internal(format!(
            "bitstream is {} bits, expected {}",
            bb.len(),
            datausedbits
        )));
    }

    // Add terminator and pad up to a byte if applicable
    let numzerobits = (datacapacitybits - bb.len()).min(4);
    bb.append_bits(0, numzerobits as u8);
    let numzerobits = bb.len().wrapping_neg() & 7;
    bb.append_bits(0, numzerobits as u8);

    // Pad with alternating bytes until data capacity is reached
    for &padbyte in [0xec, 0x11].iter().cycle() {
        if bb.len() >= datacapacitybits {
            break;
        }
        bb.append_bits(padbyte, 8);
    }
    if bb.len() != datacapacitybits {
        return Err(QrError::Internal(format!(
            "padded bitstream is {} bits, capacity is {}",
            bb.len(),
            datacapacitybits
        )));
    }
    Ok(bb.into_bytes())
}

/// Splits data into blocks, appends each block's Reed–Solomon remainder and interleaves them.
pub(crate) fn add_ecc_and_interleave(data: &[u8], ver: Version, ecl: QrCodeEcc) -> Result<Vec<u8>> {
    if data.len() != num_data_codewords(ver, ecl) {
        return Err(QrError::Internal(format!(
            "{} data codewords for version {} level {}, expected {}",
            data.len(),
            ver.value(),
            ecl.letter(),
            num_data_codewords(ver, ecl)
        )));
    }
    let numblocks: usize = table_get(&NUM_ERROR_CORRECTION_BLOCKS, ver, ecl);
    let blockecclen: usize = table_get(&ECC_CODEWORDS_PER_BLOCK, ver, ecl);
    let rawcodewords: usize = num_raw_data_modules(ver) / 8;
    let numshortblocks: usize = numblocks - rawcodewords % numblocks;
    let shortblockdatalen: usize = rawcodewords / numblocks - blockecclen;

    let rs = ReedSolomonGenerator::new(blockecclen);
    let mut blocks: Vec<(&[u8], Vec<u8>)> = Vec::with_capacity(numblocks);
    let mut rest: &[u8] = data;
    for i in 0..numblocks {
        let datlen = shortblockdatalen + usize::from(i >= numshortblocks);
        let (dat, tail) = rest.split_at(datlen);
        blocks.push((dat, rs.compute_remainder(dat)));
        rest = tail;
    }

    let mut result = Vec::with_capacity(rawcodewords);
    for i in 0..=shortblockdatalen {
        for (dat, _) in &blocks {
            if let Some(&b) = dat.get(i) {
                result.push(b);
            }
        }
    }
    for i in 0..blockecclen {
        for (_, ecc) in &blocks {
            result.push(ecc[i]);
        }
    }
    debug_assert_eq!(result.len(), rawcodewords);
    Ok(result)
}

/// Modules available for data and error correction once function patterns are drawn.
/// Includes the remainder bits, so it is not always a multiple of 8.
pub(crate) fn num_raw_data_modules(ver: Version) -> usize {
    let ver = usize::from(ver.value());
    let mut result: usize = (16 * ver + 128) * ver + 64;
    if ver >= 2 {
        let numalign: usize = ver / 7 + 2;
        result -= (25 * numalign - 10) * numalign - 55;
        if ver >= 7 {
            result -= 36;
        }
    }
    result
}

/// Number of zero remainder bits after the last codeword.
pub fn remainder_bits(ver: Version) -> usize {
    num_raw_data_modules(ver) % 8
}

/// Data codewords (excluding error correction) for a version and level.
pub fn num_data_codewords(ver: Version, ecl: QrCodeEcc) -> usize {
    let ecc_per_block = table_get(&ECC_CODEWORDS_PER_BLOCK, ver, ecl);
    let blocks = table_get(&NUM_ERROR_CORRECTION_BLOCKS, ver, ecl);
    num_raw_data_modules(ver) / 8 - ecc_per_block * blocks
}

/// Data capacity in bits for a version and level.
pub fn data_capacity_bits(ver: Version, ecl: QrCodeEcc) -> usize {
    num_data_codewords(ver, ecl) * 8
}

fn table_get(table: &'static [[i8; 41]; 4], ver: Version, ecl: QrCodeEcc) -> usize {
    table[ecl.ordinal()][usize::from(ver.value())] as usize
}

/// Computes Reed–Solomon remainders over GF(2^8/0x11D) for one fixed degree.
struct ReedSolomonGenerator {
    /// Generator polynomial coefficients, highest power first, leading 1 omitted.
    divisor: Vec<u8>,
}

impl ReedSolomonGenerator {
    fn new(degree: usize) -> Self {
        assert!((1..=255).contains(&degree), "Degree out of range");
        let mut divisor = vec![0u8; degree];
        divisor[degree - 1] = 1;
        // Multiply by (x - r^i) for i = 0..degree, where r = 0x02
        let mut root: u8 = 1;
        for _ in 0..degree {
            for j in 0..degree {
                divisor[j] = Self::multiply(divisor[j], root);
                if j + 1 < degree {
                    divisor[j] ^= divisor[j + 1];
                }
            }
            root = Self::multiply(root, 0x02);
        }
        Self { divisor }
    }

    fn compute_remainder(&self, data: &[u8]) -> Vec<u8> {
        let mut result = vec![0u8; self.divisor.len()];
        for b in data {
            let factor: u8 = b ^ result[0];
            result.rotate_left(1);
            let last = result.len() - 1;
            result[last] = 0;
            for (x, &y) in result.iter_mut().zip(self.divisor.iter()) {
                *x ^= Self::multiply(y, factor);
            }
        }
        result
    }

    fn multiply(x: u8, y: u8) -> u8 {
        let mut z: u8 = 0;
        for i in (0..8).rev() {
            z = (z << 1) ^ ((z >> 7) * 0x1d);
            z ^= ((y >> i) & 1) * x;
        }
        z
    }
}

static ECC_CODEWORDS_PER_BLOCK: [[i8; 41]; 4] = [
    [
        -1, 7, 10, 15, 20, 26, 18, 20, 24, 30, 18, 20, 24, 26, 30, 22, 24, 28, 30, 28, 28, 28, 28,
        30, 30, 26, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // Low
    [
        -1, 10, 16, 26, 18, 24, 16, 18, 22, 22, 26, 30, 22, 22, 24, 24, 28, 28, 26, 26, 26, 26, 28,
        28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28,
    ], // Medium
    [
        -1, 13, 22, 18, 26, 18, 24, 18, 22, 20, 24, 28, 26, 24, 20, 30, 24, 28, 28, 26, 30, 28, 30,
        30, 30, 30, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // Quartile
    [
        -1, 17, 28, 22, 16, 22, 28, 26, 26, 24, 28, 24, 28, 22, 24, 24, 30, 28, 28, 26, 28, 30, 24,
        30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // High
];

static NUM_ERROR_CORRECTION_BLOCKS: [[i8; 41]; 4] = [
    [
        -1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 4, 4, 4, 4, 4, 6, 6, 6, 6, 7, 8, 8, 9, 9, 10, 12, 12, 12, 13,
        14, 15, 16, 17, 18, 19, 19, 20, 21, 22, 24, 25,
    ], // Low
    [
        -1, 1, 1, 1, 2, 2, 4, 4, 4, 5, 5, 5, 8, 9, 9, 10, 10, 11, 13, 14, 16, 17, 17, 18, 20, 21,
        23, 25, 26, 28, 29, 31, 33, 35, 37, 38, 40, 43, 45, 47, 49,
    ], // Medium
    [
        -1, 1, 1, 2, 2, 4, 4, 6, 6, 8, 8, 8, 10, 12, 16, 12, 17, 16, 18, 21, 20, 23, 23, 25, 27, 29,
        34, 34, 35, 38, 40, 43, 45, 48, 51, 53, 56, 59, 62, 65, 68,
    ], // Quartile
    [
        -1, 1, 1, 2, 4, 4, 4, 5, 6, 8, 8, 11, 11, 16, 16, 18, 16, 19, 21, 25, 25, 25, 34, 30, 32,
        35, 37, 40, 42, 45, 48, 51, 54, 57, 60, 63, 66, 70, 74, 77, 81,
    ], // High
];
