//! Data segmentation: splitting text into numeric, alphanumeric and byte runs.
//!
//! Mode boundaries come from a greedy pass over character-class runs: neighbouring runs are
//! merged whenever the merged segment costs no more bits than the two apart. This is not the
//! globally optimal split (that needs a shortest-path search over mode switches) but it is close
//! for the short URLs and sentences this generator sees.

use crate::error::{QrError, Result};
use crate::qrcode::Version;

/// A segment of data in a QR code.
///
/// Holds the exact slice of input it covers, so concatenating the `text()` of all segments
/// returned by [`segment`] gives back the original string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QrSegment {
    mode: QrSegmentMode,
    text: String,
    numchars: usize,
    data: BitBuffer,
}

impl QrSegment {
    /// Creates a segment for text in byte mode; every UTF-8 byte becomes 8 bits.
    pub fn make_bytes(text: &str) -> Self {
        let mut bb = BitBuffer::new();
        for b in text.bytes() {
            bb.append_bits(u32::from(b), 8);
        }
        QrSegment::new(QrSegmentMode::Byte, text, text.len(), bb)
    }

    /// Creates a segment for a string of decimal digits in numeric mode.
    ///
    /// # Panics
    ///
    /// Panics if `text` contains non-digit characters.
    pub fn make_numeric(text: &str) -> Self {
        let mut bb = BitBuffer::new();
        let mut accumdata: u32 = 0;
        let mut accumcount: u8 = 0;
        for b in text.bytes() {
            assert!(b.is_ascii_digit(), "String contains non-numeric characters");
            accumdata = accumdata * 10 + u32::from(b - b'0');
            accumcount += 1;
            if accumcount == 3 {
                bb.append_bits(accumdata, 10);
                accumdata = 0;
                accumcount = 0;
            }
        }
        if accumcount > 0 {
            bb.append_bits(accumdata, accumcount * 3 + 1);
        }
        QrSegment::new(QrSegmentMode::Numeric, text, text.len(), bb)
    }

    /// Creates a segment for alphanumeric text.
    ///
    /// Allowed characters: 0–9, A–Z (uppercase), space, `$`, `%`, `*`, `+`, `-`, `.`, `/`, `:`.
    ///
    /// # Panics
    ///
    /// Panics if `text` contains invalid characters.
    pub fn make_alphanumeric(text: &str) -> Self {
        let mut bb = BitBuffer::new();
        let mut accumdata: u32 = 0;
        let mut accumcount: u8 = 0;
        for c in text.chars() {
            let i = ALPHANUMERIC_CHARSET
                .find(c)
                .expect("String contains unencodable characters in alphanumeric mode");
            accumdata = accumdata * 45 + i as u32;
            accumcount += 1;
            if accumcount == 2 {
                bb.append_bits(accumdata, 11);
                accumdata = 0;
                accumcount = 0;
            }
        }
        if accumcount > 0 {
            bb.append_bits(accumdata, 6);
        }
        QrSegment::new(QrSegmentMode::Alphanumeric, text, text.len(), bb)
    }

    fn new(mode: QrSegmentMode, text: &str, numchars: usize, data: BitBuffer) -> Self {
        Self { mode, text: text.to_owned(), numchars, data }
    }

    pub fn mode(&self) -> QrSegmentMode {
        self.mode
    }

    /// Value written into the character count indicator.
    pub fn num_chars(&self) -> usize {
        self.numchars
    }

    /// The slice of input this segment encodes.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn data(&self) -> &BitBuffer {
        &self.data
    }

    /// Total bits these segments take at `version`, headers included.
    ///
    /// Returns `None` if a segment has too many characters for its count indicator.
    pub(crate) fn get_total_bits(segs: &[Self], version: Version) -> Option<usize> {
        let mut result: usize = 0;
        for seg in segs {
            let ccbits: u8 = seg.mode.num_char_count_bits(version);
            if let Some(limit) = 1usize.checked_shl(ccbits.into()) {
                if seg.numchars >= limit {
                    return None;
                }
            }
            result = result.checked_add(4 + usize::from(ccbits))?;
            result = result.checked_add(seg.data.len())?;
        }
        Some(result)
    }
}

static ALPHANUMERIC_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

/// Encoding mode of a segment, ordered from most to least compact.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum QrSegmentMode {
    Numeric,
    Alphanumeric,
    Byte,
}

impl QrSegmentMode {
    /// Four-bit mode indicator.
    pub(crate) fn mode_bits(self) -> u32 {
        use QrSegmentMode::*;
        match self {
            Numeric => 0x1,
            Alphanumeric => 0x2,
            Byte => 0x4,
        }
    }

    pub(crate) fn num_char_count_bits(self, ver: Version) -> u8 {
        use QrSegmentMode::*;
        (match self {
            Numeric => [10, 12, 14],
            Alphanumeric => [9, 11, 13],
            Byte => [8, 16, 16],
        })[width_group(ver)]
    }

    /// Data bits (no header) for `numchars` characters in this mode.
    fn data_bits(self, numchars: usize) -> usize {
        use QrSegmentMode::*;
        match self {
            Numeric => (numchars * 10 + 2) / 3,
            Alphanumeric => (numchars * 11 + 1) / 2,
            Byte => numchars * 8,
        }
    }

    fn of_char(c: char) -> Self {
        if c.is_ascii_digit() {
            QrSegmentMode::Numeric
        } else if ALPHANUMERIC_CHARSET.contains(c) {
            QrSegmentMode::Alphanumeric
        } else {
            QrSegmentMode::Byte
        }
    }
}

/// A contiguous byte range of the input and the mode it will be encoded in.
#[derive(Clone, Copy, Debug)]
struct Run {
    mode: QrSegmentMode,
    start: usize,
    end: usize,
}

impl Run {
    /// Header plus data bits, using the count widths of `version`.
    fn cost(&self, text: &str, version: Version) -> usize {
        let slice = &text[self.start..self.end];
        let numchars = match self.mode {
            QrSegmentMode::Byte => slice.len(),
            _ => slice.chars().count(),
        };
        4 + usize::from(self.mode.num_char_count_bits(version)) + self.mode.data_bits(numchars)
    }

    fn merge(&self, next: &Run) -> Run {
        Run { mode: self.mode.max(next.mode), start: self.start, end: next.end }
    }
}

/// Splits `text` into an ordered list of segments covering it exactly.
///
/// Mode switches are priced with the count-indicator widths of versions 1–9.
///
/// # Errors
///
/// [`QrError::EmptyInput`] when the text is empty after trimming whitespace.
pub fn segment(text: &str) -> Result<Vec<QrSegment>> {
    segment_for(text, Version::MIN)
}

/// Same as [`segment`], pricing mode switches with the count-indicator widths of `version`.
pub fn segment_for(text: &str, version: Version) -> Result<Vec<QrSegment>> {
    if text.trim().is_empty() {
        return Err(QrError::EmptyInput);
    }

    let mut runs: Vec<Run> = Vec::new();
    for (i, c) in text.char_indices() {
        let mode = QrSegmentMode::of_char(c);
        match runs.last_mut() {
            Some(last) if last.mode == mode => last.end = i + c.len_utf8(),
            _ => runs.push(Run { mode, start: i, end: i + c.len_utf8() }),
        }
    }

    let mut changed = true;
    while changed {
        changed = false;
        let mut i = 0;
        while i + 1 < runs.len() {
            let merged = runs[i].merge(&runs[i + 1]);
            let split = runs[i].cost(text, version) + runs[i + 1].cost(text, version);
            if merged.cost(text, version) <= split {
                runs[i] = merged;
                runs.remove(i + 1);
                changed = true;
            } else {
                i += 1;
            }
        }
    }

    let segs: Vec<QrSegment> = runs
        .iter()
        .map(|run| {
            let slice = &text[run.start..run.end];
            match run.mode {
                QrSegmentMode::Numeric => QrSegment::make_numeric(slice),
                QrSegmentMode::Alphanumeric => QrSegment::make_alphanumeric(slice),
                QrSegmentMode::Byte => QrSegment::make_bytes(slice),
            }
        })
        .collect();
    tracing::debug!(
        version = version.value(),
        segments = segs.len(),
        modes = ?segs.iter().map(QrSegment::mode).collect::<Vec<_>>(),
        "Segmented input"
    );
    Ok(segs)
}

/// Index of the count-indicator width group of `ver`: versions 1–9, 10–26 and 27–40.
fn width_group(ver: Version) -> usize {
    usize::from((ver.value() + 7) / 17)
}

/// Candidate segmentations of one text, one per count-indicator width group, plus the whole
/// text as a single byte segment.
///
/// Greedy merging can lose to a single byte segment at large versions, so every lookup takes
/// whichever of the two is shorter there.
#[derive(Clone, Debug)]
pub struct SegmentPlans {
    greedy: [Vec<QrSegment>; 3],
    bytes: Vec<QrSegment>,
}

impl SegmentPlans {
    /// # Errors
    ///
    /// [`QrError::EmptyInput`] when the text is empty after trimming whitespace.
    pub fn new(text: &str) -> Result<Self> {
        let greedy = [
            segment_for(text, Version::new(1))?,
            segment_for(text, Version::new(10))?,
            segment_for(text, Version::new(27))?,
        ];
        Ok(Self { greedy, bytes: vec![QrSegment::make_bytes(text)] })
    }

    /// The shortest candidate at `version`.
    pub fn for_version(&self, version: Version) -> &[QrSegment] {
        let greedy = &self.greedy[width_group(version)];
        let greedy_bits = QrSegment::get_total_bits(greedy, version);
        let bytes_bits = QrSegment::get_total_bits(&self.bytes, version);
        match (greedy_bits, bytes_bits) {
            (Some(g), Some(b)) if b < g => &self.bytes,
            (None, Some(_)) => &self.bytes,
            _ => greedy,
        }
    }
}

/// Append-only sequence of bits, most significant bit first within each byte.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitBuffer {
    data: Vec<u8>,
    length: usize,
}

impl BitBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits appended so far.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Appends the low `len` bits of `val`, high bit first.
    pub fn append_bits(&mut self, val: u32, len: u8) {
        assert!(len <= 31 && (val >> len) == 0);
        for i in (0..len).rev() {
            if self.length & 7 == 0 {
                self.data.push(0);
            }
            let bit = ((val >> i) & 1) as u8;
            self.data[self.length >> 3] |= bit << (7 - (self.length & 7));
            self.length += 1;
        }
    }

    /// Bit at position `i`, counted from the start of the buffer.
    pub fn get(&self, i: usize) -> bool {
        assert!(i < self.length);
        (self.data[i >> 3] >> (7 - (i & 7))) & 1 != 0
    }

    pub fn append_buffer(&mut self, other: &BitBuffer) {
        for i in 0..other.len() {
            self.append_bits(u32::from(other.get(i)), 1);
        }
    }

    /// The packed bytes; the last one is zero-padded when the length is not a multiple of 8.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
