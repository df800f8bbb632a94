//! Matrix construction: function patterns, codeword placement, masking and penalty scoring.
//!
//! Patterns are always placed in the same order (finders, timing, alignment, format and version
//! areas) before any data bit, and every later step relies on the reservations made earlier.

use crate::encoder::{self, num_raw_data_modules};
use crate::error::{QrError, Result};
use crate::qrcode::{Mask, QrCode, QrCodeEcc, Version};

/// State of a single cell while the symbol is being assembled.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Module {
    /// Nothing written yet; format areas stay here until a mask is chosen.
    Unset,
    Light,
    Dark,
}

/// Working grid used by [`build`]. Tracks which cells belong to function patterns.
#[derive(Clone, Debug)]
pub struct ModuleGrid {
    version: Version,
    size: usize,
    cells: Vec<Module>,
    function: Vec<bool>,
}

/// Builds the final symbol for the given version, level and interleaved codewords.
///
/// The result is fully determined by its inputs; mask ties resolve to the lowest mask id.
///
/// # Errors
///
/// [`QrError::Internal`] if the codewords do not fill the data area exactly or a placement
/// would touch a reserved module.
pub fn build(version: Version, ecl: QrCodeEcc, codewords: &[u8]) -> Result<QrCode> {
    let mut grid = ModuleGrid::new(version);
    grid.draw_finder_patterns();
    grid.draw_timing_patterns();
    grid.draw_alignment_patterns();
    grid.reserve_format_areas();
    grid.draw_version_information();
    grid.draw_codewords(codewords)?;

    let mut penalties = [0i32; 8];
    for mask in Mask::all() {
        let mut candidate = grid.clone();
        candidate.apply_mask(mask);
        candidate.draw_format_bits(ecl, mask);
        penalties[usize::from(mask.value())] = candidate.penalty().total();
    }
    let mask = choose_mask(&penalties);
    tracing::debug!(mask = mask.value(), ?penalties, "Selected mask");

    grid.apply_mask(mask);
    grid.draw_format_bits(ecl, mask);
    grid.into_qrcode(ecl, mask)
}

/// Picks the mask with the lowest penalty; on a tie the lower id wins.
pub fn choose_mask(penalties: &[i32; 8]) -> Mask {
    let mut best = 0u8;
    for (i, &penalty) in penalties.iter().enumerate() {
        if penalty < penalties[usize::from(best)] {
            best = i as u8;
        }
    }
    Mask::new(best)
}

impl ModuleGrid {
    pub fn new(version: Version) -> Self {
        let size = version.size();
        Self {
            version,
            size,
            cells: vec![Module::Unset; size * size],
            function: vec![false; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, x: usize, y: usize) -> Module {
        self.cells[y * self.size + x]
    }

    fn is_dark(&self, x: usize, y: usize) -> bool {
        self.get(x, y) == Module::Dark
    }

    pub fn is_function(&self, x: usize, y: usize) -> bool {
        self.function[y * self.size + x]
    }

    fn set_function(&mut self, x: usize, y: usize, dark: bool) {
        let idx = y * self.size + x;
        self.function[idx] = true;
        self.cells[idx] = if dark { Module::Dark } else { Module::Light };
    }

    /// Reserves a cell without giving it a color yet.
    fn reserve(&mut self, x: usize, y: usize) {
        self.function[y * self.size + x] = true;
    }

    fn set_data(&mut self, x: usize, y: usize, dark: bool) -> Result<()> {
        let idx = y * self.size + x;
        if self.function[idx] {
            return Err(QrError::Internal(format!(
                "data bit placed on reserved module ({}, {})",
                x, y
            )));
        }
        if self.cells[idx] != Module::Unset {
            return Err(QrError::Internal(format!("data module ({}, {}) written twice", x, y)));
        }
        self.cells[idx] = if dark { Module::Dark } else { Module::Light };
        Ok(())
    }

    /// Finder patterns with their light separators, clipped at the symbol edge.
    fn draw_finder_patterns(&mut self) {
        let far = self.size as i32 - 4;
        for (cx, cy) in [(3, 3), (far, 3), (3, far)] {
            for dy in -4i32..=4 {
                for dx in -4i32..=4 {
                    let (x, y) = (cx + dx, cy + dy);
                    if (0..self.size as i32).contains(&x) && (0..self.size as i32).contains(&y) {
                        let dist = dx.abs().max(dy.abs());
                        self.set_function(x as usize, y as usize, dist != 2 && dist != 4);
                    }
                }
            }
        }
    }

    fn draw_timing_patterns(&mut self) {
        for i in 8..self.size - 8 {
            self.set_function(6, i, i % 2 == 0);
            self.set_function(i, 6, i % 2 == 0);
        }
    }

    fn draw_alignment_patterns(&mut self) {
        let positions = alignment_pattern_positions(self.version);
        let last = positions.len().saturating_sub(1);
        for (i, &pos0) in positions.iter().enumerate() {
            for (j, &pos1) in positions.iter().enumerate() {
                // The three corners are taken by finder patterns
                if (i == 0 && j == 0) || (i == 0 && j == last) || (i == last && j == 0) {
                    continue;
                }
                for dy in -2i32..=2 {
                    for dx in -2i32..=2 {
                        let x = (pos0 as i32 + dx) as usize;
                        let y = (pos1 as i32 + dy) as usize;
                        self.set_function(x, y, dx.abs().max(dy.abs()) != 1);
                    }
                }
            }
        }
    }

    /// Reserves both copies of the format information plus the always-dark module.
    fn reserve_format_areas(&mut self) {
        for (x, y) in format_positions(self.size).iter().flatten() {
            self.reserve(*x, *y);
        }
        self.set_function(8, self.size - 8, true);
    }

    fn draw_version_information(&mut self) {
        let Some(bits) = version_bits(self.version) else {
            return;
        };
        for i in 0..18 {
            let bit = get_bit(bits, i);
            let a = self.size - 11 + i % 3;
            let b = i / 3;
            self.set_function(a, b, bit);
            self.set_function(b, a, bit);
        }
    }

    fn draw_format_bits(&mut self, ecl: QrCodeEcc, mask: Mask) {
        let bits = format_bits(ecl, mask);
        for copy in format_positions(self.size) {
            for (i, (x, y)) in copy.into_iter().enumerate() {
                self.set_function(x, y, get_bit(bits, i));
            }
        }
    }

    /// Places codeword bits along the two-column zig-zag, skipping reserved modules.
    /// Modules left over after the last codeword are the light remainder bits.
    fn draw_codewords(&mut self, data: &[u8]) -> Result<()> {
        let expected = num_raw_data_modules(self.version);
        if data.len() * 8 + encoder::remainder_bits(self.version) != expected {
            return Err(QrError::Internal(format!(
                "{} codewords do not fill the {} data modules of version {}",
                data.len(),
                expected,
                self.version.value()
            )));
        }
        let size = self.size;
        let total = data.len() * 8;
        let mut i: usize = 0;
        let mut right = size - 1;
        while right >= 1 {
            if right == 6 {
                right = 5;
            }
            let upward = (right + 1) & 2 == 0;
            for vert in 0..size {
                let y = if upward { size - 1 - vert } else { vert };
                for x in [right, right - 1] {
                    if self.is_function(x, y) {
                        continue;
                    }
                    let dark = i < total && (data[i >> 3] >> (7 - (i & 7))) & 1 != 0;
                    self.set_data(x, y, dark)?;
                    i += 1;
                }
            }
            if right < 2 {
                break;
            }
            right -= 2;
        }
        if i != expected {
            return Err(QrError::Internal(format!(
                "placed {} data modules, expected {}",
                i, expected
            )));
        }
        Ok(())
    }

    /// XORs the mask into every non-function module. Applying it twice restores the grid.
    fn apply_mask(&mut self, mask: Mask) {
        for y in 0..self.size {
            for x in 0..self.size {
                if self.is_function(x, y) || !mask.inverts(x, y) {
                    continue;
                }
                let idx = y * self.size + x;
                self.cells[idx] = match self.cells[idx] {
                    Module::Dark => Module::Light,
                    Module::Light => Module::Dark,
                    Module::Unset => Module::Unset,
                };
            }
        }
    }

    /// Scores the grid with the four standard penalty rules.
    pub fn penalty(&self) -> Penalty {
        let size = self.size;
        let mut result = Penalty::default();

        for horizontal in [true, false] {
            for a in 0..size {
                let mut runcolor = false;
                let mut runlen: i32 = 0;
                let mut runhistory = FinderPenalty::new(size);
                for b in 0..size {
                    let color = if horizontal { self.is_dark(b, a) } else { self.is_dark(a, b) };
                    if color == runcolor {
                        runlen += 1;
                        if runlen == 5 {
                            result.runs += PENALTY_N1;
                        } else if runlen > 5 {
                            result.runs += 1;
                        }
                    } else {
                        runhistory.add_history(runlen);
                        if !runcolor {
                            result.finder_like += runhistory.count_patterns() * PENALTY_N3;
                        }
                        runcolor = color;
                        runlen = 1;
                    }
                }
                result.finder_like += runhistory.terminate_and_count(runcolor, runlen) * PENALTY_N3;
            }
        }

        for y in 0..size - 1 {
            for x in 0..size - 1 {
                let color = self.is_dark(x, y);
                if color == self.is_dark(x + 1, y)
                    && color == self.is_dark(x, y + 1)
                    && color == self.is_dark(x + 1, y + 1)
                {
                    result.blocks += PENALTY_N2;
                }
            }
        }

        let dark = self.cells.iter().filter(|&&m| m == Module::Dark).count() as i32;
        let total = (size * size) as i32;
        // Smallest k such that the dark share is within (45-5k)%..(55+5k)%
        let k = ((dark * 20 - total * 10).abs() + total - 1) / total - 1;
        result.balance = k * PENALTY_N4;
        result
    }

    fn into_qrcode(self, ecl: QrCodeEcc, mask: Mask) -> Result<QrCode> {
        let mut modules = Vec::with_capacity(self.cells.len());
        for (i, cell) in self.cells.iter().enumerate() {
            match cell {
                Module::Dark => modules.push(true),
                Module::Light => modules.push(false),
                Module::Unset => {
                    return Err(QrError::Internal(format!(
                        "module ({}, {}) left unset",
                        i % self.size,
                        i / self.size
                    )))
                }
            }
        }
        Ok(QrCode::from_modules(self.version, ecl, mask, modules))
    }
}

/// Penalty score split into its four rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Penalty {
    /// Runs of five or more same-colored modules in a row or column.
    pub runs: i32,
    /// 2×2 blocks of one color.
    pub blocks: i32,
    /// 1:1:3:1:1 patterns with a light border of four modules.
    pub finder_like: i32,
    /// Deviation of the dark share from 50%.
    pub balance: i32,
}

impl Penalty {
    pub fn total(&self) -> i32 {
        self.runs + self.blocks + self.finder_like + self.balance
    }
}

/// Sliding window of the last seven run lengths, used to spot finder-like patterns.
struct FinderPenalty {
    qr_size: i32,
    run_history: [i32; 7],
}

impl FinderPenalty {
    fn new(size: usize) -> Self {
        Self { qr_size: size as i32, run_history: [0; 7] }
    }

    fn add_history(&mut self, mut currentrunlength: i32) {
        if self.run_history[0] == 0 {
            // Light border outside the symbol counts as part of the first run
            currentrunlength += self.qr_size;
        }
        self.run_history.copy_within(0..6, 1);
        self.run_history[0] = currentrunlength;
    }

    fn count_patterns(&self) -> i32 {
        let rh = &self.run_history;
        let n = rh[1];
        i32::from(
            n > 0
                && rh[2] == n
                && rh[3] == n * 3
                && rh[4] == n
                && rh[5] == n
                && (rh[0] >= n * 4 || rh[6] >= n * 4),
        )
    }

    fn terminate_and_count(mut self, currentruncolor: bool, mut currentrunlength: i32) -> i32 {
        if currentruncolor {
            self.add_history(currentrunlength);
            currentrunlength = 0;
        }
        currentrunlength += self.qr_size;
        self.add_history(currentrunlength);
        self.count_patterns()
    }
}

const PENALTY_N1: i32 = 3;
const PENALTY_N2: i32 = 3;
const PENALTY_N3: i32 = 40;
const PENALTY_N4: i32 = 10;

/// Alignment pattern center coordinates, ascending. Empty for version 1.
pub fn alignment_pattern_positions(version: Version) -> Vec<usize> {
    let ver = usize::from(version.value());
    if ver == 1 {
        return Vec::new();
    }
    let numalign = ver / 7 + 2;
    let step = if ver == 32 { 26 } else { (ver * 4 + numalign * 2 + 1) / (numalign * 2 - 2) * 2 };
    let size = version.size();
    let mut result: Vec<usize> = (0..numalign - 1).map(|i| size - 7 - i * step).collect();
    result.push(6);
    result.reverse();
    result
}

/// The 15 module coordinates of each format information copy, bit 0 first.
fn format_positions(size: usize) -> [[(usize, usize); 15]; 2] {
    let mut first = [(0, 0); 15];
    let mut second = [(0, 0); 15];
    for i in 0..15 {
        first[i] = match i {
            0..=5 => (8, i),
            6 => (8, 7),
            7 => (8, 8),
            8 => (7, 8),
            _ => (14 - i, 8),
        };
        second[i] = if i < 8 { (size - 1 - i, 8) } else { (8, size - 15 + i) };
    }
    [first, second]
}

/// Level and mask with their BCH(15,5) remainder, XOR-masked with 0x5412.
pub fn format_bits(ecl: QrCodeEcc, mask: Mask) -> u32 {
    let data = u32::from((ecl.format_bits() << 3) | mask.value());
    let mut rem: u32 = data;
    for _ in 0..10 {
        rem = (rem << 1) ^ ((rem >> 9) * 0x537);
    }
    ((data << 10) | rem) ^ 0x5412
}

/// Version number with its BCH(18,6) remainder, `None` below version 7.
pub fn version_bits(version: Version) -> Option<u32> {
    let ver = u32::from(version.value());
    if ver < 7 {
        return None;
    }
    let mut rem: u32 = ver;
    for _ in 0..12 {
        rem = (rem << 1) ^ ((rem >> 11) * 0x1f25);
    }
    Some((ver << 12) | rem)
}

fn get_bit(x: u32, i: usize) -> bool {
    (x >> i) & 1 != 0
}
