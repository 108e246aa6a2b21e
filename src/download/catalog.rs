// Quran Audio Core - Offline recitation downloads for mobile
// Copyright (C) 2025 Quran Audio Core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Surah catalog
//!
//! Ayah counts per surah (Hafs numbering). Surah numbers are 1-based.

/// Number of surahs in the mushaf
pub const SURAH_COUNT: u32 = 114;

/// Total ayahs across all surahs
pub const TOTAL_AYAHS: u32 = 6236;

const AYAH_COUNTS: [u32; SURAH_COUNT as usize] = [
    7, 286, 200, 176, 120, 165, 206, 75, 129, 109, 123, 111, 43, 52, 99, 128, 111, 110, 98, 135,
    112, 78, 118, 64, 77, 227, 93, 88, 69, 60, 34, 30, 73, 54, 45, 83, 182, 88, 75, 85, 54, 53,
    89, 59, 37, 35, 38, 29, 18, 45, 60, 49, 62, 55, 78, 96, 29, 22, 24, 13, 14, 11, 11, 18, 12,
    12, 30, 52, 52, 44, 28, 28, 20, 56, 40, 31, 50, 40, 46, 42, 29, 19, 36, 25, 22, 17, 19, 26,
    30, 20, 15, 21, 11, 8, 8, 19, 5, 8, 8, 11, 11, 8, 3, 9, 5, 4, 7, 3, 6, 3, 5, 4, 5, 6,
];

/// Ayah count for a surah, `None` outside 1..=114
pub fn ayah_count(surah: u32) -> Option<u32> {
    if surah == 0 {
        return None;
    }
    AYAH_COUNTS.get((surah - 1) as usize).copied()
}

/// All surah numbers in mushaf order
pub fn surah_numbers() -> impl Iterator<Item = u32> {
    1..=SURAH_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ayah_counts() {
        assert_eq!(ayah_count(1), Some(7));
        assert_eq!(ayah_count(2), Some(286));
        assert_eq!(ayah_count(114), Some(6));
        assert_eq!(ayah_count(0), None);
        assert_eq!(ayah_count(115), None);
    }

    #[test]
    fn test_catalog_total() {
        let total: u32 = surah_numbers().filter_map(ayah_count).sum();
        assert_eq!(total, TOTAL_AYAHS);
        assert_eq!(surah_numbers().count(), SURAH_COUNT as usize);
    }
}
