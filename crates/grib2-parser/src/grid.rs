//! Scan order handling for GRIB2 grids.

/// Scan mode flags for grid data ordering.
///
/// Based on GRIB2 scanning mode (Flag Table 3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanMode {
    /// Points along a row run towards -x (west)
    pub i_negative: bool,
    /// Rows run towards +y (north)
    pub j_positive: bool,
    /// Adjacent points run along j (columns stored consecutively)
    pub j_consecutive: bool,
    /// Every other row is stored in reverse direction
    pub alternating_rows: bool,
}

impl ScanMode {
    /// Create from GRIB2 flag byte.
    pub fn from_grib2_flag(flag: u8) -> Self {
        Self {
            i_negative: (flag & 0x80) != 0,
            j_positive: (flag & 0x40) != 0,
            j_consecutive: (flag & 0x20) != 0,
            alternating_rows: (flag & 0x10) != 0,
        }
    }

    pub fn to_grib2_flag(&self) -> u8 {
        (self.i_negative as u8) << 7
            | (self.j_positive as u8) << 6
            | (self.j_consecutive as u8) << 5
            | (self.alternating_rows as u8) << 4
    }

    /// Position in the stored value array of grid point `(i, j)`, where
    /// `i` counts along the scan's i direction and `j` along its j direction.
    pub fn flat_index(&self, i: usize, j: usize, ni: usize, nj: usize) -> usize {
        if self.j_consecutive {
            let j = if self.alternating_rows && i % 2 == 1 { nj - 1 - j } else { j };
            i * nj + j
        } else {
            let i = if self.alternating_rows && j % 2 == 1 { ni - 1 - i } else { i };
            j * ni + i
        }
    }

    /// Reorder stored values into `nj` rows of `ni` points, in scan order.
    pub fn to_rows<T: Copy>(&self, values: &[T], ni: usize, nj: usize) -> Vec<T> {
        if !self.j_consecutive && !self.alternating_rows {
            return values.to_vec();
        }

        let mut rows = Vec::with_capacity(ni * nj);
        for j in 0..nj {
            for i in 0..ni {
                rows.push(values[self.flat_index(i, j, ni, nj)]);
            }
        }
        rows
    }
}
