// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::plane::{Plane, PlaneMutSlice, PlaneOffset, PlaneSlice};
use crate::tables::*;
use crate::util::{
  clamp, round_shift, CastFromPrimitive, Fixed, Pixel, PixelType,
};

use log::debug;
use std::cmp;
use std::ops::{Index, IndexMut};

pub const RESTORATION_TILESIZE_MAX_LOG2: usize = 8;
pub const RESTORATION_UNITSIZE_MAX: usize = 1 << RESTORATION_TILESIZE_MAX_LOG2;
// A unit bordering the right or bottom edge of the plane absorbs any
// remainder smaller than half a unit, so a stretched unit is at most 3/2
// the nominal size in either direction.
pub const RESTORATION_UNIT_STRETCH_MAX: usize =
  RESTORATION_UNITSIZE_MAX * 3 / 2;
pub const RESTORATION_TILEPELS_MAX: usize =
  RESTORATION_UNIT_STRETCH_MAX * RESTORATION_UNIT_STRETCH_MAX;

// Filter taps reach radius + 1 pixels past the unit on every side, counting
// the coefficient halo, so the caller must keep this many valid samples
// around each unit.
pub const SGRPROJ_BORDER_HORZ: usize = 3;
pub const SGRPROJ_BORDER_VERT: usize = 3;

pub const SGRPROJ_PARAMS_BITS: usize = 4;
pub const SGRPROJ_XQD_MIN: [i8; 2] = [-96, -32];
pub const SGRPROJ_XQD_MID: [i8; 2] = [-32, 31];
pub const SGRPROJ_XQD_MAX: [i8; 2] = [31, 95];

/// One transmitted parameter set: a box radius and a regularization
/// strength for each of the two passes. A strength of 0 disables the pass;
/// radius 0 shrinks the box statistics to the single-pixel window.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SgrParams {
  pub r1: usize,
  pub e1: u32,
  pub r2: usize,
  pub e2: u32,
}

#[rustfmt::skip]
pub const SGR_PARAMS: [SgrParams; 1 << SGRPROJ_PARAMS_BITS] = [
  SgrParams { r1: 2, e1: 12, r2: 1, e2:  4 },
  SgrParams { r1: 2, e1: 15, r2: 1, e2:  6 },
  SgrParams { r1: 2, e1: 18, r2: 1, e2:  8 },
  SgrParams { r1: 2, e1: 21, r2: 1, e2:  9 },
  SgrParams { r1: 2, e1: 24, r2: 1, e2: 10 },
  SgrParams { r1: 2, e1: 29, r2: 1, e2: 11 },
  SgrParams { r1: 2, e1: 36, r2: 1, e2: 12 },
  SgrParams { r1: 2, e1: 45, r2: 1, e2: 13 },
  SgrParams { r1: 2, e1: 56, r2: 1, e2: 14 },
  SgrParams { r1: 2, e1: 68, r2: 1, e2: 15 },
  SgrParams { r1: 0, e1:  0, r2: 1, e2:  5 },
  SgrParams { r1: 0, e1:  0, r2: 1, e2:  8 },
  SgrParams { r1: 0, e1:  0, r2: 1, e2: 11 },
  SgrParams { r1: 0, e1:  0, r2: 1, e2: 14 },
  SgrParams { r1: 2, e1: 30, r2: 0, e2:  0 },
  SgrParams { r1: 2, e1: 75, r2: 0, e2:  0 },
];

/// The restoration choice for one unit, with its already-decoded
/// parameters. Signaling and parameter search happen elsewhere.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RestorationFilter {
  #[default]
  None,
  Sgrproj {
    set: u8,
    xqd: [i8; 2],
  },
}

// Scratch buffer geometry for the largest stretched unit. The stride is
// rounded up past the data width; leaving slack between rows avoids the
// worst cache aliasing and keeps row starts aligned for wide loads.
const SGRPROJ_BUF_STRIDE_MAX: usize =
  (RESTORATION_UNIT_STRETCH_MAX + 2 * SGRPROJ_BORDER_HORZ + 16 + 7) & !7;
const INTEGRAL_ROWS_MAX: usize =
  RESTORATION_UNIT_STRETCH_MAX + 2 * SGRPROJ_BORDER_VERT + 1;
const COEFF_ROWS_MAX: usize = RESTORATION_UNIT_STRETCH_MAX + 2;

/// Running-sum images over the border-extended source of one unit: one
/// summing samples, one summing their squares. Row 0 and column 0 are kept
/// at zero so every window query can use the four-corner difference.
struct IntegralImages {
  sums: Vec<u32>,
  sq_sums: Vec<u32>,
  stride: usize,
}

impl IntegralImages {
  fn new() -> Self {
    IntegralImages {
      sums: vec![0; SGRPROJ_BUF_STRIDE_MAX * INTEGRAL_ROWS_MAX],
      sq_sums: vec![0; SGRPROJ_BUF_STRIDE_MAX * INTEGRAL_ROWS_MAX],
      stride: SGRPROJ_BUF_STRIDE_MAX,
    }
  }

  /// Builds both images from `width_ext x height_ext` samples at `ext`,
  /// which points at the top-left of the border-extended region.
  fn build<T: Pixel>(
    &mut self, ext: &PlaneSlice<'_, T>, width_ext: usize, height_ext: usize,
    stride: usize,
  ) {
    debug_assert!(width_ext < stride);
    debug_assert!((height_ext + 1) * stride <= self.sums.len());
    self.stride = stride;

    // The zero border is real data, not a layout convention: write it out
    // before the running sums start.
    for v in &mut self.sums[..width_ext + 1] {
      *v = 0;
    }
    for v in &mut self.sq_sums[..width_ext + 1] {
      *v = 0;
    }

    let mut sums = &mut self.sums[..];
    let mut sq_sums = &mut self.sq_sums[..];
    for i in 0..height_ext {
      let row = &ext.row(i)[..width_ext];

      // Split the buffers between the finished row above and the row
      // being produced, so the recurrence can read one while writing the
      // other.
      let (sums_above, sums_cur) = sums.split_at_mut(stride);
      let (sq_above, sq_cur) = sq_sums.split_at_mut(stride);
      sums_cur[0] = 0;
      sq_cur[0] = 0;

      let mut sum: u32 = 0;
      let mut sq_sum: u32 = 0;
      for (j, &px) in row.iter().enumerate() {
        let v = u32::cast_from(px);
        // Wrapping adds: overflow cancels out in the four-corner
        // difference as long as any single window's sum fits 32 bits.
        sum = sum.wrapping_add(v);
        sq_sum = sq_sum.wrapping_add(v * v);
        sums_cur[j + 1] = sum.wrapping_add(sums_above[j + 1]);
        sq_cur[j + 1] = sq_sum.wrapping_add(sq_above[j + 1]);
      }

      sums = sums_cur;
      sq_sums = sq_cur;
    }
  }

  /// Sum and sum of squares of the `(2r+1) x (2r+1)` window centered on
  /// unit-relative position `(x, y)`, in constant time. The window may
  /// reach `r + 1` pixels outside the unit; the caller guarantees
  /// `r + 1 <= SGRPROJ_BORDER_HORZ/VERT`.
  #[inline(always)]
  fn box_sums(&self, x: isize, y: isize, r: usize) -> (u32, u32) {
    let stride = self.stride;
    let x0 = (x + SGRPROJ_BORDER_HORZ as isize - r as isize) as usize;
    let y0 = (y + SGRPROJ_BORDER_VERT as isize - r as isize) as usize;
    let x1 = x0 + 2 * r + 1;
    let y1 = y0 + 2 * r + 1;
    let sum = self.sums[y1 * stride + x1]
      .wrapping_add(self.sums[y0 * stride + x0])
      .wrapping_sub(self.sums[y0 * stride + x1])
      .wrapping_sub(self.sums[y1 * stride + x0]);
    let sq_sum = self.sq_sums[y1 * stride + x1]
      .wrapping_add(self.sq_sums[y0 * stride + x0])
      .wrapping_sub(self.sq_sums[y0 * stride + x1])
      .wrapping_sub(self.sq_sums[y1 * stride + x0]);
    (sum, sq_sum)
  }
}

// Turns the window statistics into the blend weight pair. Statistics are
// first brought down to an 8-bit sample scale so one regularization table
// serves every bit depth; the offset term keeps the full-scale sum.
#[inline(always)]
fn sgrproj_sum_finish(
  ssq: u32, sum: u32, n: u32, one_over_n: u32, s: u32, bdm8: usize,
) -> (u32, u32) {
  let scaled_ssq = (ssq + (1 << (2 * bdm8) >> 1)) >> (2 * bdm8);
  let scaled_sum = (sum + (1 << bdm8 >> 1)) >> bdm8;
  // The max() soaks up the rounding noise of the two shifts above, which
  // can push the proxy slightly negative on flat windows.
  let p = cmp::max(scaled_ssq * n, scaled_sum * scaled_sum)
    - scaled_sum * scaled_sum;
  let z = (p * s + (1 << SGRPROJ_MTABLE_BITS >> 1)) >> SGRPROJ_MTABLE_BITS;
  let a = X_BY_XPLUS1[cmp::min(z, 255) as usize];
  let b = (SGRPROJ_SGR - a) * sum * one_over_n;
  (a, (b + (1 << SGRPROJ_RECIP_BITS >> 1)) >> SGRPROJ_RECIP_BITS)
}

// Fills the a and b coefficient maps for one pass, including the one-pixel
// halo the cross-sum needs. Maps are indexed at (x + 1, y + 1).
fn sgrproj_calc_ab(
  a: &mut [u32], b: &mut [u32], map_stride: usize, ii: &IntegralImages,
  width: usize, height: usize, r: usize, eps: u32, bdm8: usize,
) {
  debug_assert!(r + 1 <= cmp::min(SGRPROJ_BORDER_HORZ, SGRPROJ_BORDER_VERT));
  debug_assert!(eps >= 1 && eps <= MAX_EPS as u32);
  let n = (2 * r + 1) * (2 * r + 1);
  let s = SGRPROJ_MTABLE[eps as usize - 1][n - 1];
  let one_over_n = ONE_BY_X[n - 1];
  for i in -1..=height as isize {
    for j in -1..=width as isize {
      let (sum, ssq) = ii.box_sums(j, i, r);
      let (av, bv) =
        sgrproj_sum_finish(ssq, sum, n as u32, one_over_n, s, bdm8);
      let k = ((i + 1) * map_stride as isize + (j + 1)) as usize;
      a[k] = av;
      b[k] = bv;
    }
  }
}

// 3x3 weighted sum over a coefficient map: the four corners weigh 3 and
// every other position weighs 4, for a total weight of 2^5. Expressed as
// ((fours + threes) << 2) - threes to skip the multiply by 3.
#[inline(always)]
fn cross_sum(buf: &[u32], k: usize, stride: usize) -> u32 {
  let fours =
    buf[k - stride] + buf[k - 1] + buf[k] + buf[k + 1] + buf[k + stride];
  let threes = buf[k - stride - 1]
    + buf[k - stride + 1]
    + buf[k + stride - 1]
    + buf[k + stride + 1];
  ((fours + threes) << 2) - threes
}

// Blends each source sample with its cross-summed coefficients, producing
// one filtered candidate scaled by 2^SGRPROJ_RST_BITS. No clamping here;
// the projection at the end of the dual pass rounds and clamps once.
fn sgrproj_final_filter<T: Pixel>(
  flt: &mut [i32], flt_stride: usize, a: &[u32], b: &[u32],
  map_stride: usize, dgd: &PlaneSlice<'_, T>, width: usize, height: usize,
) {
  let nb = 5; // log2 of the total cross-sum weight
  let shift = SGRPROJ_SGR_BITS + nb - SGRPROJ_RST_BITS;
  for i in 0..height {
    for j in 0..width {
      let k = (i + 1) * map_stride + j + 1;
      let v = cross_sum(a, k, map_stride) * u32::cast_from(dgd.p(j, i))
        + cross_sum(b, k, map_stride);
      flt[i * flt_stride + j] = round_shift(v as i32, shift);
    }
  }
}

/// Working storage for one restoration worker: the two integral images,
/// the coefficient maps and the two filtered candidates, all sized for the
/// largest stretched unit. One instance serves any sequence of units;
/// threads filtering units concurrently each need their own.
pub struct SgrScratch {
  integral: IntegralImages,
  a: Vec<u32>,
  b: Vec<u32>,
  flt1: Vec<i32>,
  flt2: Vec<i32>,
}

impl SgrScratch {
  pub fn new() -> Self {
    SgrScratch {
      integral: IntegralImages::new(),
      a: vec![0; SGRPROJ_BUF_STRIDE_MAX * COEFF_ROWS_MAX],
      b: vec![0; SGRPROJ_BUF_STRIDE_MAX * COEFF_ROWS_MAX],
      flt1: vec![0; RESTORATION_TILEPELS_MAX],
      flt2: vec![0; RESTORATION_TILEPELS_MAX],
    }
  }

  /// The filtered candidates left by the latest [`selfguided_restoration`]
  /// call, row-major with a stride of that call's `width`, scaled by
  /// `2^SGRPROJ_RST_BITS`.
  pub fn candidates(&self) -> (&[i32], &[i32]) {
    (&self.flt1, &self.flt2)
  }
}

impl Default for SgrScratch {
  fn default() -> Self {
    Self::new()
  }
}

/// Runs both guided passes over one restoration unit, leaving the two
/// filtered candidates in `scratch`.
///
/// `dgd` points at the unit's top-left sample inside a plane whose borders
/// hold at least `SGRPROJ_BORDER_HORZ` / `SGRPROJ_BORDER_VERT` valid
/// samples on every side of the unit.
pub fn selfguided_restoration<T: Pixel>(
  dgd: &PlaneSlice<'_, T>, width: usize, height: usize, params: &SgrParams,
  bit_depth: usize, scratch: &mut SgrScratch,
) {
  assert!(width <= RESTORATION_UNIT_STRETCH_MAX);
  assert!(height <= RESTORATION_UNIT_STRETCH_MAX);
  assert!(width * height <= RESTORATION_TILEPELS_MAX);
  // 32-bit accumulators hold the worst-case window sums up to 12 bits.
  match T::type_enum() {
    PixelType::U8 => assert!(bit_depth == 8),
    PixelType::U16 => assert!(bit_depth >= 8 && bit_depth <= 12),
  }

  let width_ext = width + 2 * SGRPROJ_BORDER_HORZ;
  let height_ext = height + 2 * SGRPROJ_BORDER_VERT;
  let buf_stride = (width_ext + 16).align_power_of_two(3);
  let bdm8 = bit_depth - 8;

  let SgrScratch { integral, a, b, flt1, flt2 } = scratch;
  let ext = dgd.reslice(
    -(SGRPROJ_BORDER_HORZ as isize),
    -(SGRPROJ_BORDER_VERT as isize),
  );
  integral.build(&ext, width_ext, height_ext, buf_stride);

  for (r, e, flt) in
    [(params.r1, params.e1, &mut *flt1), (params.r2, params.e2, &mut *flt2)]
  {
    if e > 0 {
      sgrproj_calc_ab(a, b, buf_stride, integral, width, height, r, e, bdm8);
      sgrproj_final_filter(flt, width, a, b, buf_stride, dgd, width, height);
    } else {
      // Inactive pass: the candidate is the source itself, raised into
      // the shared fixed-point domain.
      for i in 0..height {
        for j in 0..width {
          flt[i * width + j] = i32::cast_from(dgd.p(j, i)) << SGRPROJ_RST_BITS;
        }
      }
    }
  }
}

/// Expands the transmitted projection pair into the two signed pass
/// weights. The implied weight on the source sample is
/// `(1 << SGRPROJ_PRJ_BITS) - xq0 - xq1`, which works out to `xqd[1]`.
pub fn decode_xq(xqd: [i8; 2]) -> [i32; 2] {
  let xq0 = i32::from(xqd[0]);
  [xq0, (1 << SGRPROJ_PRJ_BITS) - xq0 - i32::from(xqd[1])]
}

/// Filters one restoration unit end to end: runs both passes with the
/// transmitted parameter set, then projects the source and the two
/// candidates onto the final samples, rounded once and clamped to the
/// sample range.
pub fn apply_selfguided_restoration<T: Pixel>(
  dgd: &PlaneSlice<'_, T>, width: usize, height: usize, set: u8,
  xq: [i32; 2], bit_depth: usize, scratch: &mut SgrScratch,
  out: &mut PlaneMutSlice<'_, T>,
) {
  selfguided_restoration(
    dgd,
    width,
    height,
    &SGR_PARAMS[set as usize],
    bit_depth,
    scratch,
  );

  let shift = SGRPROJ_PRJ_BITS + SGRPROJ_RST_BITS;
  for (yi, dst_row) in out.rows_iter_mut().take(height).enumerate() {
    for xi in 0..width {
      let u = i32::cast_from(dgd.p(xi, yi)) << SGRPROJ_RST_BITS;
      let v = xq[0] * (scratch.flt1[yi * width + xi] - u)
        + xq[1] * (scratch.flt2[yi * width + xi] - u)
        + (u << SGRPROJ_PRJ_BITS);
      let s = round_shift(v, shift);
      dst_row[xi] = T::cast_from(clamp(s, 0, (1 << bit_depth) - 1));
    }
  }
}

/// The restoration choice for one unit.
#[derive(Copy, Clone, Debug, Default)]
pub struct RestorationUnit {
  pub filter: RestorationFilter,
}

#[derive(Clone, Debug)]
pub struct FrameRestorationUnits {
  units: Box<[RestorationUnit]>,
  pub cols: usize,
  pub rows: usize,
}

impl FrameRestorationUnits {
  pub fn new(cols: usize, rows: usize) -> Self {
    Self {
      units: vec![RestorationUnit::default(); cols * rows].into_boxed_slice(),
      cols,
      rows,
    }
  }
}

impl Index<usize> for FrameRestorationUnits {
  type Output = [RestorationUnit];
  #[inline(always)]
  fn index(&self, index: usize) -> &Self::Output {
    &self.units[index * self.cols..(index + 1) * self.cols]
  }
}

impl IndexMut<usize> for FrameRestorationUnits {
  #[inline(always)]
  fn index_mut(&mut self, index: usize) -> &mut Self::Output {
    &mut self.units[index * self.cols..(index + 1) * self.cols]
  }
}

#[derive(Clone, Debug)]
pub struct RestorationPlaneConfig {
  pub unit_size: usize,
  pub cols: usize,
  pub rows: usize,
}

/// The grid of restoration units covering one plane.
#[derive(Clone, Debug)]
pub struct RestorationPlane {
  pub cfg: RestorationPlaneConfig,
  pub units: FrameRestorationUnits,
}

impl RestorationPlane {
  pub fn new(unit_size: usize, width: usize, height: usize) -> Self {
    assert!(unit_size.is_power_of_two());
    assert!(unit_size <= RESTORATION_UNITSIZE_MAX);
    // A trailing remainder smaller than half a unit folds into the last
    // unit of the row or column rather than forming its own.
    let cols = ((width + (unit_size >> 1)) / unit_size).max(1);
    let rows = ((height + (unit_size >> 1)) / unit_size).max(1);
    RestorationPlane {
      cfg: RestorationPlaneConfig { unit_size, cols, rows },
      units: FrameRestorationUnits::new(cols, rows),
    }
  }
}

/// Applies the per-unit restoration choices across a whole plane.
///
/// On entry `out` holds the unfiltered reconstruction, border-extended via
/// [`Plane::pad`]; on return it holds the restored plane. Units assigned
/// [`RestorationFilter::None`] keep their input samples. Each unit reads
/// the pre-filter reconstruction, so units never observe their neighbors'
/// filtered output.
pub fn sgrproj_filter_plane<T: Pixel>(
  rp: &RestorationPlane, out: &mut Plane<T>, bit_depth: usize,
  scratch: &mut SgrScratch,
) {
  assert!(out.cfg.xorigin >= SGRPROJ_BORDER_HORZ);
  assert!(out.cfg.yorigin >= SGRPROJ_BORDER_VERT);
  assert!(out.cfg.xpad >= SGRPROJ_BORDER_HORZ);
  assert!(out.cfg.ypad >= SGRPROJ_BORDER_VERT);

  let width = out.cfg.width;
  let height = out.cfg.height;
  let unit_size = rp.cfg.unit_size;
  debug!(
    "self-guided restoration: {}x{} plane, {}x{} grid of {} pel units",
    width, height, rp.cfg.cols, rp.cfg.rows, unit_size
  );

  let dgd = out.clone();
  for ruy in 0..rp.cfg.rows {
    let y = ruy * unit_size;
    let unit_h = if ruy == rp.cfg.rows - 1 { height - y } else { unit_size };
    for rux in 0..rp.cfg.cols {
      let x = rux * unit_size;
      let unit_w = if rux == rp.cfg.cols - 1 { width - x } else { unit_size };
      match rp.units[ruy][rux].filter {
        RestorationFilter::Sgrproj { set, xqd } => {
          apply_selfguided_restoration(
            &dgd.slice(&PlaneOffset { x: x as isize, y: y as isize }),
            unit_w,
            unit_h,
            set,
            decode_xq(xqd),
            bit_depth,
            scratch,
            &mut out.mut_slice(&PlaneOffset { x: x as isize, y: y as isize }),
          );
        }
        RestorationFilter::None => {
          // the unfiltered reconstruction is already in place
        }
      }
    }
  }
}
