// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use criterion::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;
use sgrproj::lrf::{
  SGRPROJ_BORDER_HORZ, SGRPROJ_BORDER_VERT, SGRPROJ_XQD_MID,
};
use sgrproj::plane::Plane;
use sgrproj::util::{CastFromPrimitive, Pixel};
use sgrproj::{apply_selfguided_restoration, decode_xq, SgrScratch};

fn init_plane<T: Pixel>(width: usize, height: usize, bit_depth: usize) -> Plane<T> {
  let mut ra = ChaChaRng::from_seed([0; 32]);
  let mut p =
    Plane::new(width, height, SGRPROJ_BORDER_HORZ, SGRPROJ_BORDER_VERT);
  for row in p.as_mut_slice().rows_iter_mut() {
    for v in row[..width].iter_mut() {
      *v = T::cast_from(ra.gen_range(0..1i32 << bit_depth));
    }
  }
  p.pad();
  p
}

pub fn sgrproj_256_8bit(c: &mut Criterion) {
  let input: Plane<u8> = init_plane(256, 256, 8);
  let mut out = Plane::new(256, 256, 0, 0);
  let mut scratch = SgrScratch::new();
  let xq = decode_xq(SGRPROJ_XQD_MID);
  c.bench_function("sgrproj_256x256_8bit", move |b| {
    b.iter(|| {
      apply_selfguided_restoration(
        &input.as_slice(),
        256,
        256,
        0,
        xq,
        8,
        &mut scratch,
        &mut out.as_mut_slice(),
      );
    })
  });
}

pub fn sgrproj_256_10bit(c: &mut Criterion) {
  let input: Plane<u16> = init_plane(256, 256, 10);
  let mut out = Plane::new(256, 256, 0, 0);
  let mut scratch = SgrScratch::new();
  let xq = decode_xq(SGRPROJ_XQD_MID);
  c.bench_function("sgrproj_256x256_10bit", move |b| {
    b.iter(|| {
      apply_selfguided_restoration(
        &input.as_slice(),
        256,
        256,
        0,
        xq,
        10,
        &mut scratch,
        &mut out.as_mut_slice(),
      );
    })
  });
}

criterion_group!(lrf, sgrproj_256_8bit, sgrproj_256_10bit);
criterion_main!(lrf);
