// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Self-guided restoration: an in-loop, post-reconstruction filter that
//! attenuates ringing and quantization noise while keeping edges, using
//! O(1) box statistics over integral images and a pair of guided passes
//! projected back onto the source sample. All arithmetic is integer-only
//! and deterministic, so an encoder and a decoder running this filter
//! reproduce bit-identical pictures.

pub mod lrf;
pub mod plane;
pub mod tables;
pub mod util;

pub use crate::lrf::{
  apply_selfguided_restoration, decode_xq, selfguided_restoration,
  sgrproj_filter_plane, RestorationFilter, RestorationPlane, RestorationUnit,
  SgrParams, SgrScratch, SGR_PARAMS,
};
