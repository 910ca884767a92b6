//! Raw-signal de-interleaving into per-(slice, timepoint) k-space frames
//!
//! The scanner writes one phase-encode line per readout and cycles through
//! every (slice, timepoint) combination before advancing to the next line,
//! so frame `f` owns raw rows `f, f + n_frames, f + 2*n_frames, ...`.
//! On top of that, the inversion-recovery series orders its frames
//! timepoint-major (all slices of TI[0], then all slices of TI[1], ...)
//! while the multi-echo series is already slice-major; the extra
//! block-transpose for the former is selected by [`ReorderScheme`].

use crate::Error;
use num_complex::Complex64;

/// Frame ordering convention of an acquisition, carried explicitly with
/// the data instead of being inferred from which input it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReorderScheme {
    /// Frames are slice-major after row de-interleaving (multi-echo series).
    Interleaved,
    /// Frames are timepoint-major after row de-interleaving and need a
    /// block transpose to slice-major (inversion-recovery series).
    BlockInterleaved,
}

/// Flat complex acquisition matrix, rows in acquisition order.
/// Immutable once received.
#[derive(Clone, Debug)]
pub struct RawSignalSet {
    pub data: Vec<Complex64>,
    pub n_rows: usize,
    pub n_cols: usize,
}

impl RawSignalSet {
    pub fn new(data: Vec<Complex64>, n_rows: usize, n_cols: usize) -> Result<Self, Error> {
        if data.len() != n_rows * n_cols {
            return Err(Error::ShapeMismatch(format!(
                "raw signal length {} does not match {} rows x {} cols",
                data.len(),
                n_rows,
                n_cols
            )));
        }
        Ok(Self {
            data,
            n_rows,
            n_cols,
        })
    }
}

/// Stack of equally sized k-space frames.
#[derive(Clone, Debug)]
pub struct FrameStack {
    /// One `ny * nx` row-major complex array per frame.
    pub frames: Vec<Vec<Complex64>>,
    /// Phase-encode rows per frame
    pub ny: usize,
    /// Readout samples per frame
    pub nx: usize,
}

/// Split the flat raw matrix into `n_frames` interleaved frames:
/// raw row `r` becomes row `r / n_frames` of frame `r % n_frames`.
pub fn split_frames(raw: &RawSignalSet, n_frames: usize) -> Result<FrameStack, Error> {
    if n_frames == 0 || raw.n_rows % n_frames != 0 {
        return Err(Error::ShapeMismatch(format!(
            "{} raw rows cannot be divided into {} frames",
            raw.n_rows, n_frames
        )));
    }
    let ny = raw.n_rows / n_frames;
    let nx = raw.n_cols;

    let mut frames = vec![vec![Complex64::new(0.0, 0.0); ny * nx]; n_frames];
    for r in 0..raw.n_rows {
        let frame = r % n_frames;
        let row = r / n_frames;
        let src = r * nx;
        frames[frame][row * nx..(row + 1) * nx].copy_from_slice(&raw.data[src..src + nx]);
    }

    Ok(FrameStack { frames, ny, nx })
}

/// Reorder a timepoint-major frame stack to slice-major: the frame of
/// logical (slice `s`, timepoint `t`) sits at acquisition position
/// `t * n_slices + s` and moves to `s * n_timepoints + t`.
pub fn block_deinterleave(stack: &mut FrameStack, n_timepoints: usize) -> Result<(), Error> {
    let n_frames = stack.frames.len();
    if n_timepoints == 0 || n_frames % n_timepoints != 0 {
        return Err(Error::ShapeMismatch(format!(
            "{} frames cannot be grouped into {} timepoints",
            n_frames, n_timepoints
        )));
    }
    let n_slices = n_frames / n_timepoints;

    let old = std::mem::take(&mut stack.frames);
    let mut slot: Vec<Option<Vec<Complex64>>> = old.into_iter().map(Some).collect();
    let mut frames = Vec::with_capacity(n_frames);
    for s in 0..n_slices {
        for t in 0..n_timepoints {
            // take() keeps this a move, not a copy; every slot is visited once
            frames.push(slot[t * n_slices + s].take().unwrap_or_default());
        }
    }
    stack.frames = frames;
    Ok(())
}

/// Keep only the requested slices, in request order. Input frames must be
/// slice-major with `n_timepoints` consecutive frames per slice; output
/// frame index is `slice_position * n_timepoints + timepoint_index`.
/// A slice index appearing twice in the selection is rejected: the output
/// must be a bijection over the selected (slice, timepoint) subset, and a
/// repeated slice would map two output positions to one source frame.
pub fn select_slices(
    stack: FrameStack,
    n_timepoints: usize,
    selection: &[usize],
) -> Result<FrameStack, Error> {
    let n_frames = stack.frames.len();
    if n_timepoints == 0 || n_frames % n_timepoints != 0 {
        return Err(Error::ShapeMismatch(format!(
            "{} frames cannot be grouped into {} timepoints",
            n_frames, n_timepoints
        )));
    }
    let n_slices = n_frames / n_timepoints;

    let mut slot: Vec<Option<Vec<Complex64>>> = stack.frames.into_iter().map(Some).collect();
    let mut frames = Vec::with_capacity(selection.len() * n_timepoints);
    for &s in selection {
        if s >= n_slices {
            return Err(Error::ShapeMismatch(format!(
                "slice index {} out of range: acquisition holds {} slices",
                s, n_slices
            )));
        }
        for t in 0..n_timepoints {
            let f = slot[s * n_timepoints + t].take().ok_or_else(|| {
                Error::ShapeMismatch(format!("slice {} selected more than once", s))
            })?;
            frames.push(f);
        }
    }

    Ok(FrameStack {
        frames,
        ny: stack.ny,
        nx: stack.nx,
    })
}

/// Full reordering: split the raw matrix into frames, undo the
/// timepoint-major ordering where the scheme calls for it, and keep the
/// requested slices. The result holds `selection.len() * n_timepoints`
/// frames, slice-major.
pub fn reorder(
    raw: &RawSignalSet,
    n_frames: usize,
    n_timepoints: usize,
    scheme: ReorderScheme,
    selection: &[usize],
) -> Result<FrameStack, Error> {
    let mut stack = split_frames(raw, n_frames)?;
    if scheme == ReorderScheme::BlockInterleaved {
        block_deinterleave(&mut stack, n_timepoints)?;
    }
    select_slices(stack, n_timepoints, selection)
}
