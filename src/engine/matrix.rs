//! Feature matrix storage.
//!
//! A [`FeatureMatrix`] is a column-major (rows × features) array of f64,
//! backed either by heap memory or by a memory-mapped temporary file when a
//! temp directory is configured. Both expose the same write-by-(row, col)
//! interface.
//!
//! Workers write disjoint row ranges through [`ShardWriter`]s handed out by
//! [`FeatureMatrix::shard_writers`]; the ranges are validated to be
//! non-overlapping, so concurrent writes never alias.

use std::ops::Range;
use std::path::Path;

use memmap2::MmapMut;

use crate::error::{RelPropError, Result};

enum Backing {
    Heap(Vec<f64>),
    /// The mapping keeps the (deleted-on-drop) temp file alive.
    Mmap(MmapMut),
}

/// A column-major f64 matrix.
pub struct FeatureMatrix {
    nrows: usize,
    ncols: usize,
    backing: Backing,
}

impl FeatureMatrix {
    /// Allocate a zeroed matrix. With `temp_dir` set, the storage is a
    /// memory-mapped unnamed temporary file in that directory; otherwise it
    /// lives on the heap.
    pub fn new(nrows: usize, ncols: usize, temp_dir: Option<&Path>) -> Result<Self> {
        let backing = match temp_dir {
            None => Backing::Heap(vec![0.0; nrows * ncols]),
            Some(dir) => {
                let file = tempfile::tempfile_in(dir).map_err(|e| {
                    RelPropError::Internal(format!("could not create temp file: {e}"))
                })?;
                file.set_len((nrows * ncols * size_of::<f64>()) as u64)
                    .map_err(|e| {
                        RelPropError::Internal(format!("could not size temp file: {e}"))
                    })?;
                // SAFETY: the file is exclusively owned by this mapping and
                // lives in a temp directory; no other process truncates it.
                let map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| {
                    RelPropError::Internal(format!("could not map temp file: {e}"))
                })?;
                Backing::Mmap(map)
            }
        };
        Ok(Self {
            nrows,
            ncols,
            backing,
        })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    fn data(&self) -> &[f64] {
        match &self.backing {
            Backing::Heap(v) => v,
            Backing::Mmap(map) => {
                // SAFETY: the mapping was created with a length that is a
                // multiple of 8 and mmap regions are page-aligned, so the
                // cast to f64 covers the whole region.
                let (head, floats, tail) = unsafe { map.align_to::<f64>() };
                debug_assert!(head.is_empty() && tail.is_empty());
                floats
            }
        }
    }

    fn data_ptr(&mut self) -> *mut f64 {
        match &mut self.backing {
            Backing::Heap(v) => v.as_mut_ptr(),
            Backing::Mmap(map) => map.as_mut_ptr().cast::<f64>(),
        }
    }

    /// Read one cell.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        debug_assert!(row < self.nrows && col < self.ncols);
        self.data()[col * self.nrows + row]
    }

    /// One feature column as a contiguous slice.
    pub fn column(&self, col: usize) -> &[f64] {
        &self.data()[col * self.nrows..(col + 1) * self.nrows]
    }

    /// Copy out the matrix in row-major order (the layout consumers of the
    /// feature matrix expect).
    pub fn to_row_major(&self) -> Vec<f64> {
        let data = self.data();
        let mut out = Vec::with_capacity(self.nrows * self.ncols);
        for row in 0..self.nrows {
            for col in 0..self.ncols {
                out.push(data[col * self.nrows + row]);
            }
        }
        out
    }

    /// Write one cell (single-threaded path).
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.nrows && col < self.ncols);
        let nrows = self.nrows;
        let ptr = self.data_ptr();
        // SAFETY: bounds are checked above; &mut self guarantees exclusivity.
        unsafe { *ptr.add(col * nrows + row) = value };
    }

    /// Split the matrix into one writer per disjoint row range.
    ///
    /// Ranges must not overlap and must stay within bounds; workers then
    /// write concurrently without locking.
    pub fn shard_writers(&mut self, ranges: &[Range<usize>]) -> Result<Vec<ShardWriter<'_>>> {
        let mut sorted: Vec<&Range<usize>> = ranges.iter().collect();
        sorted.sort_by_key(|r| r.start);
        for pair in sorted.windows(2) {
            if pair[0].end > pair[1].start {
                return Err(RelPropError::Internal(format!(
                    "overlapping shard ranges {:?} and {:?}",
                    pair[0], pair[1]
                )));
            }
        }
        if let Some(last) = sorted.last()
            && last.end > self.nrows
        {
            return Err(RelPropError::Internal(format!(
                "shard range {last:?} exceeds {} rows",
                self.nrows
            )));
        }

        let nrows = self.nrows;
        let ncols = self.ncols;
        let ptr = self.data_ptr();
        Ok(ranges
            .iter()
            .map(|r| ShardWriter {
                ptr,
                nrows,
                ncols,
                rows: r.clone(),
                _borrow: std::marker::PhantomData,
            })
            .collect())
    }
}

/// Write access to a disjoint row range of a [`FeatureMatrix`].
pub struct ShardWriter<'a> {
    ptr: *mut f64,
    nrows: usize,
    ncols: usize,
    rows: Range<usize>,
    _borrow: std::marker::PhantomData<&'a mut f64>,
}

// SAFETY: each writer touches only its own row range (enforced in `set`),
// and ranges are validated to be disjoint when the writers are created.
unsafe impl Send for ShardWriter<'_> {}

impl ShardWriter<'_> {
    /// The row range this writer owns.
    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    /// Write one cell inside the owned row range.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        assert!(
            self.rows.contains(&row),
            "row {row} outside shard range {:?}",
            self.rows
        );
        assert!(col < self.ncols);
        // SAFETY: bounds checked above; disjoint ranges mean no other
        // writer aliases this cell.
        unsafe { *self.ptr.add(col * self.nrows + row) = value };
    }
}
