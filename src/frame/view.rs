//! Row-subset views over frames.
//!
//! A [`DataFrameView`] is a frame plus an optional row selection. The fit
//! path uses it for the sampled population; the driver uses it for each
//! thread's contiguous shard. Views never copy column data.

use std::sync::Arc;

use crate::frame::DataFrame;

/// A frame with an optional row selection.
#[derive(Debug, Clone)]
pub struct DataFrameView {
    frame: Arc<DataFrame>,
    rownums: Option<Arc<Vec<usize>>>,
}

impl DataFrameView {
    /// A view over every row of the frame.
    pub fn whole(frame: Arc<DataFrame>) -> Self {
        Self {
            frame,
            rownums: None,
        }
    }

    /// A view restricted to the given base-frame row numbers.
    pub fn with_rows(frame: Arc<DataFrame>, rownums: Arc<Vec<usize>>) -> Self {
        Self {
            frame,
            rownums: Some(rownums),
        }
    }

    /// Number of rows visible through the view.
    pub fn nrows(&self) -> usize {
        match &self.rownums {
            Some(rows) => rows.len(),
            None => self.frame.nrows(),
        }
    }

    /// Map a view row to its base-frame row.
    #[inline]
    pub fn base_row(&self, view_row: usize) -> usize {
        match &self.rownums {
            Some(rows) => rows[view_row],
            None => view_row,
        }
    }

    /// The underlying frame.
    pub fn frame(&self) -> &Arc<DataFrame> {
        &self.frame
    }

    /// The explicit row selection, if any.
    pub fn rownums(&self) -> Option<&Arc<Vec<usize>>> {
        self.rownums.as_ref()
    }
}
