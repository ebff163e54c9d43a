//! Resizable pane geometry (pixels).

use serde::{Deserialize, Serialize};

pub const EDITOR_MIN_WIDTH: f64 = 280.0;
pub const PREVIEW_MIN_WIDTH: f64 = 300.0;

/// Editor | preview split of the main window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPane {
    editor_width: f64,
    container_width: f64,
}

/// Clamps the editor width so both panes keep their minimum. When the container is too
/// narrow for both, the editor minimum wins.
pub fn clamp_editor_width(width: f64, container_width: f64) -> f64 {
    let max = container_width - PREVIEW_MIN_WIDTH;
    EDITOR_MIN_WIDTH.max(max.min(width))
}

impl SplitPane {
    pub fn new(container_width: f64) -> Self {
        Self::from_ratio(0.5, container_width)
    }

    pub fn from_ratio(ratio: f64, container_width: f64) -> Self {
        let ratio = if ratio.is_finite() { ratio } else { 0.5 };
        Self {
            editor_width: clamp_editor_width(ratio * container_width, container_width),
            container_width,
        }
    }

    /// Moves the divider to the pointer. Returns the new editor width.
    pub fn drag_to(&mut self, pointer_x: f64, container_left: f64, container_width: f64) -> f64 {
        self.container_width = container_width;
        self.editor_width = clamp_editor_width(pointer_x - container_left, container_width);
        self.editor_width
    }

    /// Keeps the current ratio across a window resize.
    pub fn resize_container(&mut self, container_width: f64) {
        *self = Self::from_ratio(self.ratio(), container_width);
    }

    pub fn editor_width(&self) -> f64 {
        self.editor_width
    }

    pub fn preview_width(&self) -> f64 {
        (self.container_width - self.editor_width).max(0.0)
    }

    pub fn ratio(&self) -> f64 {
        if self.container_width > 0.0 {
            self.editor_width / self.container_width
        } else {
            0.5
        }
    }
}

pub const COLUMN_DEFAULT_COL1: f64 = 220.0;
pub const COLUMN_DEFAULT_COL2: f64 = 340.0;
pub const COLUMN_MIN_COL1: f64 = 170.0;
pub const COLUMN_MIN_COL2: f64 = 220.0;
pub const COLUMN_MIN_COL3: f64 = 320.0;
pub const NUDGE_STEP: f64 = 12.0;
pub const NUDGE_STEP_LARGE: f64 = 24.0;

/// Widths of the first two template-library columns; the third takes the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSizes {
    pub col1: f64,
    pub col2: f64,
}

impl Default for ColumnSizes {
    fn default() -> Self {
        Self {
            col1: COLUMN_DEFAULT_COL1,
            col2: COLUMN_DEFAULT_COL2,
        }
    }
}

/// Column widths as fractions of the available width; what gets persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnRatios {
    pub col1: f64,
    pub col2: f64,
}

impl ColumnRatios {
    /// Rejects non-finite or non-positive ratios, and pairs that leave the third column
    /// less than 5% of the width.
    pub fn new(col1: f64, col2: f64) -> Option<Self> {
        if !col1.is_finite() || !col2.is_finite() {
            return None;
        }
        if col1 <= 0.0 || col2 <= 0.0 || col1 + col2 >= 0.95 {
            return None;
        }
        Some(Self { col1, col2 })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resizer {
    /// Between the category list and the template list.
    First,
    /// Between the template list and the preview.
    Second,
}

fn clamp_range(value: f64, min: f64, max: f64) -> f64 {
    if max < min {
        return min;
    }
    value.max(min).min(max)
}

pub fn clamp_columns(col1: f64, col2: f64, available: f64) -> ColumnSizes {
    let max_col1 = COLUMN_MIN_COL1.max(available - COLUMN_MIN_COL2 - COLUMN_MIN_COL3);
    let col1 = clamp_range(col1, COLUMN_MIN_COL1, max_col1);
    let max_col2 = COLUMN_MIN_COL2.max(available - col1 - COLUMN_MIN_COL3);
    let col2 = clamp_range(col2, COLUMN_MIN_COL2, max_col2);
    ColumnSizes {
        col1: col1.round(),
        col2: col2.round(),
    }
}

pub fn to_ratios(sizes: ColumnSizes, available: f64) -> Option<ColumnRatios> {
    if available <= 0.0 {
        return None;
    }
    ColumnRatios::new(sizes.col1 / available, sizes.col2 / available)
}

/// Three-column layout of the template-library window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LibraryColumns {
    sizes: ColumnSizes,
    ratios: Option<ColumnRatios>,
    available: f64,
}

impl LibraryColumns {
    pub fn new(available: f64) -> Self {
        Self::from_ratios(None, available)
    }

    /// Restores persisted ratios; without them the default widths apply.
    pub fn from_ratios(ratios: Option<ColumnRatios>, available: f64) -> Self {
        let mut columns = Self {
            sizes: ColumnSizes::default(),
            ratios,
            available: available.max(0.0),
        };
        columns.sync(available);
        columns
    }

    /// Re-fits the columns to a new available width.
    pub fn sync(&mut self, available: f64) {
        self.available = available.max(0.0);
        if self.available <= 0.0 {
            return;
        }
        let tentative = match self.ratios {
            Some(r) => ColumnSizes {
                col1: self.available * r.col1,
                col2: self.available * r.col2,
            },
            None => ColumnSizes::default(),
        };
        self.apply(clamp_columns(tentative.col1, tentative.col2, self.available));
    }

    fn apply(&mut self, sizes: ColumnSizes) {
        self.sizes = sizes;
        if let Some(ratios) = to_ratios(sizes, self.available) {
            self.ratios = Some(ratios);
        }
    }

    /// Drag of `resizer` by `delta_x` pixels from where it started (`start`).
    pub fn drag(&mut self, resizer: Resizer, start: ColumnSizes, delta_x: f64) {
        if self.available <= 0.0 {
            return;
        }
        let next = match resizer {
            Resizer::First => clamp_columns(start.col1 + delta_x, start.col2, self.available),
            Resizer::Second => clamp_columns(start.col1, start.col2 + delta_x, self.available),
        };
        self.apply(next);
    }

    /// Keyboard nudge: 12px per arrow press, 24px with shift.
    pub fn nudge(&mut self, resizer: Resizer, rightward: bool, shift: bool) {
        let step = if shift { NUDGE_STEP_LARGE } else { NUDGE_STEP };
        let delta = if rightward { step } else { -step };
        self.drag(resizer, self.sizes, delta);
    }

    pub fn sizes(&self) -> ColumnSizes {
        self.sizes
    }

    pub fn ratios(&self) -> Option<ColumnRatios> {
        self.ratios
    }

    pub fn third_column_width(&self) -> f64 {
        (self.available - self.sizes.col1 - self.sizes.col2).max(0.0)
    }
}
