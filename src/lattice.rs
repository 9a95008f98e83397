//! Lattice - window geometry between input space and column space.
//!
//! A region reads a 2D input through a 2D lattice of columns. Three windows
//! are defined over that geometry:
//!
//! - **Receptive window**: a column at `(x, y)` reads the inputs around its
//!   normalized position `(x / columns_width, y / columns_height)`. Offsets
//!   `dx, dy` in `[-receptive_radius, receptive_radius]` are scaled by the
//!   input cell size, so the same radius covers the same fraction of the
//!   input regardless of lattice resolution.
//! - **Lateral window**: the columns within `cell_radius` on the lattice,
//!   clipped at the borders. Cells connect to every cell of those columns.
//! - **Inhibition neighborhood**: same shape as the lateral window, with a
//!   per-step radius.
//!
//! Windows are walked with the horizontal offset as the outer loop and the
//! vertical offset as the inner loop. A window *slot* is the position of an
//! offset in that walk, whether or not it lands in bounds, so connection
//! vectors keep a fixed `(2r+1)²` layout and border columns simply leave
//! some slots unread.
//!
//! Columns themselves are visited in *traversal order*: `x` outer, `y`
//! inner. The reconstruction mapping lists, for every input, the columns
//! that read it in traversal order; recon connections are allocated in that
//! order and keep the source column index, so no pass has to re-derive it.

use crate::utils::flat_index;
use crate::RegionConfig;
use itertools::iproduct;
use serde::{Deserialize, Serialize};

/// A populated slot of a column's receptive window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputLink {
    /// Slot in the column's center connections
    pub slot: usize,
    /// Flat input index
    pub input: usize,
}

/// A populated position of a cell's lateral window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LateralLink {
    /// Window position; connection slots start at `position * stride`
    pub position: usize,
    /// Flat index of the neighboring column
    pub column: usize,
}

/// A column reading an input, in traversal order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconSource {
    pub column: usize,
    /// Slot in that column's receptive window
    pub slot: usize,
}

/// Precomputed window geometry of one region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lattice {
    input_width: usize,
    input_height: usize,
    columns_width: usize,
    columns_height: usize,
    receptive_radius: usize,
    cell_radius: usize,

    /// Populated receptive slots per column
    receptive: Vec<Vec<InputLink>>,

    /// Populated lateral positions per column
    lateral: Vec<Vec<LateralLink>>,
}

impl Lattice {
    /// Build the window tables for a configuration.
    pub fn new(config: &RegionConfig) -> Self {
        let mut lattice = Self {
            input_width: config.input_width,
            input_height: config.input_height,
            columns_width: config.columns_width,
            columns_height: config.columns_height,
            receptive_radius: config.receptive_radius,
            cell_radius: config.cell_radius,
            receptive: Vec::new(),
            lateral: Vec::new(),
        };

        let num_columns = lattice.num_columns();
        lattice.receptive = (0..num_columns)
            .map(|i| lattice.receptive_window(i))
            .collect();
        lattice.lateral = (0..num_columns)
            .map(|i| lattice.lateral_window(i))
            .collect();

        lattice
    }

    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.input_width * self.input_height
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns_width * self.columns_height
    }

    #[inline]
    pub fn columns_width(&self) -> usize {
        self.columns_width
    }

    #[inline]
    pub fn columns_height(&self) -> usize {
        self.columns_height
    }

    /// Column coordinate of a flat column index.
    #[inline]
    pub fn column_coordinates(&self, column: usize) -> (usize, usize) {
        (column % self.columns_width, column / self.columns_width)
    }

    /// Flat column indices in traversal order (`x` outer, `y` inner).
    pub fn traversal_order(&self) -> impl Iterator<Item = usize> + '_ {
        iproduct!(0..self.columns_width, 0..self.columns_height)
            .map(move |(x, y)| flat_index(x, y, self.columns_width))
    }

    /// Populated receptive slots of a column.
    #[inline]
    pub fn receptive(&self, column: usize) -> &[InputLink] {
        &self.receptive[column]
    }

    /// Populated lateral positions of a column.
    #[inline]
    pub fn lateral(&self, column: usize) -> &[LateralLink] {
        &self.lateral[column]
    }

    pub(crate) fn receptive_links(&self) -> &[Vec<InputLink>] {
        &self.receptive
    }

    pub(crate) fn lateral_links(&self) -> &[Vec<LateralLink>] {
        &self.lateral
    }

    /// For every input, the columns that read it, in traversal order.
    ///
    /// Inputs outside every receptive window get an empty list.
    pub fn recon_sources(&self) -> Vec<Vec<ReconSource>> {
        let mut sources = vec![Vec::new(); self.num_inputs()];

        for column in self.traversal_order() {
            for link in &self.receptive[column] {
                sources[link.input].push(ReconSource {
                    column,
                    slot: link.slot,
                });
            }
        }

        sources
    }

    /// Columns within `radius` of `column` on the lattice, clipped at the
    /// borders, the column itself included.
    pub fn neighborhood(&self, column: usize, radius: usize) -> impl Iterator<Item = usize> + '_ {
        let (cx, cy) = self.column_coordinates(column);
        let r = radius as isize;

        iproduct!(-r..=r, -r..=r).filter_map(move |(dx, dy)| {
            self.offset_column(cx, cy, dx, dy)
                .map(|(x, y)| flat_index(x, y, self.columns_width))
        })
    }

    fn offset_column(&self, cx: usize, cy: usize, dx: isize, dy: isize) -> Option<(usize, usize)> {
        let x = cx as isize + dx;
        let y = cy as isize + dy;

        if x >= 0 && x < self.columns_width as isize && y >= 0 && y < self.columns_height as isize
        {
            Some((x as usize, y as usize))
        } else {
            None
        }
    }

    fn receptive_window(&self, column: usize) -> Vec<InputLink> {
        let (cx, cy) = self.column_coordinates(column);
        let r = self.receptive_radius as isize;

        let input_width_inv = 1.0 / self.input_width as f32;
        let input_height_inv = 1.0 / self.input_height as f32;

        let cxn = cx as f32 * (1.0 / self.columns_width as f32);
        let cyn = cy as f32 * (1.0 / self.columns_height as f32);

        iproduct!(-r..=r, -r..=r)
            .enumerate()
            .filter_map(|(slot, (dx, dy))| {
                let xn = cxn + dx as f32 * input_width_inv;
                let yn = cyn + dy as f32 * input_height_inv;

                if (0.0..1.0).contains(&xn) && (0.0..1.0).contains(&yn) {
                    let x = ((xn * self.input_width as f32) as usize).min(self.input_width - 1);
                    let y = ((yn * self.input_height as f32) as usize).min(self.input_height - 1);

                    Some(InputLink {
                        slot,
                        input: flat_index(x, y, self.input_width),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    fn lateral_window(&self, column: usize) -> Vec<LateralLink> {
        let (cx, cy) = self.column_coordinates(column);
        let r = self.cell_radius as isize;

        iproduct!(-r..=r, -r..=r)
            .enumerate()
            .filter_map(|(position, (dx, dy))| {
                self.offset_column(cx, cy, dx, dy).map(|(x, y)| LateralLink {
                    position,
                    column: flat_index(x, y, self.columns_width),
                })
            })
            .collect()
    }
}
