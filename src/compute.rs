use crate::error::ComputeError;
use crate::util::mean_std;

// 3x3 stencil, row-major. Corners are zero; weights sum to 1.
const EDGE_WEIGHT: f32 = 0.125;
const CENTER_WEIGHT: f32 = 0.5;
const STENCIL: [[f32; 3]; 3] = [
    [0.0, EDGE_WEIGHT, 0.0],
    [EDGE_WEIGHT, CENTER_WEIGHT, EDGE_WEIGHT],
    [0.0, EDGE_WEIGHT, 0.0],
];

// Square grid, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeBuffer {
    size: usize,
    cells: Vec<f32>,
}

impl ComputeBuffer {
    pub fn from_fn(size: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut cells = Vec::with_capacity(size * size);
        for row in 0..size {
            for col in 0..size {
                cells.push(f(row, col));
            }
        }
        Self { size, cells }
    }

    pub fn uniform(size: usize, value: f32) -> Self {
        Self {
            size,
            cells: vec![value; size * size],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.cells[row * self.size + col]
    }

    // Everything but the border.
    pub fn interior(&self) -> impl Iterator<Item = f32> + '_ {
        let n = self.size;
        (1..n.saturating_sub(1))
            .flat_map(move |row| (1..n - 1).map(move |col| (row, col)))
            .map(move |(row, col)| self.get(row, col))
    }
}

/// Each cell is the low byte of its linear index scaled into `[0, 1]`.
pub fn make_input(size: usize) -> ComputeBuffer {
    ComputeBuffer::from_fn(size, |row, col| ((row * size + col) & 0xFF) as f32 / 255.0)
}

pub fn summary_mean_std(buffer: &ComputeBuffer) -> (f64, f64) {
    mean_std(buffer.cells.iter().map(|&c| c as f64))
}

// Slot `current` holds the latest result; a pass reads it, writes the other
// slot, then flips the index.
pub struct KernelEngine {
    size: usize,
    slots: [ComputeBuffer; 2],
    current: usize,
}

impl KernelEngine {
    pub fn new(size: usize) -> Result<Self, ComputeError> {
        if size < 3 {
            return Err(ComputeError::GridTooSmall { size });
        }
        Ok(Self {
            size,
            slots: [ComputeBuffer::uniform(size, 0.0), ComputeBuffer::uniform(size, 0.0)],
            current: 0,
        })
    }

    /// Runs `passes` stencil passes from `input`. Border cells keep the
    /// input's values.
    pub fn convolve(
        &mut self,
        input: &ComputeBuffer,
        passes: usize,
    ) -> Result<&ComputeBuffer, ComputeError> {
        if input.size != self.size {
            return Err(ComputeError::SizeMismatch {
                expected: self.size,
                actual: input.size,
            });
        }

        for slot in &mut self.slots {
            slot.cells.copy_from_slice(&input.cells);
        }
        self.current = 0;

        for _ in 0..passes {
            let (front, back) = self.slots.split_at_mut(1);
            let (src, dst) = if self.current == 0 {
                (&front[0], &mut back[0])
            } else {
                (&back[0], &mut front[0])
            };
            single_pass(&src.cells, &mut dst.cells, self.size);
            self.current ^= 1;
        }

        Ok(&self.slots[self.current])
    }
}

fn single_pass(src: &[f32], dst: &mut [f32], n: usize) {
    let edge = STENCIL[0][1];
    let center = STENCIL[1][1];
    for row in 1..n - 1 {
        let off = row * n;
        for col in 1..n - 1 {
            let i = off + col;
            let vertical = src[i - n] + src[i + n];
            let horizontal = src[i - 1] + src[i + 1];
            dst[i] = (vertical + horizontal) * edge + src[i] * center;
        }
    }
}
